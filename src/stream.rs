//! Batch conversion: run many file jobs concurrently, emit results as they
//! complete.
//!
//! Results arrive in completion order, not submission order. Each
//! [`JobResult`] carries its [`FileJob`], so callers can match them up.
//! A failing job never stops the others.

use crate::convert::{extension_tag, ConversionPipeline};
use crate::error::ConvertError;
use crate::format::{FormatPair, FormatTag, Side};
use crate::output::ConversionOutcome;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// One file to convert.
#[derive(Debug, Clone)]
pub struct FileJob {
    pub source: PathBuf,
    pub target: PathBuf,
    /// Overrides the source extension.
    pub source_format: Option<String>,
    /// Overrides the target extension.
    pub target_format: Option<String>,
    pub cancel: Option<CancellationToken>,
}

impl FileJob {
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_format: None,
            target_format: None,
            cancel: None,
        }
    }

    pub fn source_format(mut self, format: impl Into<String>) -> Self {
        self.source_format = Some(format.into());
        self
    }

    pub fn target_format(mut self, format: impl Into<String>) -> Self {
        self.target_format = Some(format.into());
        self
    }

    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The pair this job converts: explicit formats first, then extensions.
    pub fn pair(&self) -> Result<FormatPair, ConvertError> {
        let source = resolve(Side::Source, self.source_format.as_deref(), &self.source)?;
        let target = resolve(Side::Target, self.target_format.as_deref(), &self.target)?;
        Ok(FormatPair::new(source, target))
    }
}

fn resolve(side: Side, explicit: Option<&str>, path: &Path) -> Result<FormatTag, ConvertError> {
    match explicit {
        Some(f) => {
            FormatTag::parse(f).map_err(|reason| ConvertError::unknown_format(side, f, reason))
        }
        None => extension_tag(side, path),
    }
}

/// The result of one [`FileJob`].
#[derive(Debug)]
pub struct JobResult {
    pub job: FileJob,
    pub result: Result<ConversionOutcome, ConvertError>,
}

impl JobResult {
    pub fn succeeded(&self) -> bool {
        matches!(&self.result, Ok(o) if o.succeeded())
    }
}

/// A boxed stream of job results.
pub type JobStream = Pin<Box<dyn Stream<Item = JobResult> + Send>>;

/// Convert `jobs`, at most `config.concurrency` at a time.
///
/// # Example
/// ```rust,no_run
/// use fileconvert::stream::{convert_many, FileJob};
/// use fileconvert::{ConversionPipeline, PipelineConfig};
/// use futures::StreamExt;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let pipeline = Arc::new(ConversionPipeline::with_builtins(PipelineConfig::default())?);
/// let jobs = vec![FileJob::new("a.txt", "a.pdf"), FileJob::new("b.md", "b.html")];
/// let mut results = convert_many(pipeline, jobs);
/// while let Some(r) = results.next().await {
///     match r.result {
///         Ok(o) => println!("{}: {} bytes", r.job.target.display(), o.bytes_written),
///         Err(e) => eprintln!("{}: {e}", r.job.source.display()),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn convert_many(pipeline: Arc<ConversionPipeline>, jobs: Vec<FileJob>) -> JobStream {
    let concurrency = pipeline.config().concurrency.max(1);
    info!(
        "Starting batch conversion: {} jobs, concurrency {}",
        jobs.len(),
        concurrency
    );

    let s = stream::iter(jobs.into_iter().map(move |job| {
        let pipeline = Arc::clone(&pipeline);
        async move {
            let result = run_job(&pipeline, &job).await;
            if let Err(ref e) = result {
                warn!("Job {} failed: {}", job.source.display(), e);
            }
            JobResult { job, result }
        }
    }))
    .buffer_unordered(concurrency);

    Box::pin(s)
}

async fn run_job(
    pipeline: &ConversionPipeline,
    job: &FileJob,
) -> Result<ConversionOutcome, ConvertError> {
    let pair = job.pair()?;
    let Some(selected) = pipeline.select_pair(&pair).await? else {
        return Ok(ConversionOutcome::no_converter(pair));
    };
    let selected = match &job.cancel {
        Some(token) => selected.cancel_on(token.clone()),
        None => selected,
    };
    selected.convert_file(&job.source, &job.target).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::output::OutcomeStatus;

    #[test]
    fn pair_prefers_explicit_formats() {
        let job = FileJob::new("in.dat", "out.bin")
            .source_format("JSON")
            .target_format("xml");
        assert_eq!(job.pair().unwrap().to_string(), "json → xml");

        let job = FileJob::new("notes.md", "notes.html");
        assert_eq!(job.pair().unwrap().to_string(), "md → html");

        let err = FileJob::new("README", "out.pdf").pair().unwrap_err();
        assert!(matches!(err, ConvertError::UnknownFormat { side: Side::Source, .. }));
    }

    #[test]
    fn extension_errors_match_single_file_conversion() {
        let job = FileJob::new("notes.txt", "/out/README");
        let batch = job.pair().unwrap_err().to_string();
        let single = extension_tag(Side::Target, Path::new("/out/README"))
            .unwrap_err()
            .to_string();
        assert_eq!(batch, single);
        assert!(batch.contains("/out/README"));

        let err = FileJob::new("notes.txt", "out.pdf")
            .target_format("p d f")
            .pair()
            .unwrap_err();
        assert!(err.to_string().contains("p d f"));
    }

    #[tokio::test]
    async fn batch_reports_every_job() {
        let dir = tempfile::tempdir().unwrap();
        let md = dir.path().join("a.md");
        std::fs::write(&md, "# A").unwrap();

        let pipeline = Arc::new(ConversionPipeline::with_builtins(PipelineConfig::default()).unwrap());
        let jobs = vec![
            FileJob::new(&md, dir.path().join("a.html")),
            FileJob::new(dir.path().join("missing.md"), dir.path().join("m.html")),
            FileJob::new(&md, dir.path().join("a.docx")),
        ];

        let mut results: Vec<JobResult> = convert_many(pipeline, jobs).collect().await;
        results.sort_by(|a, b| a.job.target.cmp(&b.job.target));
        assert_eq!(results.len(), 3);

        let by_name = |name: &str| {
            results
                .iter()
                .find(|r| r.job.target.file_name().unwrap() == name)
                .unwrap()
        };
        assert!(by_name("a.html").succeeded());
        assert!(by_name("m.html").result.as_ref().unwrap_err().is_resource());
        assert_eq!(
            by_name("a.docx").result.as_ref().unwrap().status,
            OutcomeStatus::NoConverter
        );
        assert!(!dir.path().join("m.html").exists());
    }
}
