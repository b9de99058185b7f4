//! Conversion entry points: select a converter, then run it.
//!
//! [`ConversionPipeline`] owns the registry, the converter cache and the
//! configuration. A request goes through two steps:
//!
//! 1. [`ConversionPipeline::select_converter`] resolves the pair. A pair
//!    nobody registered is `Ok(None)`, not an error, so UI layers can grey
//!    out a menu entry without unwinding.
//! 2. [`SelectedConverter::convert_stream`] / [`SelectedConverter::convert_file`]
//!    buffer the source, run the converter and report a
//!    [`ConversionOutcome`].
//!
//! The `convert_*` methods on the pipeline combine both steps for callers
//! that just want an answer.

use crate::cache::ConverterCache;
use crate::config::PipelineConfig;
use crate::converter::{Converter, TransformContext};
use crate::converters::builtin_descriptors;
use crate::error::{ConvertError, ResourceError, ResourceOp, Stage, TransformError};
use crate::format::{FormatPair, FormatTag, Side};
use crate::observer::{ConversionObserver, FailureReport};
use crate::output::{ConversionOutcome, OutcomeStatus};
use crate::pipeline::input::{buffer_source, open_source, BufferError};
use crate::pipeline::output::CountingWriter;
use crate::pipeline::staging::StagingArea;
use crate::registry::ConverterRegistry;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Registry + cache + configuration. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct ConversionPipeline {
    registry: Arc<ConverterRegistry>,
    cache: ConverterCache,
    config: PipelineConfig,
}

impl ConversionPipeline {
    pub fn new(registry: ConverterRegistry, config: PipelineConfig) -> Self {
        Self::with_shared_registry(Arc::new(registry), config)
    }

    /// Several pipelines (e.g. with different failure policies) may share one
    /// catalog. Each still gets its own cache.
    pub fn with_shared_registry(registry: Arc<ConverterRegistry>, config: PipelineConfig) -> Self {
        let cache = ConverterCache::new(config.failure_policy).with_observer(config.observer.clone());
        info!(
            "Conversion pipeline ready: {} converters registered",
            registry.len()
        );
        Self {
            registry,
            cache,
            config,
        }
    }

    /// A pipeline over [`builtin_descriptors`].
    pub fn with_builtins(config: PipelineConfig) -> Result<Self, ConvertError> {
        let (registry, errors) =
            ConverterRegistry::from_descriptors(builtin_descriptors(), config.duplicate_policy);
        if let Some(first) = errors.first() {
            return Err(ConvertError::Internal(format!(
                "built-in converter failed to register: {first}"
            )));
        }
        Ok(Self::new(registry, config))
    }

    pub fn registry(&self) -> &ConverterRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &ConverterCache {
        &self.cache
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Resolve `source → target` to a ready-to-run converter.
    ///
    /// # Returns
    /// - `Ok(Some(_))` — converter constructed (or reused from the cache)
    /// - `Ok(None)` — nothing registered for the pair
    ///
    /// # Errors
    /// - [`ConvertError::UnknownFormat`] if a tag is empty or malformed
    /// - [`ConvertError::Construction`] if the factory failed
    pub async fn select_converter(
        &self,
        source: &str,
        target: &str,
    ) -> Result<Option<SelectedConverter<'_>>, ConvertError> {
        let pair = parse_pair(source, target)?;
        self.select_pair(&pair).await
    }

    /// [`Self::select_converter`] for an already-parsed pair.
    pub async fn select_pair(
        &self,
        pair: &FormatPair,
    ) -> Result<Option<SelectedConverter<'_>>, ConvertError> {
        let Some(entry) = self.registry.get(pair) else {
            debug!("No converter registered for {}", pair);
            if let Some(obs) = self.observer() {
                obs.on_lookup_miss(pair);
            }
            return Ok(None);
        };

        let converter = self.cache.get_or_create(entry).await?;
        Ok(Some(SelectedConverter {
            pipeline: self,
            converter,
            pair: pair.clone(),
            cancel: None,
        }))
    }

    /// Select and run in one step.
    ///
    /// A pair nobody registered returns `Ok` with
    /// [`OutcomeStatus::NoConverter`]; neither stream is touched.
    pub async fn convert_stream(
        &self,
        source_format: &str,
        target_format: &str,
        source: &mut (dyn AsyncRead + Unpin + Send),
        target: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<ConversionOutcome, ConvertError> {
        let pair = parse_pair(source_format, target_format)?;
        match self.select_pair(&pair).await? {
            Some(selected) => selected.convert_stream(source, target).await,
            None => Ok(ConversionOutcome::no_converter(pair)),
        }
    }

    /// Convert a file, taking both formats from the file extensions.
    pub async fn convert_file(
        &self,
        source_path: impl AsRef<Path>,
        target_path: impl AsRef<Path>,
    ) -> Result<ConversionOutcome, ConvertError> {
        let source_path = source_path.as_ref();
        let target_path = target_path.as_ref();
        let source = extension_tag(Side::Source, source_path)?;
        let target = extension_tag(Side::Target, target_path)?;
        self.convert_file_as(source.as_str(), target.as_str(), source_path, target_path)
            .await
    }

    /// Convert a file with explicit formats (e.g. a `.dat` file that is
    /// really JSON). A lookup miss leaves both paths untouched.
    pub async fn convert_file_as(
        &self,
        source_format: &str,
        target_format: &str,
        source_path: impl AsRef<Path>,
        target_path: impl AsRef<Path>,
    ) -> Result<ConversionOutcome, ConvertError> {
        let pair = parse_pair(source_format, target_format)?;
        match self.select_pair(&pair).await? {
            Some(selected) => selected.convert_file(source_path, target_path).await,
            None => Ok(ConversionOutcome::no_converter(pair)),
        }
    }

    /// Convert an in-memory buffer.
    ///
    /// # Example
    /// ```rust,no_run
    /// use fileconvert::{ConversionPipeline, PipelineConfig};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let pipeline = ConversionPipeline::with_builtins(PipelineConfig::default())?;
    /// let (outcome, pdf) = pipeline.convert_bytes("txt", "pdf", b"Hello").await?;
    /// assert!(outcome.succeeded());
    /// assert!(pdf.starts_with(b"%PDF-"));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn convert_bytes(
        &self,
        source_format: &str,
        target_format: &str,
        bytes: &[u8],
    ) -> Result<(ConversionOutcome, Vec<u8>), ConvertError> {
        let mut source = bytes;
        let mut target = Vec::new();
        let outcome = self
            .convert_stream(source_format, target_format, &mut source, &mut target)
            .await?;
        Ok((outcome, target))
    }

    /// Synchronous wrapper around [`Self::convert_bytes`].
    ///
    /// Creates a temporary tokio runtime internally, so it must not be
    /// called from inside an async context.
    pub fn convert_sync(
        &self,
        source_format: &str,
        target_format: &str,
        bytes: &[u8],
    ) -> Result<(ConversionOutcome, Vec<u8>), ConvertError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| ConvertError::Internal(format!("Failed to create tokio runtime: {}", e)))?
            .block_on(self.convert_bytes(source_format, target_format, bytes))
    }

    fn observer(&self) -> Option<&dyn ConversionObserver> {
        self.config.observer.as_deref()
    }
}

/// A constructed converter bound to its pipeline, ready to run.
#[derive(Debug)]
pub struct SelectedConverter<'p> {
    pipeline: &'p ConversionPipeline,
    converter: Arc<dyn Converter>,
    pair: FormatPair,
    cancel: Option<CancellationToken>,
}

impl SelectedConverter<'_> {
    pub fn converter(&self) -> &Arc<dyn Converter> {
        &self.converter
    }

    pub fn name(&self) -> &str {
        self.converter.name()
    }

    pub fn pair(&self) -> &FormatPair {
        &self.pair
    }

    /// Abort the conversion when `token` fires. The call then returns
    /// [`ConvertError::Cancelled`] without waiting for the converter.
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Buffer `source`, run the converter into `target`, flush `target`.
    ///
    /// Neither stream is closed. On failure `target` may hold partial output.
    pub async fn convert_stream(
        &self,
        source: &mut (dyn AsyncRead + Unpin + Send),
        target: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<ConversionOutcome, ConvertError> {
        let started = Instant::now();
        let config = &self.pipeline.config;
        let cancel = self.cancel.clone().unwrap_or_default();
        if cancel.is_cancelled() {
            return Err(self.fail(self.cancelled(), 0, 0));
        }

        // ── Step 1: Buffer the source ────────────────────────────────────
        // A forward-only source (pipe, socket) may stall; the token still wins.
        let buffered = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            r = buffer_source(
                source,
                config.max_source_bytes,
                config.initial_buffer_capacity,
            ) => Some(r),
        };
        let buffer = match buffered {
            None => return Err(self.fail(self.cancelled(), 0, 0)),
            Some(Ok(buffer)) => buffer,
            Some(Err(BufferError::Io(e))) => return Err(self.fail(self.resource(e), 0, 0)),
            Some(Err(BufferError::TooLarge { limit })) => {
                let e = ConvertError::SourceTooLarge {
                    pair: self.pair.clone(),
                    limit,
                };
                return Err(self.fail(e, limit, 0));
            }
        };
        let source_len = buffer.len();

        if let Some(obs) = self.pipeline.observer() {
            obs.on_conversion_start(&self.pair, self.name(), source_len);
        }
        info!(
            "Converting {} with {} ({} source bytes)",
            self.pair,
            self.name(),
            source_len
        );

        // ── Step 2: Transform from a fresh cursor ────────────────────────
        let ctx = TransformContext::new(
            self.pair.clone(),
            self.name(),
            source_len,
            cancel.clone(),
            StagingArea::new(config.staging_dir.clone()),
        );
        let mut reader = buffer.reader();
        let mut counter = CountingWriter::new(target);

        let transformed = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransformError::cancelled()),
            r = self.converter.transform(&mut reader, &mut counter, &ctx) => r,
        };

        if let Err(cause) = transformed {
            let written = counter.written();
            let e = if cause.stage == Stage::Cancelled {
                self.cancelled()
            } else {
                ConvertError::Conversion {
                    converter: self.name().to_string(),
                    pair: self.pair.clone(),
                    source_len,
                    stage: cause.stage,
                    cause,
                }
            };
            return Err(self.fail(e, source_len, written));
        }

        // ── Step 3: Flush ────────────────────────────────────────────────
        if let Err(e) = counter.flush().await {
            let written = counter.written();
            let e = self.resource(ResourceError::stream(ResourceOp::FlushTarget, e));
            return Err(self.fail(e, source_len, written));
        }

        let outcome = ConversionOutcome {
            pair: self.pair.clone(),
            converter: Some(self.name().to_string()),
            status: OutcomeStatus::Converted,
            bytes_read: source_len,
            bytes_written: counter.written(),
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            "Converted {}: {} → {} bytes in {}ms",
            self.pair, outcome.bytes_read, outcome.bytes_written, outcome.duration_ms
        );
        if let Some(obs) = self.pipeline.observer() {
            obs.on_conversion_complete(&outcome);
        }
        Ok(outcome)
    }

    /// Convert `source_path` into `target_path`.
    ///
    /// The source is opened first, so a missing source never creates or
    /// truncates the target. With `atomic_writes` the output goes to a
    /// hidden file beside the target and is renamed into place only on
    /// success; otherwise the target is truncated up front.
    pub async fn convert_file(
        &self,
        source_path: impl AsRef<Path>,
        target_path: impl AsRef<Path>,
    ) -> Result<ConversionOutcome, ConvertError> {
        let source_path = source_path.as_ref();
        let target_path = target_path.as_ref();
        debug!(
            "Converting file {} → {}",
            source_path.display(),
            target_path.display()
        );

        let mut source = open_source(source_path)
            .await
            .map_err(|e| self.fail(self.resource(e), 0, 0))?;

        if self.pipeline.config.atomic_writes {
            let staged = StagingArea::stage_beside(target_path)
                .map_err(|e| self.fail(self.resource(e), 0, 0))?;
            let mut handle = staged
                .async_handle()
                .map_err(|e| self.fail(self.resource(e), 0, 0))?;
            let outcome = self.convert_stream(&mut source, &mut handle).await?;
            drop(handle);
            staged.persist(target_path).map_err(|e| {
                self.fail(self.resource(e), outcome.bytes_read, outcome.bytes_written)
            })?;
            Ok(outcome)
        } else {
            let mut target = tokio::fs::File::create(target_path).await.map_err(|e| {
                let e = ResourceError::at(ResourceOp::CreateTarget, target_path, e);
                self.fail(self.resource(e), 0, 0)
            })?;
            self.convert_stream(&mut source, &mut target).await
        }
    }

    fn resource(&self, source: ResourceError) -> ConvertError {
        ConvertError::Resource {
            pair: self.pair.clone(),
            source,
        }
    }

    fn cancelled(&self) -> ConvertError {
        ConvertError::Cancelled {
            converter: self.name().to_string(),
            pair: self.pair.clone(),
        }
    }

    /// Log and report a failure, then hand the error back.
    fn fail(&self, e: ConvertError, source_len: u64, bytes_written: u64) -> ConvertError {
        error!(
            converter = self.name(),
            source_len, bytes_written, "Conversion failed: {}", e
        );
        if let Some(obs) = self.pipeline.observer() {
            obs.on_conversion_failed(&FailureReport {
                pair: self.pair.clone(),
                converter: self.name().to_string(),
                source_len,
                bytes_written,
                stage: e.stage(),
                message: e.to_string(),
            });
        }
        e
    }
}

fn parse_pair(source: &str, target: &str) -> Result<FormatPair, ConvertError> {
    FormatPair::parse(source, target).map_err(|(side, reason)| {
        let input = match side {
            Side::Source => source,
            Side::Target => target,
        };
        ConvertError::unknown_format(side, input, reason)
    })
}

pub(crate) fn extension_tag(side: Side, path: &Path) -> Result<FormatTag, ConvertError> {
    FormatTag::parse_extension(path)
        .map_err(|reason| ConvertError::unknown_format(side, &path.display().to_string(), reason))
}
