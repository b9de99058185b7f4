//! CLI binary for fileconvert.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, runs the batch and prints results.

use anyhow::{bail, Context, Result};
use clap::Parser;
use fileconvert::stream::{convert_many, FileJob};
use fileconvert::{
    ConversionObserver, ConversionOutcome, ConversionPipeline, FailurePolicy, FailureReport,
    FormatPair, FormatTag, OutcomeStatus, PipelineConfig, SharedObserver,
};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress observer using indicatif ────────────────────────────────────

/// Terminal observer: a live bar over the batch plus one log line per file.
/// Jobs finish out of order, so every line names its own pair.
struct CliProgress {
    bar: ProgressBar,
    failures: AtomicUsize,
}

impl CliProgress {
    fn new(total: usize) -> Arc<Self> {
        let bar = ProgressBar::new(total as u64);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            failures: AtomicUsize::new(0),
        })
    }
}

impl ConversionObserver for CliProgress {
    fn on_converter_constructed(&self, pair: &FormatPair, converter: &str) {
        self.bar
            .println(format!("  {} {} ready for {}", dim("·"), converter, pair));
    }

    fn on_conversion_complete(&self, outcome: &ConversionOutcome) {
        self.bar.println(format!(
            "  {} {:<14}  {}  {}",
            green("✓"),
            outcome.pair.to_string(),
            dim(&format!("{:>9} → {:<9} bytes", outcome.bytes_read, outcome.bytes_written)),
            dim(&format!("{:.1}s", outcome.duration_ms as f64 / 1000.0)),
        ));
    }

    fn on_conversion_failed(&self, report: &FailureReport) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.bar.println(format!("  {} {}", red("✗"), report));
    }

    fn on_lookup_miss(&self, pair: &FormatPair) {
        self.bar
            .println(format!("  {} no converter for {}", yellow("–"), pair));
    }
}

// ── CLI definition ───────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  fileconv notes.txt --to pdf                Write notes.pdf next to notes.txt
  fileconv report.pdf --to txt -o out.txt    Explicit output path
  fileconv *.png --to jpg --out-dir jpgs/    Batch, 4 files at a time
  cat data.json | fileconv - --from json --to xml > data.xml
  fileconv --list-formats                    Show every registered pair

ENVIRONMENT:
  Every flag can also be set through FILECONV_<FLAG>, e.g. FILECONV_CONCURRENCY=8.
  RUST_LOG overrides the log filter chosen by -v / -q."#;

/// Convert files between formats using the built-in converters.
#[derive(Parser, Debug)]
#[command(
    name = "fileconv",
    version,
    about = "Convert files between formats (txt, pdf, md, html, json, xml, png, jpg, bmp, webp)",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input files. `-` reads from stdin and writes to stdout (requires --from).
    #[arg(required_unless_present = "list_formats")]
    inputs: Vec<PathBuf>,

    /// Target format (e.g. pdf, png, html).
    #[arg(short, long, env = "FILECONV_TO", required_unless_present = "list_formats")]
    to: Option<String>,

    /// Source format; defaults to each input's extension.
    #[arg(long, env = "FILECONV_FROM")]
    from: Option<String>,

    /// Output path (single input only).
    #[arg(short, long, env = "FILECONV_OUTPUT")]
    output: Option<PathBuf>,

    /// Directory for outputs; defaults to each input's directory.
    #[arg(long, env = "FILECONV_OUT_DIR", conflicts_with = "output")]
    out_dir: Option<PathBuf>,

    /// Maximum files converted at once.
    #[arg(short, long, env = "FILECONV_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Write through a temporary file and rename, so targets are never partial.
    #[arg(long, env = "FILECONV_ATOMIC")]
    atomic: bool,

    /// Stop retrying a converter whose construction failed once.
    #[arg(long, env = "FILECONV_STICKY_FAILURES")]
    sticky_failures: bool,

    /// Refuse sources larger than this many bytes.
    #[arg(long, env = "FILECONV_MAX_SOURCE_BYTES")]
    max_source_bytes: Option<u64>,

    /// List the registered conversions and exit.
    #[arg(long)]
    list_formats: bool,

    /// Print results as JSON on stdout.
    #[arg(long, env = "FILECONV_JSON")]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "FILECONV_NO_PROGRESS")]
    no_progress: bool,

    /// Debug logging.
    #[arg(short, long, env = "FILECONV_VERBOSE")]
    verbose: bool,

    /// Errors only.
    #[arg(short, long, env = "FILECONV_QUIET")]
    quiet: bool,
}

/// One line of `--json` output.
#[derive(Serialize)]
struct JobReport {
    source: PathBuf,
    target: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<ConversionOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Library INFO logs are suppressed while the progress bar is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.list_formats;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    if cli.list_formats {
        let pipeline = ConversionPipeline::with_builtins(PipelineConfig::default())
            .context("Failed to load converters")?;
        return list_formats(&pipeline, cli.json);
    }

    let Some(target_format) = cli.to.as_deref() else {
        bail!("--to is required");
    };
    let target_tag = FormatTag::parse(target_format)
        .with_context(|| format!("Invalid target format '{target_format}'"))?;

    // ── Stdin → stdout mode ──────────────────────────────────────────────
    if cli.inputs.len() == 1 && cli.inputs[0] == Path::new("-") {
        let Some(source_format) = cli.from.as_deref() else {
            bail!("Reading from stdin requires --from");
        };
        let pipeline = ConversionPipeline::with_builtins(build_config(&cli, None)?)
            .context("Failed to load converters")?;
        let outcome = pipeline
            .convert_stream(
                source_format,
                target_tag.as_str(),
                &mut tokio::io::stdin(),
                &mut tokio::io::stdout(),
            )
            .await
            .context("Conversion failed")?
            .into_result()?;
        if !cli.quiet && !cli.json {
            eprintln!(
                "{} {}  {} → {} bytes",
                green("✔"),
                outcome.pair,
                outcome.bytes_read,
                outcome.bytes_written
            );
        }
        return Ok(());
    }

    // ── Build jobs ───────────────────────────────────────────────────────
    let jobs = plan_jobs(&cli, &target_tag)?;

    let progress = if show_progress {
        Some(CliProgress::new(jobs.len()))
    } else {
        None
    };
    let observer = progress.clone().map(|p| p as SharedObserver);
    let pipeline = Arc::new(
        ConversionPipeline::with_builtins(build_config(&cli, observer)?)
            .context("Failed to load converters")?,
    );

    // ── Run ──────────────────────────────────────────────────────────────
    let started = Instant::now();
    let total = jobs.len();
    let mut results = convert_many(pipeline, jobs);
    let mut reports = Vec::with_capacity(total);
    let mut converted = 0usize;
    let mut first_error: Option<String> = None;

    while let Some(r) = results.next().await {
        if let Some(p) = &progress {
            p.bar.inc(1);
        }
        let (outcome, error) = match r.result {
            Ok(o) if o.status == OutcomeStatus::Converted => {
                converted += 1;
                (Some(o), None)
            }
            Ok(o) => {
                let msg = format!("No converter available for {}", o.pair);
                (Some(o), Some(msg))
            }
            Err(e) => (None, Some(e.to_string())),
        };
        if let Some(msg) = &error {
            if first_error.is_none() {
                first_error = Some(format!("{}: {}", r.job.source.display(), msg));
            }
            if progress.is_none() && !cli.json {
                eprintln!("{} {}: {}", red("✗"), r.job.source.display(), msg);
            }
        }
        reports.push(JobReport {
            source: r.job.source,
            target: r.job.target,
            outcome,
            error,
        });
    }

    if let Some(p) = &progress {
        p.bar.finish_and_clear();
    }

    // ── Report ───────────────────────────────────────────────────────────
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&reports).context("Failed to serialise results")?
        );
    } else if !cli.quiet {
        let failed = progress
            .as_ref()
            .map_or(0, |p| p.failures.load(Ordering::Relaxed));
        eprintln!(
            "{}",
            summary_line(converted, total, failed, started.elapsed().as_millis())
        );
        if total == 1 && converted == 1 {
            eprintln!("   →  {}", bold(&reports[0].target.display().to_string()));
        }
    }

    if let Some(err) = first_error {
        bail!("{} of {} conversions failed; first: {}", total - converted, total, err);
    }
    Ok(())
}

/// `failed` counts failures inside a selected converter; misses are not included.
fn summary_line(converted: usize, total: usize, failed: usize, elapsed_ms: u128) -> String {
    let mark = if converted == total {
        green("✔")
    } else {
        yellow("⚠")
    };
    let failed = if failed > 0 {
        format!("  {}", red(&format!("{failed} failed")))
    } else {
        String::new()
    };
    format!("{mark}  {converted}/{total} files{failed}  {elapsed_ms}ms")
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, observer: Option<SharedObserver>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .concurrency(cli.concurrency)
        .atomic_writes(cli.atomic)
        .failure_policy(if cli.sticky_failures {
            FailurePolicy::Sticky
        } else {
            FailurePolicy::Retry
        });
    if let Some(limit) = cli.max_source_bytes {
        builder = builder.max_source_bytes(limit);
    }
    if let Some(obs) = observer {
        builder = builder.observer(obs);
    }
    builder.build().context("Invalid configuration")
}

/// One job per input; the target path comes from `-o`, `--out-dir` or the
/// input's own directory.
fn plan_jobs(cli: &Cli, target: &FormatTag) -> Result<Vec<FileJob>> {
    if cli.output.is_some() && cli.inputs.len() > 1 {
        bail!("-o/--output accepts a single input; use --out-dir for several");
    }

    let mut jobs = Vec::with_capacity(cli.inputs.len());
    for input in &cli.inputs {
        if input == Path::new("-") {
            bail!("'-' (stdin) cannot be combined with other inputs");
        }
        let target_path = match (&cli.output, &cli.out_dir) {
            (Some(output), _) => output.clone(),
            (None, dir) => {
                let stem = input
                    .file_stem()
                    .with_context(|| format!("Input '{}' has no file name", input.display()))?;
                let file_name = format!("{}.{}", stem.to_string_lossy(), target);
                match dir {
                    Some(dir) => dir.join(file_name),
                    None => input.with_file_name(file_name),
                }
            }
        };
        if target_path == *input {
            bail!(
                "Output '{}' would overwrite its input",
                target_path.display()
            );
        }

        let mut job = FileJob::new(input, target_path).target_format(target.as_str());
        if let Some(from) = &cli.from {
            job = job.source_format(from);
        }
        jobs.push(job);
    }

    if let Some(dir) = &cli.out_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    }
    Ok(jobs)
}

/// Print the conversion table, one source per line.
fn list_formats(pipeline: &ConversionPipeline, json: bool) -> Result<()> {
    let registry = pipeline.registry();
    if json {
        let table: Vec<serde_json::Value> = registry
            .list_source_formats()
            .into_iter()
            .map(|source| {
                let targets: Vec<String> = registry
                    .list_target_formats(source.as_str())
                    .into_iter()
                    .map(String::from)
                    .collect();
                serde_json::json!({ "source": source, "targets": targets })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&table).context("Failed to serialise formats")?
        );
        return Ok(());
    }

    for source in registry.list_source_formats() {
        let targets: Vec<String> = registry
            .list_target_formats(source.as_str())
            .into_iter()
            .map(String::from)
            .collect();
        println!("{:<6} → {}", bold(source.as_str()), targets.join(", "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_reports_converter_failures() {
        let line = summary_line(1, 3, 1, 42);
        assert!(line.contains("1/3 files"));
        assert!(line.contains("1 failed"));
        assert!(line.ends_with("42ms"));

        let clean = summary_line(2, 2, 0, 7);
        assert!(!clean.contains("failed"));
    }
}
