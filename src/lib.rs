//! # fileconvert
//!
//! Pluggable file-format conversion: a registry of converters keyed by
//! `(source, target)` format pair, a cache that builds each converter at most
//! once, and a pipeline that streams bytes through the selected converter.
//!
//! ## Why this crate?
//!
//! Hosts that offer "convert to…" actions (file managers, clipboard tools,
//! batch scripts) need the same three things: a catalog they can query to
//! grey out impossible pairs, expensive converters built lazily and shared,
//! and one call that turns a source stream into a target stream with useful
//! errors. The conversions themselves are strategies behind the
//! [`Converter`] trait; the dispatch core never looks at the bytes.
//!
//! ## Pipeline Overview
//!
//! ```text
//! (source fmt, target fmt)
//!  │
//!  ├─ 1. Lookup    ConverterRegistry: pair → descriptor, or "no converter"
//!  ├─ 2. Build     ConverterCache: single-flight factory call per pair
//!  ├─ 3. Buffer    drain the source once (optional size limit)
//!  ├─ 4. Convert   Converter::transform from a fresh cursor
//!  └─ 5. Flush     count bytes, flush target, report ConversionOutcome
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fileconvert::{ConversionPipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = ConversionPipeline::with_builtins(PipelineConfig::default())?;
//!
//!     // Formats from the extensions; a pair nobody registered is not an error.
//!     let outcome = pipeline.convert_file("notes.txt", "notes.pdf").await?;
//!     if outcome.succeeded() {
//!         eprintln!("{} bytes written", outcome.bytes_written);
//!     } else {
//!         eprintln!("No converter available for {}", outcome.pair);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Custom Converters
//!
//! ```rust
//! use async_trait::async_trait;
//! use fileconvert::{
//!     read_to_vec, write_all_and_flush, Converter, ConverterDescriptor, ConverterRegistry,
//!     FormatTag, TransformContext, TransformError,
//! };
//! use tokio::io::{AsyncRead, AsyncWrite};
//!
//! struct Shout {
//!     source: FormatTag,
//!     target: FormatTag,
//! }
//!
//! #[async_trait]
//! impl Converter for Shout {
//!     fn source_format(&self) -> &FormatTag { &self.source }
//!     fn target_format(&self) -> &FormatTag { &self.target }
//!
//!     async fn transform(
//!         &self,
//!         source: &mut (dyn AsyncRead + Unpin + Send),
//!         target: &mut (dyn AsyncWrite + Unpin + Send),
//!         _ctx: &TransformContext,
//!     ) -> Result<(), TransformError> {
//!         let text = read_to_vec(source).await?.to_ascii_uppercase();
//!         write_all_and_flush(target, &text).await
//!     }
//! }
//!
//! let mut builder = ConverterRegistry::builder();
//! builder
//!     .register(ConverterDescriptor::new("txt", "shout", || Shout {
//!         source: "txt".parse().unwrap(),
//!         target: "shout".parse().unwrap(),
//!     }))
//!     .unwrap();
//! let registry = builder.build();
//! assert!(registry.contains("TXT", ".shout"));
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `fileconv` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! fileconvert = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cache;
pub mod config;
pub mod convert;
pub mod converter;
pub mod converters;
pub mod error;
pub mod format;
pub mod observer;
pub mod output;
pub mod pipeline;
pub mod registry;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cache::ConverterCache;
pub use config::{DuplicatePolicy, FailurePolicy, PipelineConfig, PipelineConfigBuilder};
pub use convert::{ConversionPipeline, SelectedConverter};
pub use converter::{read_to_vec, run_blocking, write_all_and_flush, Converter, TransformContext};
pub use converters::builtin_descriptors;
pub use error::{
    BoxError, ConstructionError, ConvertError, RegistrationError, ResourceError, ResourceOp,
    Stage, TransformError,
};
pub use format::{FormatPair, FormatTag, FormatTagError, Side};
pub use observer::{ConversionObserver, FailureReport, NoopObserver, SharedObserver};
pub use output::{ConversionOutcome, OutcomeStatus};
pub use registry::{ConverterDescriptor, ConverterRegistry, RegisteredConverter, RegistryBuilder};
pub use stream::{convert_many, FileJob, JobResult};
