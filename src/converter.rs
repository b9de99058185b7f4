//! The converter contract every conversion strategy implements.
//!
//! A [`Converter`] handles exactly one `(source, target)` pair. Instances are
//! built lazily by [`crate::ConverterCache`] and then *shared*: the same
//! `Arc<dyn Converter>` serves every request for its pair, concurrently. An
//! implementation must therefore keep all per-call state on the stack of
//! [`Converter::transform`] (or in files from [`TransformContext::stage_file`]),
//! never in `self`.
//!
//! ## Stream contract
//!
//! `transform` receives the source positioned at its start and must:
//!
//! 1. read it to the end at most once (copying internally if it needs
//!    several passes),
//! 2. write the result to `target` and flush it before returning,
//! 3. never shut down either stream: both belong to the caller,
//! 4. return a [`TransformError`] tagged with the [`Stage`] that failed
//!    rather than writing partial output and reporting success.

use crate::error::{ResourceError, Stage, TransformError};
use crate::format::{FormatPair, FormatTag};
use crate::pipeline::staging::{StagedFile, StagingArea};
use async_trait::async_trait;
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// A conversion strategy for one format pair.
#[async_trait]
pub trait Converter: Send + Sync {
    fn source_format(&self) -> &FormatTag;

    fn target_format(&self) -> &FormatTag;

    /// Identity used in logs and errors. Defaults to the implementing type's name.
    fn name(&self) -> &str {
        short_type_name::<Self>()
    }

    /// Whether this converter handles `source → target`.
    ///
    /// Must be a pure predicate. Tags are already case-normalised, so the
    /// default equality check is case-insensitive.
    fn can_convert(&self, source: &FormatTag, target: &FormatTag) -> bool {
        source == self.source_format() && target == self.target_format()
    }

    /// Transform `source` into `target`. See the module docs for the contract.
    async fn transform(
        &self,
        source: &mut (dyn AsyncRead + Unpin + Send),
        target: &mut (dyn AsyncWrite + Unpin + Send),
        ctx: &TransformContext,
    ) -> Result<(), TransformError>;

    fn pair(&self) -> FormatPair {
        FormatPair::new(self.source_format().clone(), self.target_format().clone())
    }
}

impl fmt::Debug for dyn Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("name", &self.name())
            .field("pair", &self.pair())
            .finish()
    }
}

/// `my_crate::converters::TextToPdf<X>` → `TextToPdf`.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Per-call context handed to [`Converter::transform`].
#[derive(Debug, Clone)]
pub struct TransformContext {
    pair: FormatPair,
    converter: String,
    source_len: u64,
    cancel: CancellationToken,
    staging: StagingArea,
}

impl TransformContext {
    pub(crate) fn new(
        pair: FormatPair,
        converter: impl Into<String>,
        source_len: u64,
        cancel: CancellationToken,
        staging: StagingArea,
    ) -> Self {
        Self {
            pair,
            converter: converter.into(),
            source_len,
            cancel,
            staging,
        }
    }

    /// A context for driving a converter directly, outside the pipeline.
    ///
    /// Never cancelled; staging files go to the system temp directory.
    pub fn detached(converter: &dyn Converter, source_len: u64) -> Self {
        Self::new(
            converter.pair(),
            converter.name(),
            source_len,
            CancellationToken::new(),
            StagingArea::default(),
        )
    }

    pub fn pair(&self) -> &FormatPair {
        &self.pair
    }

    pub fn converter(&self) -> &str {
        &self.converter
    }

    /// Length of the buffered source in bytes.
    pub fn source_len(&self) -> u64 {
        self.source_len
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Return `Err(Stage::Cancelled)` if the caller gave up. Long-running
    /// converters call this between units of work.
    pub fn check_cancelled(&self) -> Result<(), TransformError> {
        if self.is_cancelled() {
            Err(TransformError::cancelled())
        } else {
            Ok(())
        }
    }

    /// Allocate a uniquely named temporary file owned by this call.
    ///
    /// The file is deleted when the returned handle drops, on every exit
    /// path. Names never collide across concurrent calls.
    pub fn stage_file(&self, suffix: &str) -> Result<StagedFile, ResourceError> {
        self.staging.stage(&self.converter, suffix)
    }
}

// ── Helpers for implementations ──────────────────────────────────────────

/// Read the whole source into memory, tagging failures as [`Stage::Read`].
pub async fn read_to_vec(
    source: &mut (dyn AsyncRead + Unpin + Send),
) -> Result<Vec<u8>, TransformError> {
    let mut buf = Vec::new();
    source
        .read_to_end(&mut buf)
        .await
        .map_err(TransformError::read)?;
    Ok(buf)
}

/// Write `bytes` and flush, tagging failures as [`Stage::Write`].
pub async fn write_all_and_flush(
    target: &mut (dyn AsyncWrite + Unpin + Send),
    bytes: &[u8],
) -> Result<(), TransformError> {
    target.write_all(bytes).await.map_err(TransformError::write)?;
    target.flush().await.map_err(TransformError::write)
}

/// Run CPU-bound work on the blocking pool.
///
/// A panic inside `work` becomes a [`Stage::Transform`] error instead of
/// unwinding through the caller.
pub async fn run_blocking<T, F>(work: F) -> Result<T, TransformError>
where
    F: FnOnce() -> Result<T, TransformError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| TransformError::new(Stage::Transform, format!("worker task failed: {e}")))?
}
