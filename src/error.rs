//! Error types for the fileconvert library.
//!
//! The taxonomy follows where a failure happens, because each point of
//! failure has a different blast radius:
//!
//! * [`RegistrationError`] — a malformed descriptor at startup. Fatal to that
//!   one registration; the remaining descriptors still register.
//! * Lookup miss — *not* an error. [`crate::ConverterRegistry::lookup`]
//!   returns `None` and [`crate::ConversionOutcome`] reports
//!   [`crate::OutcomeStatus::NoConverter`] so callers can render "no converter
//!   available" without unwinding.
//! * [`ConstructionError`] — a descriptor exists but its factory failed.
//!   `Clone` because every caller waiting on the same single-flight slot
//!   receives a copy of the same error.
//! * [`TransformError`] — what a [`crate::Converter`] returns: the stage it
//!   failed in plus the underlying cause.
//! * [`ResourceError`] — I/O failure opening, buffering, flushing, staging or
//!   persisting.
//! * [`ConvertError`] — everything the pipeline returns to its caller, with the
//!   format pair attached wherever one is known.

use crate::format::{FormatPair, FormatTagError, Side};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Boxed cause carried by converter and factory failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// ── Registration ─────────────────────────────────────────────────────────

/// A descriptor could not be added to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// The source or target tag was empty or malformed.
    #[error("Cannot register '{converter}': invalid {side} format '{input}': {reason}")]
    InvalidFormat {
        converter: String,
        side: Side,
        input: String,
        reason: FormatTagError,
    },

    /// The pair is already registered and the duplicate policy is `Reject`.
    #[error("Cannot register '{converter}' for {pair}: already provided by '{existing}'")]
    Duplicate {
        converter: String,
        pair: FormatPair,
        existing: String,
    },
}

// ── Construction ─────────────────────────────────────────────────────────

/// A registered converter could not be instantiated.
#[derive(Debug, Clone, Error)]
pub enum ConstructionError {
    /// The factory returned an error (or panicked).
    #[error("Failed to construct converter '{converter}' for {pair}: {reason}")]
    Failed {
        pair: FormatPair,
        converter: String,
        reason: Arc<str>,
    },

    /// The factory produced a converter whose advertised formats do not
    /// match the descriptor it was registered under.
    #[error(
        "Converter '{converter}' registered for {pair} advertises {advertised}; \
         check the descriptor's source/target formats"
    )]
    ContractViolation {
        pair: FormatPair,
        converter: String,
        advertised: FormatPair,
    },

    /// An earlier construction failed and the cache keeps failures (sticky
    /// policy). Call `ConverterCache::reset` to allow another attempt.
    #[error(
        "Converter '{converter}' for {pair} previously failed to construct and is disabled \
         until reset: {reason}"
    )]
    Poisoned {
        pair: FormatPair,
        converter: String,
        reason: Arc<str>,
    },
}

impl ConstructionError {
    pub fn pair(&self) -> &FormatPair {
        match self {
            ConstructionError::Failed { pair, .. }
            | ConstructionError::ContractViolation { pair, .. }
            | ConstructionError::Poisoned { pair, .. } => pair,
        }
    }

    pub fn converter(&self) -> &str {
        match self {
            ConstructionError::Failed { converter, .. }
            | ConstructionError::ContractViolation { converter, .. }
            | ConstructionError::Poisoned { converter, .. } => converter,
        }
    }

    /// `true` for the cached-failure variant returned under the sticky policy.
    pub fn is_poisoned(&self) -> bool {
        matches!(self, ConstructionError::Poisoned { .. })
    }

    /// Re-label a cached failure for callers that arrive after it was stored.
    pub(crate) fn into_poisoned(self) -> Self {
        match self {
            ConstructionError::Failed {
                pair,
                converter,
                reason,
            } => ConstructionError::Poisoned {
                pair,
                converter,
                reason,
            },
            ConstructionError::ContractViolation {
                pair,
                converter,
                advertised,
            } => ConstructionError::Poisoned {
                reason: format!("advertises {advertised}").into(),
                pair,
                converter,
            },
            poisoned @ ConstructionError::Poisoned { .. } => poisoned,
        }
    }
}

// ── Transform ────────────────────────────────────────────────────────────

/// Where inside a transform a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Reading or decoding the source bytes.
    Read,
    /// The format transformation itself.
    Transform,
    /// Encoding or writing to the target.
    Write,
    /// The call was cancelled before it finished.
    Cancelled,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Read => "read",
            Stage::Transform => "transform",
            Stage::Write => "write",
            Stage::Cancelled => "cancelled",
        })
    }
}

/// Failure returned by [`crate::Converter::transform`].
#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct TransformError {
    pub stage: Stage,
    #[source]
    pub source: BoxError,
}

impl TransformError {
    pub fn new(stage: Stage, source: impl Into<BoxError>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }

    pub fn read(source: impl Into<BoxError>) -> Self {
        Self::new(Stage::Read, source)
    }

    pub fn transform(source: impl Into<BoxError>) -> Self {
        Self::new(Stage::Transform, source)
    }

    pub fn write(source: impl Into<BoxError>) -> Self {
        Self::new(Stage::Write, source)
    }

    pub fn cancelled() -> Self {
        Self::new(Stage::Cancelled, "conversion was cancelled")
    }
}

// ── Resources ────────────────────────────────────────────────────────────

/// The I/O operation a [`ResourceError`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceOp {
    OpenSource,
    CreateTarget,
    BufferSource,
    FlushTarget,
    Stage,
    Persist,
}

impl fmt::Display for ResourceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceOp::OpenSource => "open source",
            ResourceOp::CreateTarget => "create target",
            ResourceOp::BufferSource => "buffer source",
            ResourceOp::FlushTarget => "flush target",
            ResourceOp::Stage => "create staging file",
            ResourceOp::Persist => "persist staged output",
        })
    }
}

/// I/O failure on a file or stream the pipeline manages.
#[derive(Debug, Error)]
pub struct ResourceError {
    pub op: ResourceOp,
    pub path: Option<PathBuf>,
    #[source]
    pub source: std::io::Error,
}

impl ResourceError {
    pub fn new(op: ResourceOp, path: Option<PathBuf>, source: std::io::Error) -> Self {
        Self { op, path, source }
    }

    pub fn at(op: ResourceOp, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::new(op, Some(path.into()), source)
    }

    pub fn stream(op: ResourceOp, source: std::io::Error) -> Self {
        Self::new(op, None, source)
    }

    pub fn is_not_found(&self) -> bool {
        self.source.kind() == std::io::ErrorKind::NotFound
    }
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "Failed to {} '{}': {}", self.op, path.display(), self.source),
            None => write!(f, "Failed to {}: {}", self.op, self.source),
        }
    }
}

// ── Pipeline ─────────────────────────────────────────────────────────────

/// All errors returned by the conversion pipeline.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// No converter is registered for the pair.
    ///
    /// Only produced by [`crate::ConversionOutcome::into_result`]; the
    /// pipeline itself reports a miss as a normal outcome.
    #[error("No converter available for {pair}")]
    NoConverter { pair: FormatPair },

    /// A format string could not be parsed into a tag.
    #[error("Unknown {side} format '{input}': {reason}")]
    UnknownFormat {
        side: Side,
        input: String,
        reason: FormatTagError,
    },

    /// The converter exists but could not be built.
    #[error(transparent)]
    Construction(#[from] ConstructionError),

    /// The converter failed while transforming.
    #[error("Converting {pair} with '{converter}' failed ({source_len} source bytes): {cause}")]
    Conversion {
        converter: String,
        pair: FormatPair,
        source_len: u64,
        stage: Stage,
        #[source]
        cause: TransformError,
    },

    /// The call's cancellation token fired.
    #[error("Converting {pair} with '{converter}' was cancelled")]
    Cancelled { converter: String, pair: FormatPair },

    /// The source exceeded `max_source_bytes`.
    #[error("Source for {pair} exceeds the {limit}-byte limit\nRaise max_source_bytes to allow larger inputs.")]
    SourceTooLarge { pair: FormatPair, limit: u64 },

    /// File or stream I/O failed.
    #[error("{pair}: {source}")]
    Resource {
        pair: FormatPair,
        #[source]
        source: ResourceError,
    },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    pub(crate) fn unknown_format(side: Side, input: &str, reason: FormatTagError) -> Self {
        ConvertError::UnknownFormat {
            side,
            input: input.to_string(),
            reason,
        }
    }

    /// The format pair this error refers to, when one is known.
    pub fn pair(&self) -> Option<&FormatPair> {
        match self {
            ConvertError::NoConverter { pair }
            | ConvertError::Conversion { pair, .. }
            | ConvertError::Cancelled { pair, .. }
            | ConvertError::SourceTooLarge { pair, .. }
            | ConvertError::Resource { pair, .. } => Some(pair),
            ConvertError::Construction(e) => Some(e.pair()),
            ConvertError::UnknownFormat { .. }
            | ConvertError::InvalidConfig(_)
            | ConvertError::Internal(_) => None,
        }
    }

    /// The transform stage, for conversion failures.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ConvertError::Conversion { stage, .. } => Some(*stage),
            ConvertError::Cancelled { .. } => Some(Stage::Cancelled),
            _ => None,
        }
    }

    pub fn is_resource(&self) -> bool {
        matches!(self, ConvertError::Resource { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ConvertError::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FormatTag;

    fn pair() -> FormatPair {
        FormatPair::new(
            FormatTag::parse("txt").unwrap(),
            FormatTag::parse("pdf").unwrap(),
        )
    }

    #[test]
    fn conversion_display_carries_pair_and_cause() {
        let e = ConvertError::Conversion {
            converter: "TextToPdf".into(),
            pair: pair(),
            source_len: 42,
            stage: Stage::Transform,
            cause: TransformError::transform("font table missing"),
        };
        let msg = e.to_string();
        assert!(msg.contains("txt → pdf"), "got: {msg}");
        assert!(msg.contains("TextToPdf"), "got: {msg}");
        assert!(msg.contains("42 source bytes"), "got: {msg}");
        assert!(msg.contains("font table missing"), "got: {msg}");
        assert_eq!(e.stage(), Some(Stage::Transform));
    }

    #[test]
    fn resource_display_with_and_without_path() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let e = ResourceError::at(ResourceOp::OpenSource, "/tmp/in.txt", io);
        assert!(e.is_not_found());
        assert!(e.to_string().contains("open source '/tmp/in.txt'"));

        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let e = ResourceError::stream(ResourceOp::FlushTarget, io);
        assert_eq!(e.to_string(), "Failed to flush target: pipe");
    }

    #[test]
    fn resource_error_keeps_pair_context() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let e = ConvertError::Resource {
            pair: pair(),
            source: ResourceError::at(ResourceOp::OpenSource, "/x", io),
        };
        assert!(e.is_resource());
        assert!(e.to_string().starts_with("txt → pdf"));
    }

    #[test]
    fn failed_becomes_poisoned() {
        let e = ConstructionError::Failed {
            pair: pair(),
            converter: "Broken".into(),
            reason: "libfoo missing".into(),
        };
        assert!(!e.is_poisoned());
        let p = e.into_poisoned();
        assert!(p.is_poisoned());
        assert!(p.to_string().contains("libfoo missing"));
        assert_eq!(p.converter(), "Broken");
    }

    #[test]
    fn construction_converts_into_convert_error() {
        let e: ConvertError = ConstructionError::Failed {
            pair: pair(),
            converter: "Broken".into(),
            reason: "boom".into(),
        }
        .into();
        assert_eq!(e.pair(), Some(&pair()));
        assert!(e.to_string().contains("boom"));
    }
}
