//! Observer trait: the injected diagnostic sink for conversion events.
//!
//! Inject an [`Arc<dyn ConversionObserver>`] via
//! [`crate::config::PipelineConfigBuilder::observer`] to receive events as
//! the registry, cache and pipeline work. The library also logs every event
//! through `tracing`; the observer is for hosts that want the same context in
//! their own log store, UI or metrics without parsing log lines.
//!
//! # Example
//!
//! ```rust
//! use fileconvert::{ConversionObserver, FailureReport, PipelineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct FailureCounter(AtomicUsize);
//!
//! impl ConversionObserver for FailureCounter {
//!     fn on_conversion_failed(&self, report: &FailureReport) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{report}");
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .observer(Arc::new(FailureCounter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::{ConstructionError, Stage};
use crate::format::FormatPair;
use crate::output::ConversionOutcome;
use std::fmt;
use std::sync::Arc;

/// Everything needed to reproduce a failed conversion.
#[derive(Debug, Clone)]
pub struct FailureReport {
    pub pair: FormatPair,
    pub converter: String,
    /// Bytes buffered from the source before the failure (0 if buffering failed).
    pub source_len: u64,
    /// Bytes the converter had written to the target when it failed.
    pub bytes_written: u64,
    /// `None` for failures outside the converter (I/O, limits).
    pub stage: Option<Stage>,
    pub message: String,
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} via '{}' failed",
            self.pair, self.converter
        )?;
        if let Some(stage) = self.stage {
            write!(f, " at {stage} stage")?;
        }
        write!(
            f,
            " (source {} bytes, written {} bytes): {}",
            self.source_len, self.bytes_written, self.message
        )
    }
}

/// Called by the pipeline as it resolves converters and runs conversions.
///
/// Implementations must be `Send + Sync`: conversions for the same or
/// different pairs run concurrently. All methods have default no-op
/// implementations so callers only override what they care about.
pub trait ConversionObserver: Send + Sync {
    /// A pair was requested that no descriptor covers.
    fn on_lookup_miss(&self, pair: &FormatPair) {
        let _ = pair;
    }

    /// A factory ran and produced a converter.
    fn on_converter_constructed(&self, pair: &FormatPair, converter: &str) {
        let _ = (pair, converter);
    }

    /// A factory failed, or a cached failure was returned. The cached case
    /// arrives as [`ConstructionError::Poisoned`].
    fn on_construction_failed(&self, error: &ConstructionError) {
        let _ = error;
    }

    /// The source was buffered and the converter is about to run.
    fn on_conversion_start(&self, pair: &FormatPair, converter: &str, source_len: u64) {
        let _ = (pair, converter, source_len);
    }

    /// The converter finished and the target was flushed.
    fn on_conversion_complete(&self, outcome: &ConversionOutcome) {
        let _ = outcome;
    }

    /// A conversion failed after a converter was selected.
    fn on_conversion_failed(&self, report: &FailureReport) {
        let _ = report;
    }
}

/// A no-op implementation; the default when no observer is configured.
pub struct NoopObserver;

impl ConversionObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type SharedObserver = Arc<dyn ConversionObserver>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FormatTag;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn pair() -> FormatPair {
        FormatPair::new(
            FormatTag::parse("png").unwrap(),
            FormatTag::parse("jpg").unwrap(),
        )
    }

    #[derive(Default)]
    struct Recorder {
        misses: AtomicUsize,
        failures: Mutex<Vec<String>>,
    }

    impl ConversionObserver for Recorder {
        fn on_lookup_miss(&self, _pair: &FormatPair) {
            self.misses.fetch_add(1, Ordering::SeqCst);
        }

        fn on_conversion_failed(&self, report: &FailureReport) {
            self.failures.lock().unwrap().push(report.to_string());
        }
    }

    #[test]
    fn noop_observer_does_not_panic() {
        let o = NoopObserver;
        o.on_lookup_miss(&pair());
        o.on_converter_constructed(&pair(), "PngToJpg");
        o.on_conversion_start(&pair(), "PngToJpg", 10);
    }

    #[test]
    fn recorder_receives_events_through_arc_dyn() {
        let recorder = Arc::new(Recorder::default());
        let shared: SharedObserver = recorder.clone();

        shared.on_lookup_miss(&pair());
        shared.on_conversion_failed(&FailureReport {
            pair: pair(),
            converter: "PngToJpg".into(),
            source_len: 120,
            bytes_written: 0,
            stage: Some(Stage::Read),
            message: "not a PNG".into(),
        });

        assert_eq!(recorder.misses.load(Ordering::SeqCst), 1);
        let failures = recorder.failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("png → jpg"));
        assert!(failures[0].contains("read stage"));
        assert!(failures[0].contains("not a PNG"));
    }

    #[test]
    fn report_without_stage() {
        let r = FailureReport {
            pair: pair(),
            converter: "PngToJpg".into(),
            source_len: 0,
            bytes_written: 0,
            stage: None,
            message: "disk full".into(),
        };
        let s = r.to_string();
        assert!(!s.contains("stage"));
        assert!(s.ends_with("disk full"));
    }
}
