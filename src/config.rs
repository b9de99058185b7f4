//! Configuration for the conversion pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! [`PipelineConfigBuilder`]. The registry contents are *not* configuration:
//! they come from the host's explicit descriptor list.

use crate::error::ConvertError;
use crate::observer::SharedObserver;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Configuration for a [`crate::ConversionPipeline`].
///
/// # Example
/// ```rust
/// use fileconvert::{FailurePolicy, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .failure_policy(FailurePolicy::Sticky)
///     .max_source_bytes(64 * 1024 * 1024)
///     .atomic_writes(true)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// What the converter cache does after a factory fails. Default: [`FailurePolicy::Retry`].
    pub failure_policy: FailurePolicy,

    /// What [`crate::RegistryBuilder`] does when a pair is registered twice.
    /// Default: [`DuplicatePolicy::Replace`].
    pub duplicate_policy: DuplicatePolicy,

    /// Upper bound on buffered source bytes. Default: `None` (unbounded).
    ///
    /// Every source is drained into memory before the converter sees it, so
    /// hosts that accept clipboard or network streams should set this.
    pub max_source_bytes: Option<u64>,

    /// Initial capacity of the source buffer in bytes. Default: 64 KiB.
    pub initial_buffer_capacity: usize,

    /// Stage file output next to the target and rename on success. Default: false.
    ///
    /// When off, `convert_file` truncates the target up front and a converter
    /// that fails mid-write leaves it partially written (the error is still
    /// returned). When on, the target is either the complete output or
    /// untouched.
    pub atomic_writes: bool,

    /// Directory for converter staging files. Default: `None` (system temp dir).
    pub staging_dir: Option<PathBuf>,

    /// Maximum concurrent jobs in [`crate::stream::convert_many`]. Default: 4.
    pub concurrency: usize,

    /// Diagnostic sink notified of constructions, conversions and failures.
    pub observer: Option<SharedObserver>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            duplicate_policy: DuplicatePolicy::default(),
            max_source_bytes: None,
            initial_buffer_capacity: 64 * 1024,
            atomic_writes: false,
            staging_dir: None,
            concurrency: 4,
            observer: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("failure_policy", &self.failure_policy)
            .field("duplicate_policy", &self.duplicate_policy)
            .field("max_source_bytes", &self.max_source_bytes)
            .field("initial_buffer_capacity", &self.initial_buffer_capacity)
            .field("atomic_writes", &self.atomic_writes)
            .field("staging_dir", &self.staging_dir)
            .field("concurrency", &self.concurrency)
            .field(
                "observer",
                &self.observer.as_ref().map(|_| "<dyn ConversionObserver>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    pub fn duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.config.duplicate_policy = policy;
        self
    }

    pub fn max_source_bytes(mut self, limit: u64) -> Self {
        self.config.max_source_bytes = Some(limit);
        self
    }

    pub fn initial_buffer_capacity(mut self, bytes: usize) -> Self {
        self.config.initial_buffer_capacity = bytes.min(16 * 1024 * 1024);
        self
    }

    pub fn atomic_writes(mut self, v: bool) -> Self {
        self.config.atomic_writes = v;
        self
    }

    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.staging_dir = Some(dir.into());
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn observer(mut self, observer: SharedObserver) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, ConvertError> {
        let c = &self.config;
        if c.max_source_bytes == Some(0) {
            return Err(ConvertError::InvalidConfig(
                "max_source_bytes must be ≥ 1 (omit it for no limit)".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(ConvertError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if let Some(dir) = &c.staging_dir {
            if !dir.is_dir() {
                return Err(ConvertError::InvalidConfig(format!(
                    "staging_dir '{}' is not a directory",
                    dir.display()
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Policies ─────────────────────────────────────────────────────────────

/// How the converter cache treats a failed construction.
///
/// | Policy | Next call after a failure |
/// |--------|---------------------------|
/// | `Retry` | runs the factory again |
/// | `Sticky` | gets [`crate::ConstructionError::Poisoned`] until `reset` |
///
/// In both cases every caller that was already waiting on the failed
/// construction receives that same failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    #[default]
    Retry,
    Sticky,
}

/// What registering an already-registered pair does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// The later descriptor replaces the earlier one (logged at WARN).
    #[default]
    Replace,
    /// The later descriptor is rejected with `RegistrationError::Duplicate`.
    Reject,
}
