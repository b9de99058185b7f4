//! Scoped temporary files for converters and atomic output.
//!
//! Every staged file is a [`tempfile::NamedTempFile`] with a random name, so
//! concurrent calls never share one, and it is removed when the handle drops,
//! whether the call succeeded, failed or was cancelled mid-way.

use crate::error::{ResourceError, ResourceOp};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Where staging files are created.
#[derive(Debug, Clone, Default)]
pub struct StagingArea {
    dir: Option<PathBuf>,
}

impl StagingArea {
    /// `None` uses the system temp directory.
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Create a staging file named `<label>-XXXXXX<suffix>`.
    pub fn stage(&self, label: &str, suffix: &str) -> Result<StagedFile, ResourceError> {
        let prefix = format!("{}-", sanitise_label(label));
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix).suffix(suffix);

        let file = match &self.dir {
            Some(dir) => builder
                .tempfile_in(dir)
                .map_err(|e| ResourceError::at(ResourceOp::Stage, dir, e))?,
            None => builder
                .tempfile()
                .map_err(|e| ResourceError::at(ResourceOp::Stage, std::env::temp_dir(), e))?,
        };
        debug!("Staged {}", file.path().display());
        Ok(StagedFile { file })
    }

    /// Create a hidden staging file in the same directory as `target`, so a
    /// later [`StagedFile::persist`] is a same-filesystem rename.
    pub fn stage_beside(target: &Path) -> Result<StagedFile, ResourceError> {
        let dir = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());

        let file = tempfile::Builder::new()
            .prefix(&format!(".{}.", sanitise_label(&name)))
            .suffix(".partial")
            .tempfile_in(&dir)
            .map_err(|e| ResourceError::at(ResourceOp::CreateTarget, target, e))?;
        debug!("Staging output for {} at {}", target.display(), file.path().display());
        Ok(StagedFile { file })
    }
}

/// Keep names portable: anything but `[A-Za-z0-9._-]` becomes `_`.
fn sanitise_label(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "stage".to_string()
    } else {
        cleaned
    }
}

/// A temporary file owned by one call. Deleted on drop unless persisted.
#[derive(Debug)]
pub struct StagedFile {
    file: NamedTempFile,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// An async handle to the staged file (shares the file cursor).
    pub fn async_handle(&self) -> Result<tokio::fs::File, ResourceError> {
        let std_file = self
            .file
            .as_file()
            .try_clone()
            .map_err(|e| ResourceError::at(ResourceOp::Stage, self.path(), e))?;
        Ok(tokio::fs::File::from_std(std_file))
    }

    /// Atomically move the staged file to `target`, replacing it.
    pub fn persist(self, target: &Path) -> Result<(), ResourceError> {
        self.file
            .persist(target)
            .map(|_| ())
            .map_err(|e| ResourceError::at(ResourceOp::Persist, target, e.error))
    }
}
