// src/restore.rs
use anyhow::{Context, Result as AnyResult};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::archive::{self, ArchiveFormat};
use crate::backup::{copy_file, copy_tree};
use crate::clock::OperationClock;
use crate::error::{BackupError, Result};

/// Outcome of a completed restore operation.
#[derive(Debug, Clone)]
pub struct RestoreOutcome {
    pub restored_path: PathBuf,
    /// Format that was auto-detected and extracted, if the backup was an
    /// archive.
    pub extracted: Option<ArchiveFormat>,
    pub duration_secs: f64,
}

pub struct RestoreEngine;

impl Default for RestoreEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RestoreEngine {
    pub fn new() -> Self {
        Self
    }

    /// Restores `backup` to `target`.
    ///
    /// Archives (detected by file-name suffix) are extracted into `target`
    /// as a directory. Plain copies replace `target` atomically: the content
    /// is staged at `<target>.temp` first, and the final rename is the only
    /// step that touches the existing target. A failure before the rename
    /// leaves the previous target untouched.
    pub fn restore(&self, backup: &Path, target: &Path) -> Result<RestoreOutcome> {
        if !backup.exists() {
            return Err(BackupError::BackupNotFound(backup.to_path_buf()));
        }

        let clock = OperationClock::start();

        if let Some(format) = archive::detect_format(backup) {
            debug!(backup = %backup.display(), %format, "extracting archive");
            archive::unpack(backup, format, target).map_err(BackupError::ExtractionFailed)?;

            return Ok(RestoreOutcome {
                restored_path: target.to_path_buf(),
                extracted: Some(format),
                duration_secs: clock.elapsed_secs(),
            });
        }

        debug!(backup = %backup.display(), target = %target.display(), "restoring copy");
        self.replace_via_temp(backup, target)
            .map_err(BackupError::RestoreFailed)?;

        Ok(RestoreOutcome {
            restored_path: target.to_path_buf(),
            extracted: None,
            duration_secs: clock.elapsed_secs(),
        })
    }

    fn replace_via_temp(&self, backup: &Path, target: &Path) -> AnyResult<()> {
        let temp = temp_path(target);

        // A stale staging area from an interrupted earlier restore is
        // discarded, never reused
        if temp.exists() {
            warn!(temp = %temp.display(), "removing stale staging path");
            remove_any(&temp)?;
        }

        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create target parent: {}", parent.display())
                })?;
            }
        }

        if backup.is_dir() {
            copy_tree(backup, &temp)?;
        } else {
            copy_file(backup, &temp)?;
        }

        // Point of no return: the old target goes away only after the full
        // staged copy exists
        if target.exists() {
            remove_any(target)?;
        }

        fs::rename(&temp, target).with_context(|| {
            format!(
                "failed to move staged restore {} to {}",
                temp.display(),
                target.display()
            )
        })?;

        Ok(())
    }
}

/// Staging path for an in-flight restore: `<target>.temp`.
pub fn temp_path(target: &Path) -> PathBuf {
    let mut os = target.as_os_str().to_os_string();
    os.push(".temp");
    PathBuf::from(os)
}

fn remove_any(path: &Path) -> AnyResult<()> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.with_context(|| format!("failed to remove {}", path.display()))
}
