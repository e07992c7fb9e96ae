// src/metadata.rs
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::archive::ArchiveFormat;
use crate::clock::OperationClock;

/// What a backup operation produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    File,
    Directory,
    Archive,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::File => write!(f, "file"),
            OperationKind::Directory => write!(f, "directory"),
            OperationKind::Archive => write!(f, "archive"),
        }
    }
}

/// Durable record of one completed backup operation, written as a JSON
/// sidecar next to the backup itself.
///
/// A record is only ever produced for a successful transfer; a failed
/// transfer leaves no `.meta` behind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Operation start, ISO-8601.
    pub timestamp: String,
    pub source_path: PathBuf,
    pub backup_path: PathBuf,
    pub operation: OperationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,
    pub duration_sec: f64,
}

impl BackupRecord {
    pub fn new(
        clock: &OperationClock,
        source: &Path,
        backup: &Path,
        operation: OperationKind,
        compression: Option<ArchiveFormat>,
    ) -> Self {
        Self {
            timestamp: clock.iso_timestamp(),
            source_path: absolute(source),
            backup_path: absolute(backup),
            operation,
            compression: compression.map(|f| f.to_string()),
            duration_sec: clock.elapsed_secs(),
        }
    }

    /// Sidecar path for a backup: `<backup_path>.meta`.
    pub fn sidecar_path(backup_path: &Path) -> PathBuf {
        let mut os = backup_path.as_os_str().to_os_string();
        os.push(".meta");
        PathBuf::from(os)
    }

    /// Persists the record, pretty-printed for human readability.
    pub fn write(&self) -> Result<PathBuf> {
        let path = Self::sidecar_path(&self.backup_path);

        let content =
            serde_json::to_string_pretty(self).context("failed to serialize backup record")?;

        fs::write(&path, content)
            .with_context(|| format!("failed to write metadata to {}", path.display()))?;

        Ok(path)
    }

    /// Reads a record back; the sidecar is parseable on its own, without the
    /// backup it describes.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read metadata from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse metadata from {}", path.display()))
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}
