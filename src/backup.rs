// src/backup.rs
use anyhow::{Context, Result as AnyResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::archive::ArchiveFormat;
use crate::clock::OperationClock;
use crate::config::Config;
use crate::error::{BackupError, Result};
use crate::metadata::{BackupRecord, OperationKind};
use crate::space::{
    self, SpaceChecker, SpaceEstimate, ThresholdPolicy, ThresholdVerdict,
};

/// Classification of a backup source, decided once per operation and
/// dispatched on afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    File,
    Directory,
}

impl SourceKind {
    fn of(source: &Path) -> Self {
        if source.is_dir() {
            SourceKind::Directory
        } else {
            SourceKind::File
        }
    }
}

/// Outcome of a completed backup operation.
#[derive(Debug, Clone)]
pub struct BackupOutcome {
    pub backup_path: PathBuf,
    pub meta_path: PathBuf,
    pub operation: OperationKind,
    /// Raw source size, before the safety buffer.
    pub size_bytes: u64,
    pub duration_secs: f64,
}

/// Space report for the info-only mode: no transfer is performed.
#[derive(Debug, Clone, Copy)]
pub struct SpaceReport {
    pub raw_bytes: u64,
    pub buffer: f64,
    pub required_bytes: u64,
    pub free_bytes: u64,
    pub total_bytes: u64,
    pub sufficient: bool,
}

/// Callback consulted by the strict threshold policy when free space is
/// below the warning line. Returning false aborts the operation.
pub type ConfirmFn = Box<dyn Fn(&SpaceEstimate, f64) -> bool>;

pub struct BackupEngine {
    config: Arc<Config>,
    checker: SpaceChecker,
    strict_space: bool,
    confirm: Option<ConfirmFn>,
}

impl BackupEngine {
    pub fn new(config: Config) -> Self {
        let strict_space = config.space.strict;
        Self {
            config: Arc::new(config),
            checker: SpaceChecker::new(),
            strict_space,
            confirm: None,
        }
    }

    /// Replaces the live disk probe, for tests.
    pub fn with_checker(mut self, checker: SpaceChecker) -> Self {
        self.checker = checker;
        self
    }

    /// Enables/disables the percentage-threshold admission policy.
    pub fn with_strict_space(mut self, strict: bool) -> Self {
        self.strict_space = strict;
        self
    }

    /// Installs the low-space confirmation callback. Without one, a
    /// below-warning condition is refused rather than silently admitted.
    pub fn with_confirm(mut self, confirm: ConfirmFn) -> Self {
        self.confirm = Some(confirm);
        self
    }

    /// Creates an uncompressed timestamped copy of `source` under
    /// `destination_dir`.
    pub fn create_backup(&self, source: &Path, destination_dir: &Path) -> Result<BackupOutcome> {
        if !source.exists() {
            return Err(BackupError::SourceNotFound(source.to_path_buf()));
        }
        let kind = SourceKind::of(source);

        let clock = OperationClock::start();
        let backup_path = derive_backup_path(source, destination_dir, &clock, None)?;

        self.prepare_destination(destination_dir)?;
        let (raw, _estimate) =
            self.admit(source, destination_dir, self.config.space.copy_buffer)?;

        let operation = match kind {
            SourceKind::Directory => {
                copy_tree(source, &backup_path).map_err(BackupError::TransferFailed)?;
                OperationKind::Directory
            }
            SourceKind::File => {
                copy_file(source, &backup_path).map_err(BackupError::TransferFailed)?;
                OperationKind::File
            }
        };

        let record = BackupRecord::new(&clock, source, &backup_path, operation, None);
        let meta_path = record.write().map_err(BackupError::MetadataFailed)?;

        debug!(backup = %backup_path.display(), "backup complete");

        Ok(BackupOutcome {
            backup_path,
            meta_path,
            operation,
            size_bytes: raw,
            duration_secs: clock.elapsed_secs(),
        })
    }

    /// Creates a single compressed archive of `source` under
    /// `destination_dir`. The archive is rooted so that extracting it
    /// reproduces the source's base name as the top-level entry.
    pub fn compress_backup(
        &self,
        source: &Path,
        destination_dir: &Path,
        format: ArchiveFormat,
    ) -> Result<BackupOutcome> {
        if !source.exists() {
            return Err(BackupError::SourceNotFound(source.to_path_buf()));
        }

        let clock = OperationClock::start();
        let backup_path = derive_backup_path(source, destination_dir, &clock, Some(format))?;

        self.prepare_destination(destination_dir)?;
        let (raw, _estimate) =
            self.admit(source, destination_dir, self.config.space.archive_buffer)?;

        crate::archive::pack(source, format, &backup_path)
            .map_err(BackupError::TransferFailed)?;

        let record = BackupRecord::new(
            &clock,
            source,
            &backup_path,
            OperationKind::Archive,
            Some(format),
        );
        let meta_path = record.write().map_err(BackupError::MetadataFailed)?;

        debug!(backup = %backup_path.display(), %format, "compressed backup complete");

        Ok(BackupOutcome {
            backup_path,
            meta_path,
            operation: OperationKind::Archive,
            size_bytes: raw,
            duration_secs: clock.elapsed_secs(),
        })
    }

    /// Computes the space report for a prospective backup without moving a
    /// byte.
    pub fn backup_info(
        &self,
        source: &Path,
        destination_dir: &Path,
        format: Option<ArchiveFormat>,
    ) -> Result<SpaceReport> {
        if !source.exists() {
            return Err(BackupError::SourceNotFound(source.to_path_buf()));
        }

        let buffer = if format.is_some() {
            self.config.space.archive_buffer
        } else {
            self.config.space.copy_buffer
        };

        let raw = self
            .checker
            .estimate_required(source)
            .map_err(BackupError::SpaceCheckFailed)?;
        let required = space::buffered(raw, buffer);

        let disk = self
            .checker
            .disk_space(destination_dir)
            .map_err(BackupError::SpaceCheckFailed)?;
        let estimate = SpaceEstimate::from_disk(required, &disk);

        Ok(SpaceReport {
            raw_bytes: raw,
            buffer,
            required_bytes: required,
            free_bytes: disk.free,
            total_bytes: disk.total,
            sufficient: estimate.sufficient,
        })
    }

    fn prepare_destination(&self, destination_dir: &Path) -> Result<()> {
        fs::create_dir_all(destination_dir)
            .with_context(|| {
                format!("failed to create destination: {}", destination_dir.display())
            })
            .map_err(BackupError::SpaceCheckFailed)
    }

    /// Admission control: runs before any byte is copied. Refusing up front
    /// beats leaving a truncated artifact after running out of space
    /// mid-copy.
    fn admit(
        &self,
        source: &Path,
        destination_dir: &Path,
        buffer: f64,
    ) -> Result<(u64, SpaceEstimate)> {
        let raw = self
            .checker
            .estimate_required(source)
            .map_err(BackupError::SpaceCheckFailed)?;
        let required = space::buffered(raw, buffer);

        let disk = self
            .checker
            .disk_space(destination_dir)
            .map_err(BackupError::SpaceCheckFailed)?;
        let estimate = SpaceEstimate::from_disk(required, &disk);

        debug!(
            raw,
            required,
            free = disk.free,
            sufficient = estimate.sufficient,
            "admission check"
        );

        if self.strict_space {
            let policy = ThresholdPolicy {
                warning_percent: self.config.space.warning_percent,
                critical_percent: self.config.space.critical_percent,
            };

            match policy.evaluate(&estimate, &disk) {
                ThresholdVerdict::Critical => {
                    warn!(
                        free_percent = disk.free_percent(),
                        "free space below critical threshold"
                    );
                    return Err(BackupError::InsufficientSpace {
                        required,
                        free: disk.free,
                    });
                }
                ThresholdVerdict::NeedsConfirmation => {
                    let proceed = match &self.confirm {
                        Some(confirm) => confirm(&estimate, disk.free_percent()),
                        None => false,
                    };
                    if !proceed {
                        return Err(BackupError::Cancelled);
                    }
                }
                ThresholdVerdict::Proceed => {}
            }
        } else if !estimate.sufficient {
            return Err(BackupError::InsufficientSpace {
                required,
                free: disk.free,
            });
        }

        Ok((raw, estimate))
    }
}

/// Derives the timestamped backup path:
/// `<destination>/<basename(source)>_<compact_timestamp>[.<ext>]`.
pub fn derive_backup_path(
    source: &Path,
    destination_dir: &Path,
    clock: &OperationClock,
    format: Option<ArchiveFormat>,
) -> Result<PathBuf> {
    let base = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| BackupError::InvalidSource(source.to_path_buf()))?;

    let mut name = format!("{}_{}", base, clock.compact_timestamp());
    if let Some(format) = format {
        name.push('.');
        name.push_str(format.extension());
    }

    Ok(destination_dir.join(name))
}

/// Copies a single file, creating the parent directory if needed.
/// Permissions travel with the copy where the platform allows.
pub fn copy_file(source: &Path, dest: &Path) -> AnyResult<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }

    fs::copy(source, dest).with_context(|| {
        format!(
            "failed to copy {} to {}",
            source.display(),
            dest.display()
        )
    })?;

    Ok(())
}

/// Recursively copies a directory tree, preserving structure. Symlinks are
/// not followed and not specially handled. On failure, content already
/// written at the destination is left as-is.
pub fn copy_tree(source: &Path, dest: &Path) -> AnyResult<()> {
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.with_context(|| format!("failed to walk {}", source.display()))?;
        let rel = entry
            .path()
            .strip_prefix(source)
            .context("walked entry outside source root")?;
        let target = dest.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("failed to create directory: {}", target.display()))?;
        } else if entry.file_type().is_file() {
            copy_file(entry.path(), &target)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::{DiskSpace, SpaceProbe};
    use std::fs;
    use tempfile::tempdir;

    struct FixedProbe {
        free: u64,
        total: u64,
    }

    impl SpaceProbe for FixedProbe {
        fn query(&self, _path: &Path) -> AnyResult<DiskSpace> {
            Ok(DiskSpace {
                free: self.free,
                total: self.total,
            })
        }
    }

    fn roomy_engine() -> BackupEngine {
        BackupEngine::new(Config::default()).with_checker(SpaceChecker::with_probe(Box::new(
            FixedProbe {
                free: 1 << 40,
                total: 1 << 41,
            },
        )))
    }

    #[test]
    fn test_create_backup_file_is_byte_identical() {
        let temp_dir = tempdir().unwrap();
        let source = temp_dir.path().join("a.txt");
        fs::write(&source, "important bytes").unwrap();
        let dest = temp_dir.path().join("backups");

        let outcome = roomy_engine().create_backup(&source, &dest).unwrap();

        assert_eq!(outcome.operation, OperationKind::File);
        assert_eq!(
            fs::read(&outcome.backup_path).unwrap(),
            fs::read(&source).unwrap()
        );

        let name = outcome.backup_path.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("a.txt_"), "unexpected name: {name}");

        let record = BackupRecord::load(&outcome.meta_path).unwrap();
        assert_eq!(record.operation, OperationKind::File);
        assert!(record.compression.is_none());
    }

    #[test]
    fn test_create_backup_directory_preserves_structure() {
        let temp_dir = tempdir().unwrap();
        let source = temp_dir.path().join("project");
        fs::create_dir(&source).unwrap();
        fs::write(source.join("a.txt"), "one").unwrap();
        fs::create_dir(source.join("nested")).unwrap();
        fs::write(source.join("nested/b.txt"), "two").unwrap();
        let dest = temp_dir.path().join("backups");

        let outcome = roomy_engine().create_backup(&source, &dest).unwrap();

        assert_eq!(outcome.operation, OperationKind::Directory);
        assert_eq!(
            fs::read_to_string(outcome.backup_path.join("a.txt")).unwrap(),
            "one"
        );
        assert_eq!(
            fs::read_to_string(outcome.backup_path.join("nested/b.txt")).unwrap(),
            "two"
        );

        let record = BackupRecord::load(&outcome.meta_path).unwrap();
        assert_eq!(record.operation, OperationKind::Directory);
    }

    #[test]
    fn test_missing_source_is_reported_not_fatal() {
        let temp_dir = tempdir().unwrap();
        let err = roomy_engine()
            .create_backup(
                &temp_dir.path().join("does-not-exist"),
                &temp_dir.path().join("backups"),
            )
            .unwrap_err();

        assert!(matches!(err, BackupError::SourceNotFound(_)));
    }

    #[test]
    fn test_insufficient_space_leaves_no_artifacts() {
        let temp_dir = tempdir().unwrap();
        let source = temp_dir.path().join("big.bin");
        fs::write(&source, vec![0u8; 4096]).unwrap();
        let dest = temp_dir.path().join("backups");

        let engine = BackupEngine::new(Config::default()).with_checker(
            SpaceChecker::with_probe(Box::new(FixedProbe {
                free: 100,
                total: 1 << 30,
            })),
        );

        let err = engine.create_backup(&source, &dest).unwrap_err();
        assert!(matches!(err, BackupError::InsufficientSpace { .. }));

        // No backup path and no .meta sidecar were created
        let leftovers: Vec<_> = fs::read_dir(&dest).unwrap().collect();
        assert!(leftovers.is_empty(), "leftovers: {leftovers:?}");
    }

    #[test]
    fn test_compress_backup_records_format() {
        let temp_dir = tempdir().unwrap();
        let source = temp_dir.path().join("project");
        fs::create_dir(&source).unwrap();
        fs::write(source.join("a.txt"), "content").unwrap();
        let dest = temp_dir.path().join("backups");

        let outcome = roomy_engine()
            .compress_backup(&source, &dest, ArchiveFormat::GzTar)
            .unwrap();

        assert_eq!(outcome.operation, OperationKind::Archive);
        let name = outcome.backup_path.file_name().unwrap().to_string_lossy();
        assert!(name.ends_with(".tar.gz"), "unexpected name: {name}");

        let record = BackupRecord::load(&outcome.meta_path).unwrap();
        assert_eq!(record.operation, OperationKind::Archive);
        assert_eq!(record.compression.as_deref(), Some("gztar"));
    }

    #[test]
    fn test_strict_critical_space_refuses_outright() {
        let temp_dir = tempdir().unwrap();
        let source = temp_dir.path().join("a.txt");
        fs::write(&source, "x").unwrap();
        let dest = temp_dir.path().join("backups");

        // 0.5% free: below the 10% critical line
        let engine = BackupEngine::new(Config::default())
            .with_checker(SpaceChecker::with_probe(Box::new(FixedProbe {
                free: 5,
                total: 1000,
            })))
            .with_strict_space(true)
            .with_confirm(Box::new(|_, _| true));

        let err = engine.create_backup(&source, &dest).unwrap_err();
        assert!(matches!(err, BackupError::InsufficientSpace { .. }));
    }

    #[test]
    fn test_strict_warning_without_confirmation_cancels() {
        let temp_dir = tempdir().unwrap();
        let source = temp_dir.path().join("a.txt");
        fs::write(&source, "x").unwrap();
        let dest = temp_dir.path().join("backups");

        // 15% free: below warning, above critical; no callback installed
        let engine = BackupEngine::new(Config::default())
            .with_checker(SpaceChecker::with_probe(Box::new(FixedProbe {
                free: 150,
                total: 1000,
            })))
            .with_strict_space(true);

        let err = engine.create_backup(&source, &dest).unwrap_err();
        assert!(matches!(err, BackupError::Cancelled));
    }

    #[test]
    fn test_strict_warning_confirmed_proceeds() {
        let temp_dir = tempdir().unwrap();
        let source = temp_dir.path().join("a.txt");
        fs::write(&source, "x").unwrap();
        let dest = temp_dir.path().join("backups");

        let engine = BackupEngine::new(Config::default())
            .with_checker(SpaceChecker::with_probe(Box::new(FixedProbe {
                free: 150,
                total: 1000,
            })))
            .with_strict_space(true)
            .with_confirm(Box::new(|_, _| true));

        let outcome = engine.create_backup(&source, &dest).unwrap();
        assert!(outcome.backup_path.exists());
    }

    #[test]
    fn test_backup_info_transfers_nothing() {
        let temp_dir = tempdir().unwrap();
        let source = temp_dir.path().join("a.txt");
        fs::write(&source, vec![0u8; 100]).unwrap();
        let dest = temp_dir.path().join("backups");
        fs::create_dir(&dest).unwrap();

        let report = roomy_engine()
            .backup_info(&source, &dest, None)
            .unwrap();

        assert_eq!(report.raw_bytes, 100);
        assert_eq!(report.buffer, 1.2);
        assert_eq!(report.required_bytes, 120);
        assert!(report.sufficient);

        // Only the destination directory itself exists, nothing inside
        let entries: Vec<_> = fs::read_dir(&dest).unwrap().collect();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_derive_backup_path_shape() {
        let clock = OperationClock::start();
        let path = derive_backup_path(
            Path::new("/data/project"),
            Path::new("/backups"),
            &clock,
            None,
        )
        .unwrap();

        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(
            name,
            format!("project_{}", clock.compact_timestamp())
        );
        assert_eq!(path.parent().unwrap(), Path::new("/backups"));

        let zipped = derive_backup_path(
            Path::new("/data/project"),
            Path::new("/backups"),
            &clock,
            Some(ArchiveFormat::Zip),
        )
        .unwrap();
        assert!(zipped.to_string_lossy().ends_with(".zip"));
    }
}
