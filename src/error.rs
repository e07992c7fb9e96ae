// src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Failure taxonomy for backup and restore operations.
///
/// Every failure is returned to the caller as a value; the engines never
/// retry and never terminate the process, so a batch driver can keep going
/// after one bad operation.
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("source path does not exist: {0}")]
    SourceNotFound(PathBuf),

    #[error("backup path does not exist: {0}")]
    BackupNotFound(PathBuf),

    #[error("source path has no base name: {0}")]
    InvalidSource(PathBuf),

    #[error("insufficient space: need {required} bytes (buffered), only {free} free")]
    InsufficientSpace { required: u64, free: u64 },

    #[error("operation cancelled at low-space confirmation")]
    Cancelled,

    #[error("space check failed: {0:#}")]
    SpaceCheckFailed(anyhow::Error),

    #[error("transfer failed: {0:#}")]
    TransferFailed(anyhow::Error),

    #[error("extraction failed: {0:#}")]
    ExtractionFailed(anyhow::Error),

    #[error("restore failed: {0:#}")]
    RestoreFailed(anyhow::Error),

    #[error("metadata write failed: {0:#}")]
    MetadataFailed(anyhow::Error),
}

pub type Result<T> = std::result::Result<T, BackupError>;
