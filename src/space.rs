// src/space.rs
use anyhow::{Context, Result};
use nix::sys::statvfs::statvfs;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Default safety buffer for plain copies.
pub const DEFAULT_COPY_BUFFER: f64 = 1.2;
/// Default safety buffer for compressed archives (staging overhead).
pub const DEFAULT_ARCHIVE_BUFFER: f64 = 1.5;

/// Free/total bytes of the filesystem containing a path.
#[derive(Debug, Clone, Copy)]
pub struct DiskSpace {
    pub free: u64,
    pub total: u64,
}

impl DiskSpace {
    pub fn free_percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        100.0 * self.free as f64 / self.total as f64
    }
}

/// One admission-control decision. Computed fresh per operation from a live
/// filesystem query; free space can change between checks, so this is never
/// cached.
#[derive(Debug, Clone, Copy)]
pub struct SpaceEstimate {
    pub required_bytes: u64,
    pub free_bytes: u64,
    pub sufficient: bool,
}

impl SpaceEstimate {
    pub fn from_disk(required_bytes: u64, disk: &DiskSpace) -> Self {
        Self {
            required_bytes,
            free_bytes: disk.free,
            sufficient: disk.free > required_bytes,
        }
    }
}

/// Source of filesystem free-space numbers. Swapped for a fixed probe in
/// tests so admission refusal can be exercised without filling a disk.
pub trait SpaceProbe {
    fn query(&self, path: &Path) -> Result<DiskSpace>;
}

/// Live probe backed by statvfs(2) on the destination's filesystem.
pub struct DiskProbe;

impl SpaceProbe for DiskProbe {
    fn query(&self, path: &Path) -> Result<DiskSpace> {
        let abs = fs::canonicalize(path)
            .with_context(|| format!("destination not usable: {}", path.display()))?;

        let stat = statvfs(&abs)
            .with_context(|| format!("statvfs failed for {}", abs.display()))?;

        let frag = stat.fragment_size() as u64;
        Ok(DiskSpace {
            // blocks available to unprivileged users, matching what a copy
            // can actually consume
            free: stat.blocks_available() as u64 * frag,
            total: stat.blocks() as u64 * frag,
        })
    }
}

/// Pre-flight disk-space admission control.
pub struct SpaceChecker {
    probe: Box<dyn SpaceProbe>,
}

impl Default for SpaceChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl SpaceChecker {
    pub fn new() -> Self {
        Self {
            probe: Box::new(DiskProbe),
        }
    }

    pub fn with_probe(probe: Box<dyn SpaceProbe>) -> Self {
        Self { probe }
    }

    /// Raw bytes a backup of `source` needs: the file size, or the recursive
    /// sum of file sizes for a directory. A traversal failure aborts the
    /// estimate; it is never silently treated as zero.
    pub fn estimate_required(&self, source: &Path) -> Result<u64> {
        let meta = fs::metadata(source)
            .with_context(|| format!("failed to stat {}", source.display()))?;

        if meta.is_file() {
            return Ok(meta.len());
        }

        let mut total = 0u64;
        for entry in WalkDir::new(source).follow_links(false) {
            let entry =
                entry.with_context(|| format!("failed to walk {}", source.display()))?;
            if entry.file_type().is_file() {
                let size = entry
                    .metadata()
                    .with_context(|| format!("failed to stat {}", entry.path().display()))?
                    .len();
                total += size;
            }
        }
        Ok(total)
    }

    /// Queries free space at the destination's filesystem and compares it
    /// against `required_bytes`. Fails closed: an unusable destination is an
    /// error, not an optimistic pass.
    pub fn check(&self, destination_dir: &Path, required_bytes: u64) -> Result<SpaceEstimate> {
        let disk = self.probe.query(destination_dir)?;
        Ok(SpaceEstimate::from_disk(required_bytes, &disk))
    }

    pub fn disk_space(&self, destination_dir: &Path) -> Result<DiskSpace> {
        self.probe.query(destination_dir)
    }
}

/// Applies a multiplicative safety buffer to a raw estimate.
pub fn buffered(raw_bytes: u64, buffer: f64) -> u64 {
    (raw_bytes as f64 * buffer).ceil() as u64
}

/// Stricter percentage-threshold admission policy, layered over the same
/// estimate as the plain buffered check.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdPolicy {
    /// Below this free-space percentage the operation needs confirmation.
    pub warning_percent: f64,
    /// Below this free-space percentage the operation is refused outright.
    pub critical_percent: f64,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            warning_percent: 20.0,
            critical_percent: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdVerdict {
    Proceed,
    NeedsConfirmation,
    Critical,
}

impl ThresholdPolicy {
    pub fn evaluate(&self, estimate: &SpaceEstimate, disk: &DiskSpace) -> ThresholdVerdict {
        let free_percent = disk.free_percent();

        if free_percent < self.critical_percent {
            return ThresholdVerdict::Critical;
        }
        if free_percent < self.warning_percent || !estimate.sufficient {
            return ThresholdVerdict::NeedsConfirmation;
        }
        ThresholdVerdict::Proceed
    }
}

/// Converts bytes to a human-readable size string.
pub fn bytes_to_human(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{:.2}{}", size, UNITS[unit_idx])
}
