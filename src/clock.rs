// src/clock.rs
use chrono::{DateTime, Duration, Utc};

/// Immutable capture of the start instant of a single operation.
///
/// Created once per backup/restore and threaded through the engine calls;
/// nothing reads the wall clock mid-operation.
#[derive(Debug, Clone, Copy)]
pub struct OperationClock {
    start: DateTime<Utc>,
}

impl OperationClock {
    pub fn start() -> Self {
        Self { start: Utc::now() }
    }

    /// Compact sortable timestamp for backup names, e.g. `20260830_142501`.
    /// Unique per source at second granularity; same-second collisions are
    /// an accepted limitation.
    pub fn compact_timestamp(&self) -> String {
        self.start.format("%Y%m%d_%H%M%S").to_string()
    }

    /// Full ISO-8601 timestamp for metadata records.
    pub fn iso_timestamp(&self) -> String {
        self.start.to_rfc3339()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn elapsed(&self) -> Duration {
        Utc::now().signed_duration_since(self.start)
    }

    /// Elapsed seconds as a float, for duration reporting.
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed().num_milliseconds() as f64 / 1000.0
    }
}
