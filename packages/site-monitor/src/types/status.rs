//! Monitoring sweep reports and scheduler status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregate result of one monitoring sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Jobs matching the eligibility predicate
    pub eligible: usize,
    /// Completed with a new fingerprint
    pub changed: usize,
    /// Completed with the stored fingerprint
    pub unchanged: usize,
    /// Ended in `error`
    pub failed: usize,
    /// Already had an attempt in flight
    pub skipped: usize,
    /// Abandoned `in_progress` or queued `pending` jobs restarted before the
    /// re-crawls began
    #[serde(default)]
    pub recovered: usize,
}

/// Result of requesting a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SweepOutcome {
    Completed(SweepReport),
    /// Another sweep is running; nothing was started
    AlreadyRunning,
}

/// Snapshot exposed by `MonitoringScheduler::status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringStatus {
    pub last_sweep_started: Option<DateTime<Utc>>,
    /// Completion time of the last sweep (the "last sweep time")
    pub last_sweep_time: Option<DateTime<Utc>>,
    pub last_report: Option<SweepReport>,
    /// Jobs a sweep started now would re-crawl
    pub jobs_eligible: usize,
    pub sweep_in_progress: bool,
    pub interval_secs: u64,
}
