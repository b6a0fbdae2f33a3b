//! Job records and the lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{MonitorError, Result};

/// Identifier of a monitored job (time-ordered UUID v7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle status of a job.
///
/// ```text
/// pending ──► in_progress ──► completed
///    ▲            │  ▲            │
///    │            ▼  └────────────┘  (monitoring re-crawl)
///    └─────────  error ─► in_progress (sweep retry)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }

    /// Whether the lifecycle allows moving from `self` to `to`.
    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, to),
            (Pending, InProgress)
                | (InProgress, Completed)
                | (InProgress, Error)
                // startup reconciliation of abandoned attempts
                | (InProgress, Pending)
                | (Completed, InProgress)
                | (Error, InProgress)
                // resubmission of a failed job
                | (Error, Pending)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "in_progress" => Ok(JobStatus::InProgress),
            "completed" => Ok(JobStatus::Completed),
            "error" => Ok(JobStatus::Error),
            other => Err(MonitorError::Persistence(format!(
                "unknown job status: {}",
                other
            ))),
        }
    }
}

/// One monitored URL and its derived artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,

    /// Normalized target URL (unique across jobs)
    pub url: String,

    pub status: JobStatus,

    /// Fingerprint of the content the current artifact was built from
    pub content_hash: Option<String>,

    /// Fingerprint before the most recent detected change
    pub previous_content_hash: Option<String>,

    /// Generated llms.txt artifact
    pub llm_text_content: Option<String>,

    pub progress_percentage: u8,
    pub progress_message: String,

    /// Human-readable failure detail while in `error`
    pub error_detail: Option<String>,

    pub monitoring_enabled: bool,

    /// Set when the last completed attempt replaced an older fingerprint
    pub content_changed: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_crawled: Option<DateTime<Utc>>,
    pub last_monitored: Option<DateTime<Utc>>,

    /// Start of the current (or last) crawl attempt
    pub crawl_started_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a pending job for an already-normalized URL.
    pub fn new(url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            url: url.into(),
            status: JobStatus::Pending,
            content_hash: None,
            previous_content_hash: None,
            llm_text_content: None,
            progress_percentage: 0,
            progress_message: "Queued".to_string(),
            error_detail: None,
            monitoring_enabled: true,
            content_changed: false,
            created_at: now,
            updated_at: now,
            last_crawled: None,
            last_monitored: None,
            crawl_started_at: None,
        }
    }

    /// Move to `to`, rejecting transitions outside the lifecycle table.
    pub fn transition(&mut self, to: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(MonitorError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Enter `in_progress` for a fresh attempt. Progress restarts at zero.
    pub fn begin_attempt(&mut self) -> Result<()> {
        self.transition(JobStatus::InProgress)?;
        self.progress_percentage = 0;
        self.progress_message = "Starting crawler".to_string();
        self.error_detail = None;
        self.crawl_started_at = Some(self.updated_at);
        Ok(())
    }

    /// Record a job-level failure. Content fields are left untouched.
    pub fn fail(&mut self, detail: impl Into<String>) -> Result<()> {
        self.transition(JobStatus::Error)?;
        let detail = detail.into();
        self.progress_message = format!("Failed: {}", detail);
        self.error_detail = Some(detail);
        Ok(())
    }

    /// Advance progress; never moves backwards within an attempt.
    pub fn advance_progress(&mut self, percentage: u8, message: impl Into<String>) {
        self.progress_percentage = self.progress_percentage.max(percentage.min(100));
        self.progress_message = message.into();
    }

    pub fn progress(&self) -> Progress {
        Progress {
            percentage: self.progress_percentage,
            message: self.progress_message.clone(),
            status: self.status,
        }
    }
}

/// Progress summary exposed while a job is running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub percentage: u8,
    pub message: String,
    pub status: JobStatus,
}

/// How a submission was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitDisposition {
    /// A new job was created and a crawl attempt scheduled
    Created,
    /// An existing job was returned unchanged
    Existing,
    /// An existing failed job was reset and a new attempt scheduled
    Retrying,
}

/// Result of `Orchestrator::submit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub job: Job,
    /// True when the normalized URL already had a job
    pub reused: bool,
    pub disposition: SubmitDisposition,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        let mut job = Job::new("https://example.com/");
        assert_eq!(job.status, JobStatus::Pending);

        job.begin_attempt().unwrap();
        assert_eq!(job.status, JobStatus::InProgress);
        assert!(job.crawl_started_at.is_some());

        job.transition(JobStatus::Completed).unwrap();
        job.begin_attempt().unwrap();
        job.fail("boom").unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.error_detail.as_deref(), Some("boom"));

        job.begin_attempt().unwrap();
        assert!(job.error_detail.is_none());
    }

    #[test]
    fn test_rejects_invalid_transitions() {
        let mut job = Job::new("https://example.com/");
        let err = job.transition(JobStatus::Completed).unwrap_err();
        assert!(matches!(
            err,
            MonitorError::InvalidTransition {
                from: JobStatus::Pending,
                to: JobStatus::Completed
            }
        ));

        job.begin_attempt().unwrap();
        job.transition(JobStatus::Completed).unwrap();
        assert!(job.transition(JobStatus::Pending).is_err());
        assert!(job.transition(JobStatus::Error).is_err());
    }

    #[test]
    fn test_progress_is_monotonic_within_attempt() {
        let mut job = Job::new("https://example.com/");
        job.begin_attempt().unwrap();
        job.advance_progress(40, "Crawled 2/5 pages");
        job.advance_progress(20, "late update");
        assert_eq!(job.progress_percentage, 40);
        assert_eq!(job.progress_message, "late update");
        job.advance_progress(250, "Complete");
        assert_eq!(job.progress_percentage, 100);

        job.transition(JobStatus::Completed).unwrap();
        job.begin_attempt().unwrap();
        assert_eq!(job.progress_percentage, 0);
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            JobStatus::Pending,
            JobStatus::InProgress,
            JobStatus::Completed,
            JobStatus::Error,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("updated".parse::<JobStatus>().is_err());
    }
}
