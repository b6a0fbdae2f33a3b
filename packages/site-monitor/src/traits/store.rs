//! Storage traits for jobs and pages.
//!
//! Split into focused traits:
//! - `JobStore`: job records, unique by normalized URL
//! - `PageStore`: pages keyed by (job, URL), committed together with the job
//! - `MonitorStore`: composite trait combining both

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{
    job::{Job, JobId, JobStatus},
    page::Page,
};

/// Persistence for job records.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job. Fails if the id or normalized URL already exists.
    async fn insert_job(&self, job: &Job) -> Result<()>;

    async fn get_job(&self, id: JobId) -> Result<Option<Job>>;

    /// Look up a job by normalized URL.
    async fn find_job_by_url(&self, url: &str) -> Result<Option<Job>>;

    /// Replace the stored job record.
    ///
    /// `monitoring_enabled` and `last_monitored` are left as stored; they
    /// change only through [`set_monitoring_enabled`](Self::set_monitoring_enabled)
    /// and [`stamp_last_monitored`](Self::stamp_last_monitored), so a toggle
    /// made while an attempt runs is never overwritten by the attempt.
    async fn update_job(&self, job: &Job) -> Result<()>;

    /// Set the monitoring flag of one job without touching other fields.
    async fn set_monitoring_enabled(
        &self,
        id: JobId,
        enabled: bool,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Record that a monitoring sweep picked up the job.
    async fn stamp_last_monitored(&self, id: JobId, at: DateTime<Utc>) -> Result<()>;

    /// Delete a job and its pages.
    async fn delete_job(&self, id: JobId) -> Result<()>;

    /// Jobs ordered by creation time, newest first.
    async fn list_jobs(&self, offset: usize, limit: usize) -> Result<Vec<Job>>;

    async fn find_jobs_by_status(&self, status: JobStatus) -> Result<Vec<Job>>;

    /// Jobs with monitoring enabled whose status is `completed` or `error`.
    async fn find_monitoring_candidates(&self) -> Result<Vec<Job>>;
}

/// Persistence for pages.
#[async_trait]
pub trait PageStore: Send + Sync {
    /// All pages of a job, ordered by URL.
    async fn get_pages(&self, job_id: JobId) -> Result<Vec<Page>>;

    /// Persist the result of a crawl attempt atomically: upsert `pages`,
    /// delete `evicted_urls`, and write `job`.
    ///
    /// Readers never observe the new pages without the new job state.
    /// `monitoring_enabled` and `last_monitored` are left as stored.
    async fn commit_crawl(&self, job: &Job, pages: &[Page], evicted_urls: &[String]) -> Result<()>;
}

/// Composite storage trait used by the orchestrator.
pub trait MonitorStore: JobStore + PageStore {}

// Blanket implementation: anything implementing both traits is a MonitorStore
impl<T: JobStore + PageStore> MonitorStore for T {}
