//! In-memory storage implementation for testing and development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{MonitorError, Result};
use crate::traits::store::{JobStore, PageStore};
use crate::types::job::{Job, JobId, JobStatus};
use crate::types::page::Page;

#[derive(Default)]
struct State {
    jobs: HashMap<JobId, Job>,
    /// Unique index on normalized URL
    urls: HashMap<String, JobId>,
    pages: HashMap<JobId, BTreeMap<String, Page>>,
}

/// In-memory storage for jobs and pages.
///
/// All state sits behind one lock, so `commit_crawl` is atomic. Data is lost
/// on restart.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    fail_commits: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `commit_crawl` fail (simulates a storage outage).
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub fn job_count(&self) -> usize {
        self.read().map(|s| s.jobs.len()).unwrap_or(0)
    }

    pub fn page_count(&self) -> usize {
        self.read()
            .map(|s| s.pages.values().map(BTreeMap::len).sum())
            .unwrap_or(0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| MonitorError::Persistence("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| MonitorError::Persistence("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert_job(&self, job: &Job) -> Result<()> {
        let mut state = self.write()?;
        if state.jobs.contains_key(&job.id) {
            return Err(MonitorError::Persistence(format!(
                "job {} already exists",
                job.id
            )));
        }
        if state.urls.contains_key(&job.url) {
            return Err(MonitorError::Persistence(format!(
                "a job for {} already exists",
                job.url
            )));
        }
        state.urls.insert(job.url.clone(), job.id);
        state.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> Result<Option<Job>> {
        Ok(self.read()?.jobs.get(&id).cloned())
    }

    async fn find_job_by_url(&self, url: &str) -> Result<Option<Job>> {
        let state = self.read()?;
        Ok(state.urls.get(url).and_then(|id| state.jobs.get(id)).cloned())
    }

    async fn update_job(&self, job: &Job) -> Result<()> {
        let mut state = self.write()?;
        match state.jobs.get_mut(&job.id) {
            Some(stored) => {
                *stored = Job {
                    monitoring_enabled: stored.monitoring_enabled,
                    last_monitored: stored.last_monitored,
                    ..job.clone()
                };
                Ok(())
            }
            None => Err(MonitorError::JobNotFound(job.id)),
        }
    }

    async fn set_monitoring_enabled(
        &self,
        id: JobId,
        enabled: bool,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.write()?;
        let job = state.jobs.get_mut(&id).ok_or(MonitorError::JobNotFound(id))?;
        job.monitoring_enabled = enabled;
        job.updated_at = at;
        Ok(())
    }

    async fn stamp_last_monitored(&self, id: JobId, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.write()?;
        let job = state.jobs.get_mut(&id).ok_or(MonitorError::JobNotFound(id))?;
        job.last_monitored = Some(at);
        Ok(())
    }

    async fn delete_job(&self, id: JobId) -> Result<()> {
        let mut state = self.write()?;
        if let Some(job) = state.jobs.remove(&id) {
            state.urls.remove(&job.url);
        }
        state.pages.remove(&id);
        Ok(())
    }

    async fn list_jobs(&self, offset: usize, limit: usize) -> Result<Vec<Job>> {
        let state = self.read()?;
        let mut jobs: Vec<Job> = state.jobs.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(jobs.into_iter().skip(offset).take(limit).collect())
    }

    async fn find_jobs_by_status(&self, status: JobStatus) -> Result<Vec<Job>> {
        let state = self.read()?;
        let mut jobs: Vec<Job> = state
            .jobs
            .values()
            .filter(|j| j.status == status)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.id);
        Ok(jobs)
    }

    async fn find_monitoring_candidates(&self) -> Result<Vec<Job>> {
        let state = self.read()?;
        let mut jobs: Vec<Job> = state
            .jobs
            .values()
            .filter(|j| {
                j.monitoring_enabled
                    && matches!(j.status, JobStatus::Completed | JobStatus::Error)
            })
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.id);
        Ok(jobs)
    }
}

#[async_trait]
impl PageStore for MemoryStore {
    async fn get_pages(&self, job_id: JobId) -> Result<Vec<Page>> {
        Ok(self
            .read()?
            .pages
            .get(&job_id)
            .map(|pages| pages.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn commit_crawl(&self, job: &Job, pages: &[Page], evicted_urls: &[String]) -> Result<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(MonitorError::Persistence(
                "memory store is configured to fail commits".into(),
            ));
        }

        let mut state = self.write()?;
        let (monitoring_enabled, last_monitored) = match state.jobs.get(&job.id) {
            Some(stored) => (stored.monitoring_enabled, stored.last_monitored),
            None => return Err(MonitorError::JobNotFound(job.id)),
        };

        let stored = state.pages.entry(job.id).or_default();
        for url in evicted_urls {
            stored.remove(url);
        }
        for page in pages {
            stored.insert(page.url.clone(), page.clone());
        }

        let mut job = job.clone();
        job.monitoring_enabled = monitoring_enabled;
        job.last_monitored = last_monitored;
        state.jobs.insert(job.id, job);
        Ok(())
    }
}
