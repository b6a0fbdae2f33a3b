//! Job orchestration: submission, crawl attempts and the job lifecycle.
//!
//! # Attempt flow
//!
//! ```text
//! per-job lock ─► pool permit ─► in_progress ─► crawl ─► retention + fingerprint
//!                                                              │
//!                          unchanged ◄─────────────────────────┤
//!                              │                     changed ──► annotate ─► render
//!                              ▼                                               │
//!                      commit_crawl(job, pages, evicted) ◄─────────────────────┘
//!                              │
//!                          completed
//! ```
//!
//! Any unrecoverable failure moves the job to `error` and leaves the stored
//! pages and artifact as they were.

pub mod locks;
pub mod progress;

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, warn, Instrument};
use url::Url;

use crate::artifact::{annotation_input, render_llms_txt};
use crate::crawler::{CrawlEngine, CrawlProgress};
use crate::detector::{has_changed, plan_retention};
use crate::error::{MonitorError, Result};
use crate::links::normalize_url;
use crate::notifiers::LogNotifier;
use crate::security::UrlValidator;
use crate::traits::{
    annotator::Annotator,
    fetcher::Fetcher,
    notifier::{NotifyEvent, Notifier},
    store::MonitorStore,
};
use crate::types::{
    config::MonitorConfig,
    job::{Job, JobId, JobStatus, Progress, SubmitDisposition, Submission},
    page::{CrawlFailure, Page},
};

use locks::{AttemptGuard, JobLocks};
use progress::{crawl_percentage, ProgressTable, MAX_RUNNING_PERCENT};

/// Result of one call to [`Orchestrator::run_crawl_attempt`].
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    /// The attempt finished and the job is `completed`
    Completed {
        job: Job,
        /// The fingerprint replaced an older one
        changed: bool,
        /// The annotator was called
        annotated: bool,
        failures: Vec<CrawlFailure>,
    },
    /// Another attempt holds the job; nothing was started
    AlreadyRunning(Job),
    /// The attempt ended in `error`
    Failed { job: Job, detail: String },
}

impl AttemptOutcome {
    pub fn job(&self) -> &Job {
        match self {
            AttemptOutcome::Completed { job, .. }
            | AttemptOutcome::AlreadyRunning(job)
            | AttemptOutcome::Failed { job, .. } => job,
        }
    }
}

struct Inner<S, F: Fetcher> {
    store: Arc<S>,
    engine: CrawlEngine<F>,
    annotator: Arc<dyn Annotator>,
    notifier: Arc<dyn Notifier>,
    config: MonitorConfig,
    validator: UrlValidator,
    locks: JobLocks,
    /// Normalized URL → job, guarded so concurrent submissions of one URL
    /// resolve to one job
    url_index: Mutex<HashMap<String, JobId>>,
    pool: Arc<Semaphore>,
    tasks: TaskTracker,
    progress: ProgressTable,
}

/// Drives jobs through their lifecycle.
///
/// Cheap to clone; clones share state.
pub struct Orchestrator<S, F: Fetcher> {
    inner: Arc<Inner<S, F>>,
}

impl<S, F: Fetcher> Clone for Orchestrator<S, F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder<S, F> {
    store: Arc<S>,
    fetcher: Arc<F>,
    annotator: Arc<dyn Annotator>,
    notifier: Arc<dyn Notifier>,
    config: MonitorConfig,
    validator: UrlValidator,
}

impl<S, F> OrchestratorBuilder<S, F>
where
    S: MonitorStore + 'static,
    F: Fetcher + 'static,
{
    pub fn with_config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_url_validator(mut self, validator: UrlValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn build(self) -> Result<Orchestrator<S, F>> {
        self.config.validate()?;
        Ok(Orchestrator {
            inner: Arc::new(Inner {
                store: self.store,
                engine: CrawlEngine::new(self.fetcher),
                annotator: self.annotator,
                notifier: self.notifier,
                pool: Arc::new(Semaphore::new(self.config.max_concurrent_crawls)),
                config: self.config,
                validator: self.validator,
                locks: JobLocks::new(),
                url_index: Mutex::new(HashMap::new()),
                tasks: TaskTracker::new(),
                progress: ProgressTable::new(),
            }),
        })
    }
}

impl<S, F> Orchestrator<S, F>
where
    S: MonitorStore + 'static,
    F: Fetcher + 'static,
{
    pub fn builder(
        store: Arc<S>,
        fetcher: Arc<F>,
        annotator: Arc<dyn Annotator>,
    ) -> OrchestratorBuilder<S, F> {
        OrchestratorBuilder {
            store,
            fetcher,
            annotator,
            notifier: Arc::new(LogNotifier::new()),
            config: MonitorConfig::default(),
            validator: UrlValidator::new(),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.inner.store
    }

    /// Whether an attempt for `job_id` is queued or running in this process.
    pub fn is_running(&self, job_id: JobId) -> bool {
        self.inner.locks.is_locked(job_id)
    }

    // =========================================================================
    // Submission and queries
    // =========================================================================

    /// Submit a URL for crawling.
    ///
    /// A URL that already has a job returns that job; a job in `error` is
    /// reset and retried. New jobs start crawling in the background.
    pub async fn submit(&self, url: &str) -> Result<Submission> {
        let normalized = normalize_url(url)?;
        self.inner.validator.validate(url, &normalized)?;
        let key = normalized.as_str().to_string();

        let mut index = self.inner.url_index.lock().await;

        let existing = match index.get(&key) {
            Some(id) => self.inner.store.get_job(*id).await?,
            None => self.inner.store.find_job_by_url(&key).await?,
        };

        if let Some(job) = existing {
            index.insert(key, job.id);

            if job.status != JobStatus::Error {
                debug!(job_id = %job.id, url = %job.url, status = %job.status, "Returning existing job");
                let message = format!("Job already exists ({})", job.status);
                return Ok(Submission {
                    job,
                    reused: true,
                    disposition: SubmitDisposition::Existing,
                    message,
                });
            }

            let Some(guard) = self.inner.locks.try_acquire(job.id) else {
                // a sweep or an explicit attempt is already queued for it
                debug!(job_id = %job.id, "Failed job already has an attempt in flight");
                return Ok(Submission {
                    job,
                    reused: true,
                    disposition: SubmitDisposition::Existing,
                    message: "A new attempt is already queued".to_string(),
                });
            };

            // re-read under the lock; the attempt that held it may have finished
            let mut job = self.get_job(job.id).await?;
            if job.status != JobStatus::Error {
                let message = format!("Job already exists ({})", job.status);
                return Ok(Submission {
                    job,
                    reused: true,
                    disposition: SubmitDisposition::Existing,
                    message,
                });
            }

            job.transition(JobStatus::Pending)?;
            job.error_detail = None;
            job.progress_percentage = 0;
            job.progress_message = "Queued for retry".to_string();
            self.inner.store.update_job(&job).await?;
            drop(index);

            info!(job_id = %job.id, url = %job.url, "Retrying failed job");
            self.spawn_locked(job.id, guard);
            return Ok(Submission {
                job,
                reused: true,
                disposition: SubmitDisposition::Retrying,
                message: "Previous attempt failed; crawl restarted".to_string(),
            });
        }

        let job = Job::new(key.clone());
        self.inner.store.insert_job(&job).await?;
        index.insert(key, job.id);
        drop(index);

        info!(job_id = %job.id, url = %job.url, "Job created");
        self.spawn_attempt(job.id);
        Ok(Submission {
            job,
            reused: false,
            disposition: SubmitDisposition::Created,
            message: "Crawl started".to_string(),
        })
    }

    pub async fn get_job(&self, job_id: JobId) -> Result<Job> {
        self.inner
            .store
            .get_job(job_id)
            .await?
            .ok_or(MonitorError::JobNotFound(job_id))
    }

    /// Live progress while an attempt runs, otherwise the stored values.
    pub async fn get_progress(&self, job_id: JobId) -> Result<Progress> {
        if let Some(progress) = self.inner.progress.get(job_id) {
            return Ok(progress);
        }
        Ok(self.get_job(job_id).await?.progress())
    }

    /// Pages of a completed job, ordered by URL.
    pub async fn get_pages(&self, job_id: JobId) -> Result<Vec<Page>> {
        let job = self.completed_job(job_id).await?;
        self.inner.store.get_pages(job.id).await
    }

    /// The llms.txt artifact of a completed job.
    pub async fn artifact(&self, job_id: JobId) -> Result<String> {
        let job = self.completed_job(job_id).await?;
        job.llm_text_content.ok_or(MonitorError::NotCompleted {
            status: JobStatus::Completed,
        })
    }

    async fn completed_job(&self, job_id: JobId) -> Result<Job> {
        let job = self.get_job(job_id).await?;
        if job.status != JobStatus::Completed {
            return Err(MonitorError::NotCompleted { status: job.status });
        }
        Ok(job)
    }

    pub async fn list_jobs(&self, offset: usize, limit: usize) -> Result<Vec<Job>> {
        self.inner.store.list_jobs(offset, limit).await
    }

    /// Enable or disable periodic re-crawls for a job.
    ///
    /// Only the flag is written, so a toggle during a running attempt does
    /// not race the attempt's own writes.
    pub async fn set_monitoring(&self, job_id: JobId, enabled: bool) -> Result<Job> {
        self.inner
            .store
            .set_monitoring_enabled(job_id, enabled, Utc::now())
            .await?;
        info!(job_id = %job_id, enabled, "Monitoring toggled");
        self.get_job(job_id).await
    }

    /// Delete a job and its pages. Refused while an attempt is in flight.
    pub async fn reset_job(&self, job_id: JobId) -> Result<()> {
        let job = self.get_job(job_id).await?;
        let Some(_guard) = self.inner.locks.try_acquire(job_id) else {
            return Err(MonitorError::JobBusy(job_id));
        };

        let mut index = self.inner.url_index.lock().await;
        self.inner.store.delete_job(job_id).await?;
        index.remove(&job.url);
        drop(index);

        self.inner.progress.finish(job_id);
        self.inner.locks.remove(job_id);
        info!(job_id = %job_id, url = %job.url, "Job reset");
        Ok(())
    }

    /// Re-queue jobs whose attempt was abandoned.
    ///
    /// `in_progress` jobs with no attempt running in this process whose
    /// attempt started before `now - older_than` (or never recorded a start)
    /// go back to `pending`; those and any `pending` job without a running
    /// attempt get a new attempt. Runs at startup and at the start of every
    /// monitoring sweep.
    pub async fn reconcile_abandoned(&self, older_than: std::time::Duration) -> Result<Vec<JobId>> {
        let threshold = Utc::now()
            - chrono::Duration::from_std(older_than)
                .map_err(|e| MonitorError::Config(format!("invalid reconcile threshold: {}", e)))?;
        let mut requeued = Vec::new();

        for candidate in self.inner.store.find_jobs_by_status(JobStatus::InProgress).await? {
            let Some(guard) = self.inner.locks.try_acquire(candidate.id) else {
                continue;
            };
            let Some(mut job) = self.inner.store.get_job(candidate.id).await? else {
                continue;
            };
            let abandoned = job.status == JobStatus::InProgress
                && job.crawl_started_at.map_or(true, |started| started < threshold);
            if !abandoned {
                continue;
            }
            job.transition(JobStatus::Pending)?;
            job.progress_message = "Re-queued after interrupted attempt".to_string();
            self.inner.store.update_job(&job).await?;
            warn!(job_id = %job.id, url = %job.url, "Reclaimed abandoned crawl attempt");
            self.spawn_locked(job.id, guard);
            requeued.push(job.id);
        }

        for job in self.inner.store.find_jobs_by_status(JobStatus::Pending).await? {
            if requeued.contains(&job.id) {
                continue;
            }
            if self.spawn_attempt(job.id) {
                requeued.push(job.id);
            }
        }

        if !requeued.is_empty() {
            info!(count = requeued.len(), "Re-queued interrupted jobs");
        }
        Ok(requeued)
    }

    /// Wait for every background attempt and notification to finish.
    pub async fn wait_idle(&self) {
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.tasks.reopen();
    }

    // =========================================================================
    // Crawl attempts
    // =========================================================================

    /// Run one crawl attempt for a job and wait for it.
    ///
    /// Returns `AlreadyRunning` without doing anything if another attempt for
    /// the job is queued or running.
    pub async fn run_crawl_attempt(&self, job_id: JobId) -> Result<AttemptOutcome> {
        match self.inner.locks.try_acquire(job_id) {
            Some(guard) => self.run_locked(job_id, guard).await,
            None => {
                debug!(job_id = %job_id, "Attempt already in flight");
                Ok(AttemptOutcome::AlreadyRunning(self.get_job(job_id).await?))
            }
        }
    }

    /// Start an attempt in the background. The job lock is taken before the
    /// task is spawned, so the job reads as running immediately.
    ///
    /// Returns false when another attempt already holds the job.
    fn spawn_attempt(&self, job_id: JobId) -> bool {
        match self.inner.locks.try_acquire(job_id) {
            Some(guard) => {
                self.spawn_locked(job_id, guard);
                true
            }
            None => {
                debug!(job_id = %job_id, "Attempt already in flight; not spawning");
                false
            }
        }
    }

    fn spawn_locked(&self, job_id: JobId, guard: AttemptGuard) {
        let this = self.clone();
        self.inner.tasks.spawn(async move {
            if let Err(e) = this.run_locked(job_id, guard).await {
                error!(job_id = %job_id, error = %e, "Crawl attempt could not be recorded");
            }
        });
    }

    async fn run_locked(&self, job_id: JobId, guard: AttemptGuard) -> Result<AttemptOutcome> {
        let span = info_span!("crawl_attempt", job_id = %job_id);
        let outcome = self.attempt(job_id).instrument(span).await;
        self.inner.progress.finish(job_id);
        drop(guard);
        outcome
    }

    async fn attempt(&self, job_id: JobId) -> Result<AttemptOutcome> {
        let _permit = Arc::clone(&self.inner.pool)
            .acquire_owned()
            .await
            .map_err(|_| MonitorError::Config("worker pool closed".into()))?;

        let mut job = self.get_job(job_id).await?;
        if job.status == JobStatus::InProgress {
            // left over from an interrupted process; this lock owns it now
            job.transition(JobStatus::Pending)?;
        }
        job.begin_attempt()?;
        self.inner.progress.start(job_id, job.progress_message.clone());
        self.inner.store.update_job(&job).await?;
        info!(url = %job.url, "Crawl attempt started");

        match self.crawl_and_build(&mut job).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => self.record_failure(job_id, e).await,
        }
    }

    async fn crawl_and_build(&self, job: &mut Job) -> Result<AttemptOutcome> {
        let config = &self.inner.config;
        let job_id = job.id;
        let seed = Url::parse(&job.url).map_err(|e| MonitorError::invalid_url(&job.url, e))?;

        let progress = &self.inner.progress;
        let on_progress = |p: CrawlProgress| {
            progress.update(
                job_id,
                crawl_percentage(p.visited, p.max_pages),
                format!("Crawled {}/{} pages", p.visited, p.max_pages),
            );
        };
        let existing = self.inner.store.get_pages(job_id).await?;
        let outcome = self
            .inner
            .engine
            .crawl_incremental(&seed, &config.crawl, &existing, &on_progress)
            .await?;

        let seen_at = Utc::now();
        let mut plan = plan_retention(
            job_id,
            &existing,
            &outcome.pages,
            config.grace_period_crawls,
            seen_at,
        );
        plan.cap(config.crawl.max_pages);
        let new_hash = plan.fingerprint();
        let previous_hash = job.content_hash.clone();
        let changed = has_changed(&new_hash, previous_hash.as_deref());
        let needs_artifact = changed || job.llm_text_content.is_none();

        debug!(
            pages = plan.retained.len(),
            evicted = plan.evicted.len(),
            changed,
            "Content fingerprinted"
        );

        if needs_artifact {
            progress.update(job_id, MAX_RUNNING_PERCENT, "Generating summary");
            let input = annotation_input(&plan.retained, config.max_annotation_chars);
            let annotation = tokio::time::timeout(
                config.annotator_timeout,
                self.inner.annotator.annotate(&input),
            )
            .await
            .map_err(|_| MonitorError::AnnotatorTimeout(config.annotator_timeout))??;

            job.llm_text_content = Some(render_llms_txt(
                &job.url,
                config.crawl.max_depth,
                &plan.retained,
                &annotation,
            ));
        }

        let content_changed = changed && previous_hash.is_some();
        if changed {
            job.previous_content_hash = previous_hash.clone();
            job.content_hash = Some(new_hash.clone());
        }
        job.content_changed = content_changed;
        job.last_crawled = Some(seen_at);
        job.transition(JobStatus::Completed)?;
        job.advance_progress(
            100,
            format!(
                "Completed: {} pages, {} failed",
                outcome.pages.len(),
                outcome.failures.len()
            ),
        );

        self.inner
            .store
            .commit_crawl(job, &plan.retained, &plan.evicted)
            .await?;

        info!(
            url = %job.url,
            pages = plan.retained.len(),
            failures = outcome.failures.len(),
            changed = content_changed,
            "Crawl attempt completed"
        );

        if let (true, Some(previous)) = (content_changed, previous_hash) {
            self.notify(
                job_id,
                NotifyEvent::ContentChanged {
                    url: job.url.clone(),
                    previous_hash: previous,
                    new_hash,
                },
            );
        }

        Ok(AttemptOutcome::Completed {
            job: job.clone(),
            changed: content_changed,
            annotated: needs_artifact,
            failures: outcome.failures,
        })
    }

    /// Move the job to `error`, starting from the stored record so content
    /// fields keep their last committed values.
    async fn record_failure(&self, job_id: JobId, cause: MonitorError) -> Result<AttemptOutcome> {
        let detail = cause.to_string();
        error!(error = %detail, "Crawl attempt failed");

        let mut job = self.get_job(job_id).await?;
        if job.status != JobStatus::InProgress {
            // the failure happened before the attempt was recorded
            return Err(cause);
        }
        job.fail(detail.clone())?;
        self.inner.store.update_job(&job).await?;

        self.notify(
            job_id,
            NotifyEvent::CrawlFailed {
                url: job.url.clone(),
                detail: detail.clone(),
            },
        );
        Ok(AttemptOutcome::Failed { job, detail })
    }

    fn notify(&self, job_id: JobId, event: NotifyEvent) {
        let notifier = Arc::clone(&self.inner.notifier);
        self.inner.tasks.spawn(async move {
            if let Err(e) = notifier.notify(job_id, &event).await {
                warn!(job_id = %job_id, error = %e, "Notification failed");
            }
        });
    }
}
