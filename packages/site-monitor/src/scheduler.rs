//! Monitoring sweeps.
//!
//! A sweep first restarts abandoned attempts, then re-crawls every job with
//! monitoring enabled. The recurring timer belongs to the host application;
//! this type owns the sweep itself, the one-sweep-at-a-time rule and the
//! status it reports.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, info_span, warn, Instrument};

use crate::error::Result;
use crate::orchestrator::{AttemptOutcome, Orchestrator};
use crate::traits::{fetcher::Fetcher, store::MonitorStore};
use crate::types::{
    job::Job,
    status::{MonitoringStatus, SweepOutcome, SweepReport},
};

#[derive(Default)]
struct SweepState {
    last_sweep_started: Option<DateTime<Utc>>,
    last_sweep_time: Option<DateTime<Utc>>,
    last_report: Option<SweepReport>,
}

/// Runs monitoring sweeps against an [`Orchestrator`].
pub struct MonitoringScheduler<S, F: Fetcher> {
    orchestrator: Orchestrator<S, F>,
    sweep_lock: Mutex<()>,
    state: RwLock<SweepState>,
}

impl<S, F> MonitoringScheduler<S, F>
where
    S: MonitorStore + 'static,
    F: Fetcher + 'static,
{
    pub fn new(orchestrator: Orchestrator<S, F>) -> Self {
        Self {
            orchestrator,
            sweep_lock: Mutex::new(()),
            state: RwLock::new(SweepState::default()),
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator<S, F> {
        &self.orchestrator
    }

    /// Jobs a sweep started now would re-crawl.
    pub async fn eligible_jobs(&self) -> Result<Vec<Job>> {
        let min_age = chrono::Duration::from_std(self.orchestrator.config().min_recrawl_age)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let cutoff = Utc::now() - min_age;

        let candidates = self.orchestrator.store().find_monitoring_candidates().await?;
        Ok(candidates
            .into_iter()
            .filter(|job| job.last_crawled.map_or(true, |at| at <= cutoff))
            .collect())
    }

    /// Run a sweep now, unless one is already running.
    pub async fn trigger_sweep(&self) -> Result<SweepOutcome> {
        let Ok(_guard) = self.sweep_lock.try_lock() else {
            info!("Monitoring sweep already running");
            return Ok(SweepOutcome::AlreadyRunning);
        };
        let report = self.sweep().instrument(info_span!("monitoring_sweep")).await?;
        Ok(SweepOutcome::Completed(report))
    }

    /// Entry point for the recurring timer.
    pub async fn run_scheduled_sweep(&self) -> Result<SweepOutcome> {
        info!("Scheduled monitoring sweep starting");
        self.trigger_sweep().await
    }

    pub async fn status(&self) -> Result<MonitoringStatus> {
        let jobs_eligible = self.eligible_jobs().await?.len();
        let state = self.state.read().await;
        Ok(MonitoringStatus {
            last_sweep_started: state.last_sweep_started,
            last_sweep_time: state.last_sweep_time,
            last_report: state.last_report.clone(),
            jobs_eligible,
            sweep_in_progress: self.sweep_lock.try_lock().is_err(),
            interval_secs: self.orchestrator.config().monitor_interval.as_secs(),
        })
    }

    async fn sweep(&self) -> Result<SweepReport> {
        let started = Utc::now();
        self.state.write().await.last_sweep_started = Some(started);

        let recovered = match self
            .orchestrator
            .reconcile_abandoned(self.orchestrator.config().stale_attempt_after)
            .await
        {
            Ok(requeued) => requeued.len(),
            Err(e) => {
                warn!(error = %e, "Failed to reconcile interrupted jobs");
                0
            }
        };

        let jobs = self.eligible_jobs().await?;
        let mut report = SweepReport {
            eligible: jobs.len(),
            recovered,
            ..SweepReport::default()
        };
        info!(eligible = report.eligible, recovered, "Monitoring sweep started");

        let store = self.orchestrator.store();
        for job in &jobs {
            if self.orchestrator.is_running(job.id) {
                continue;
            }
            if let Err(e) = store.stamp_last_monitored(job.id, started).await {
                warn!(job_id = %job.id, error = %e, "Failed to stamp last_monitored");
            }
        }

        let attempts = jobs
            .iter()
            .map(|job| self.orchestrator.run_crawl_attempt(job.id));

        for (job, result) in jobs.iter().zip(join_all(attempts).await) {
            match result {
                Ok(AttemptOutcome::Completed { changed: true, .. }) => report.changed += 1,
                Ok(AttemptOutcome::Completed { .. }) => report.unchanged += 1,
                Ok(AttemptOutcome::AlreadyRunning(_)) => report.skipped += 1,
                Ok(AttemptOutcome::Failed { .. }) => report.failed += 1,
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "Monitoring attempt could not run");
                    report.failed += 1;
                }
            }
        }

        let finished = Utc::now();
        {
            let mut state = self.state.write().await;
            state.last_sweep_time = Some(finished);
            state.last_report = Some(report.clone());
        }

        info!(
            eligible = report.eligible,
            changed = report.changed,
            unchanged = report.unchanged,
            failed = report.failed,
            skipped = report.skipped,
            recovered = report.recovered,
            duration_ms = (finished - started).num_milliseconds(),
            "Monitoring sweep finished"
        );
        Ok(report)
    }
}
