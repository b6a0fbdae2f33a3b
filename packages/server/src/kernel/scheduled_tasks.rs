//! Scheduled background tasks using tokio-cron-scheduler.
//!
//! One recurring task runs the monitoring sweep every
//! `monitor_interval`. The sweep itself decides which jobs are due and
//! refuses to overlap with a sweep that is still running.
//!
//! ```text
//! Scheduler (every monitor_interval)
//!     │
//!     └─► MonitoringScheduler::run_scheduled_sweep()
//!             └─► For each monitored job → Orchestrator::run_crawl_attempt
//! ```

use anyhow::Result;
use site_monitor::SweepOutcome;
use std::sync::Arc;
use std::time::Duration;
use tokio_cron_scheduler::{Job, JobScheduler};

use super::deps::AppScheduler;

/// Start all scheduled tasks
pub async fn start_scheduler(monitor: Arc<AppScheduler>, interval: Duration) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let sweep_job = Job::new_repeated_async(interval, move |_uuid, _lock| {
        let monitor = monitor.clone();
        Box::pin(async move {
            run_monitoring_sweep(&monitor).await;
        })
    })?;

    scheduler.add(sweep_job).await?;
    scheduler.start().await?;

    tracing::info!(
        interval_secs = interval.as_secs(),
        "Scheduled tasks started (monitoring sweep)"
    );
    Ok(scheduler)
}

/// Run one monitoring sweep, logging instead of propagating failures so the
/// timer keeps firing.
async fn run_monitoring_sweep(monitor: &AppScheduler) {
    match monitor.run_scheduled_sweep().await {
        Ok(SweepOutcome::Completed(report)) => {
            tracing::info!(
                eligible = report.eligible,
                changed = report.changed,
                failed = report.failed,
                "Scheduled sweep complete"
            );
        }
        Ok(SweepOutcome::AlreadyRunning) => {
            tracing::info!("Previous sweep still running; skipping this tick");
        }
        Err(e) => {
            tracing::error!("Monitoring sweep task failed: {}", e);
        }
    }
}
