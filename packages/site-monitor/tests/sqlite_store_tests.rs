//! End-to-end runs against the SQLite store.
#![cfg(feature = "sqlite")]

mod common;

use std::sync::Arc;

use common::{small_site, test_config};
use site_monitor::testing::{link_page, MockAnnotator, RecordingNotifier};
use site_monitor::{
    JobStatus, MonitoringScheduler, Orchestrator, PageStore, SqliteStore, SweepOutcome,
};

#[tokio::test]
async fn test_crawl_and_monitor_with_sqlite() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let fetcher = Arc::new(small_site());
    let annotator = Arc::new(MockAnnotator::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let orchestrator = Orchestrator::builder(store.clone(), fetcher.clone(), annotator.clone())
        .with_config(test_config())
        .with_notifier(notifier.clone())
        .build()
        .unwrap();
    let scheduler = MonitoringScheduler::new(orchestrator.clone());

    let job = orchestrator.submit("https://example.com/").await.unwrap().job;
    orchestrator.wait_idle().await;

    let completed = orchestrator.get_job(job.id).await.unwrap();
    assert_eq!(completed.status, JobStatus::Completed);
    assert_eq!(store.get_pages(job.id).await.unwrap().len(), 4);
    let artifact = orchestrator.artifact(job.id).await.unwrap();
    assert!(artifact.starts_with("# Example"));

    fetcher.set_page("https://example.com/docs", link_page("New docs", &[]));
    let SweepOutcome::Completed(report) = scheduler.trigger_sweep().await.unwrap() else {
        panic!("expected a sweep");
    };
    orchestrator.wait_idle().await;

    assert_eq!(report.changed, 1);
    let changed = orchestrator.get_job(job.id).await.unwrap();
    assert!(changed.content_changed);
    assert_eq!(changed.previous_content_hash, completed.content_hash);
    assert!(notifier.saw_change(job.id));
    assert_eq!(annotator.call_count(), 2);
}

#[tokio::test]
async fn test_monitoring_toggle_survives_sqlite_commit() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let orchestrator = Orchestrator::builder(
        store,
        Arc::new(small_site()),
        Arc::new(MockAnnotator::new()),
    )
    .with_config(test_config())
    .build()
    .unwrap();

    let job = orchestrator.submit("https://example.com/").await.unwrap().job;
    orchestrator.wait_idle().await;
    orchestrator.set_monitoring(job.id, false).await.unwrap();
    orchestrator.run_crawl_attempt(job.id).await.unwrap();

    let job = orchestrator.get_job(job.id).await.unwrap();
    assert!(!job.monitoring_enabled);
    assert_eq!(job.status, JobStatus::Completed);
}
