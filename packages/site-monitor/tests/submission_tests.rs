//! Submission, crawl attempts and job queries through the public API.

mod common;

use common::{small_site, test_config, TestHarness};
use site_monitor::testing::{link_page, MockFetcher};
use site_monitor::{
    AttemptOutcome, CrawlProgress, FailureKind, JobStatus, MonitorError, StopReason, SubmitDisposition,
};
use std::time::Duration;

#[tokio::test]
async fn test_double_submission_returns_same_job() {
    let h = TestHarness::new(small_site());

    let first = h.orchestrator.submit("https://example.com").await.unwrap();
    let second = h.orchestrator.submit("HTTPS://EXAMPLE.COM/#intro").await.unwrap();

    assert_eq!(first.job.id, second.job.id);
    assert!(!first.reused);
    assert!(second.reused);
    assert_eq!(second.disposition, SubmitDisposition::Existing);

    h.orchestrator.wait_idle().await;
    assert_eq!(h.store.job_count(), 1);
}

#[tokio::test]
async fn test_concurrent_submissions_create_one_job() {
    let h = TestHarness::new(small_site());

    let submissions = futures::future::join_all(
        (0..8).map(|_| h.orchestrator.submit("https://example.com/")),
    )
    .await;
    h.orchestrator.wait_idle().await;

    let ids: Vec<_> = submissions.into_iter().map(|s| s.unwrap().job.id).collect();
    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(h.store.job_count(), 1);
    assert_eq!(
        h.fetcher
            .fetched_urls()
            .iter()
            .filter(|u| *u == "https://example.com/")
            .count(),
        1
    );
}

#[tokio::test]
async fn test_page_budget_on_wide_homepage() {
    let links: Vec<String> = (1..=10).map(|i| format!("/item-{}", i)).collect();
    let link_refs: Vec<&str> = links.iter().map(String::as_str).collect();
    let mut fetcher = MockFetcher::new().with_page("https://example.com/", link_page("Home", &link_refs));
    for link in &links {
        fetcher = fetcher.with_page(format!("https://example.com{}", link), link_page(link, &[]));
    }
    let config = test_config().with_crawl(common::fast_crawl().with_max_depth(1).with_max_pages(5));
    let h = TestHarness::with_config(fetcher, config);

    let job = h.orchestrator.submit("https://example.com/").await.unwrap().job;
    h.orchestrator.wait_idle().await;

    let pages = h.orchestrator.get_pages(job.id).await.unwrap();
    let urls: Vec<&str> = pages.iter().map(|p| p.url.as_str()).collect();
    assert_eq!(
        urls,
        vec![
            "https://example.com/",
            "https://example.com/item-1",
            "https://example.com/item-2",
            "https://example.com/item-3",
            "https://example.com/item-4",
        ]
    );
    assert_eq!(h.fetcher.fetched_urls().len(), 5);
}

#[tokio::test]
async fn test_timed_out_page_is_excluded_but_job_completes() {
    let fetcher = small_site().with_timeout("https://example.com/about");
    let h = TestHarness::new(fetcher);
    let job = h.orchestrator.submit("https://example.com/").await.unwrap().job;
    h.orchestrator.wait_idle().await;

    let outcome = h.orchestrator.run_crawl_attempt(job.id).await.unwrap();
    let AttemptOutcome::Completed { failures, .. } = outcome else {
        panic!("expected completion, got {:?}", outcome);
    };
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].url, "https://example.com/about");
    assert_eq!(failures[0].kind, FailureKind::Timeout);

    let job = h.orchestrator.get_job(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    let pages = h.orchestrator.get_pages(job.id).await.unwrap();
    assert_eq!(pages.len(), 3);
    assert!(pages.iter().all(|p| p.url != "https://example.com/about"));
}

#[tokio::test(start_paused = true)]
async fn test_slow_page_is_bounded_by_request_timeout() {
    let fetcher = small_site().with_delay("https://example.com/docs", Duration::from_secs(600));
    let config = test_config().with_crawl(
        common::fast_crawl().with_request_timeout(Duration::from_secs(5)),
    );
    let h = TestHarness::with_config(fetcher, config);

    let job = h.orchestrator.submit("https://example.com/").await.unwrap().job;
    h.orchestrator.wait_idle().await;

    let job = h.orchestrator.get_job(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    let pages = h.orchestrator.get_pages(job.id).await.unwrap();
    assert!(pages.iter().all(|p| p.url != "https://example.com/docs"));
}

#[tokio::test]
async fn test_identical_content_gives_identical_fingerprint() {
    let h = TestHarness::new(small_site());
    let job = h.orchestrator.submit("https://example.com/").await.unwrap().job;
    h.orchestrator.wait_idle().await;
    let first = h.orchestrator.get_job(job.id).await.unwrap().content_hash;

    h.orchestrator.run_crawl_attempt(job.id).await.unwrap();
    let second = h.orchestrator.get_job(job.id).await.unwrap().content_hash;

    assert!(first.is_some());
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_progress_reaches_complete_only_at_the_end() {
    let fetcher = small_site()
        .with_delay("https://example.com/docs", Duration::from_millis(30))
        .with_delay("https://example.com/about", Duration::from_millis(30));
    let h = TestHarness::new(fetcher);
    let job = h.orchestrator.submit("https://example.com/").await.unwrap().job;

    let mut observed = Vec::new();
    loop {
        let progress = h.orchestrator.get_progress(job.id).await.unwrap();
        observed.push((progress.percentage, progress.status));
        if progress.status == JobStatus::Completed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    h.orchestrator.wait_idle().await;

    let in_flight: Vec<u8> = observed
        .iter()
        .filter(|(_, status)| *status == JobStatus::InProgress)
        .map(|(pct, _)| *pct)
        .collect();
    assert!(in_flight.windows(2).all(|w| w[0] <= w[1]), "{:?}", in_flight);
    assert!(in_flight.iter().all(|pct| *pct < 100));
    assert_eq!(observed.last().map(|o| o.0), Some(100));
}

#[tokio::test]
async fn test_pages_and_artifact_require_completion() {
    let h = TestHarness::new(
        small_site().with_delay("https://example.com/", Duration::from_millis(100)),
    );
    let job = h.orchestrator.submit("https://example.com/").await.unwrap().job;

    let err = h.orchestrator.artifact(job.id).await.unwrap_err();
    assert!(matches!(err, MonitorError::NotCompleted { .. }));
    let err = h.orchestrator.get_pages(job.id).await.unwrap_err();
    assert!(matches!(err, MonitorError::NotCompleted { .. }));

    h.orchestrator.wait_idle().await;
    let artifact = h.orchestrator.artifact(job.id).await.unwrap();
    assert!(artifact.starts_with("# Example\n\n> Test summary.\n"));
    assert!(artifact.contains("Category: Documentation"));
    assert!(artifact.contains("- [Docs](https://example.com/docs)"));
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let h = TestHarness::new(small_site());
    let id = site_monitor::JobId::new();

    assert!(matches!(
        h.orchestrator.get_job(id).await,
        Err(MonitorError::JobNotFound(_))
    ));
    assert!(matches!(
        h.orchestrator.get_progress(id).await,
        Err(MonitorError::JobNotFound(_))
    ));
}

#[tokio::test]
async fn test_list_jobs_newest_first() {
    let h = TestHarness::new(
        MockFetcher::new()
            .with_page("https://a.example.com/", link_page("A", &[]))
            .with_page("https://b.example.com/", link_page("B", &[])),
    );
    let a = h.orchestrator.submit("https://a.example.com/").await.unwrap().job;
    tokio::time::sleep(Duration::from_millis(2)).await;
    let b = h.orchestrator.submit("https://b.example.com/").await.unwrap().job;
    h.orchestrator.wait_idle().await;

    let jobs = h.orchestrator.list_jobs(0, 10).await.unwrap();
    assert_eq!(jobs.iter().map(|j| j.id).collect::<Vec<_>>(), vec![b.id, a.id]);
    assert_eq!(h.orchestrator.list_jobs(1, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_stop_reason_reported_for_deep_sites() {
    let h = TestHarness::new(small_site());
    let engine = site_monitor::CrawlEngine::new(h.fetcher.clone());
    let seed = url::Url::parse("https://example.com/").unwrap();

    let outcome = engine
        .crawl(&seed, &common::fast_crawl().with_max_pages(2), &|_: CrawlProgress| {})
        .await
        .unwrap();

    assert_eq!(outcome.stop_reason, StopReason::PageBudget);
    assert_eq!(outcome.pages.len(), 2);
}
