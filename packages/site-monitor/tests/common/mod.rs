// Common test utilities
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use site_monitor::testing::{link_page, MockAnnotator, MockFetcher, RecordingNotifier};
use site_monitor::{CrawlConfig, MemoryStore, MonitorConfig, MonitoringScheduler, Orchestrator};

pub type TestOrchestrator = Orchestrator<MemoryStore, MockFetcher>;

/// Everything a scenario needs, sharing one store, site and annotator.
pub struct TestHarness {
    pub orchestrator: TestOrchestrator,
    pub scheduler: MonitoringScheduler<MemoryStore, MockFetcher>,
    pub store: Arc<MemoryStore>,
    pub fetcher: Arc<MockFetcher>,
    pub annotator: Arc<MockAnnotator>,
    pub notifier: Arc<RecordingNotifier>,
}

/// Crawl settings without politeness delays or robots.txt.
pub fn fast_crawl() -> CrawlConfig {
    CrawlConfig::default()
        .with_request_delay(Duration::ZERO)
        .with_robots_txt(false)
}

pub fn test_config() -> MonitorConfig {
    MonitorConfig::default().with_crawl(fast_crawl())
}

impl TestHarness {
    pub fn new(fetcher: MockFetcher) -> Self {
        Self::with_config(fetcher, test_config())
    }

    pub fn with_config(fetcher: MockFetcher, config: MonitorConfig) -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), fetcher, config)
    }

    pub fn with_store(store: Arc<MemoryStore>, fetcher: MockFetcher, config: MonitorConfig) -> Self {
        let fetcher = Arc::new(fetcher);
        let annotator = Arc::new(MockAnnotator::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let orchestrator = Orchestrator::builder(store.clone(), fetcher.clone(), annotator.clone())
            .with_config(config)
            .with_notifier(notifier.clone())
            .build()
            .unwrap();
        let scheduler = MonitoringScheduler::new(orchestrator.clone());

        Self {
            orchestrator,
            scheduler,
            store,
            fetcher,
            annotator,
            notifier,
        }
    }
}

/// Homepage linking to `/docs`, `/blog/launch` and `/about`.
pub fn small_site() -> MockFetcher {
    MockFetcher::new()
        .with_page(
            "https://example.com/",
            link_page("Example", &["/docs", "/blog/launch", "/about"]),
        )
        .with_page("https://example.com/docs", link_page("Docs", &[]))
        .with_page("https://example.com/blog/launch", link_page("Launch", &[]))
        .with_page("https://example.com/about", link_page("About", &[]))
}
