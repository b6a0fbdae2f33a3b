//! Configuration types for crawling and monitoring.

use std::time::Duration;

use crate::error::{MonitorError, Result};

/// Browser-like user agent; many sites reject obvious bots.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Limits for a single crawl attempt.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Maximum link depth from the seed (seed is depth 0). Default: 1.
    pub max_depth: usize,

    /// Maximum fetches per attempt, failures included. Default: 20.
    pub max_pages: usize,

    /// Timeout for one page fetch. Default: 10s.
    pub request_timeout: Duration,

    /// Delay between consecutive fetches to the same host. Default: 2s.
    pub request_delay: Duration,

    /// Wall-clock budget for the whole crawl. Default: 5 minutes.
    pub max_duration: Duration,

    /// Text blocks kept per page. Default: 10.
    pub max_paragraphs: usize,

    /// Concurrent fetches within one BFS level. Default: 4.
    pub max_concurrent_fetches: usize,

    /// Honor robots.txt Disallow and Crawl-delay. Default: true.
    pub respect_robots_txt: bool,

    /// User agent used for robots.txt matching and requests
    pub user_agent: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_depth: 1,
            max_pages: 20,
            request_timeout: Duration::from_secs(10),
            request_delay: Duration::from_secs(2),
            max_duration: Duration::from_secs(300),
            max_paragraphs: 10,
            max_concurrent_fetches: 4,
            respect_robots_txt: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl CrawlConfig {
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_max_pages(mut self, pages: usize) -> Self {
        self.max_pages = pages;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    pub fn with_max_duration(mut self, duration: Duration) -> Self {
        self.max_duration = duration;
        self
    }

    pub fn with_max_paragraphs(mut self, paragraphs: usize) -> Self {
        self.max_paragraphs = paragraphs;
        self
    }

    pub fn with_max_concurrent_fetches(mut self, fetches: usize) -> Self {
        self.max_concurrent_fetches = fetches;
        self
    }

    pub fn with_robots_txt(mut self, respect: bool) -> Self {
        self.respect_robots_txt = respect;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_pages == 0 {
            return Err(MonitorError::Config("max_pages must be at least 1".into()));
        }
        if self.max_concurrent_fetches == 0 {
            return Err(MonitorError::Config(
                "max_concurrent_fetches must be at least 1".into(),
            ));
        }
        if self.max_paragraphs == 0 {
            return Err(MonitorError::Config(
                "max_paragraphs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Orchestrator and scheduler settings.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub crawl: CrawlConfig,

    /// Consecutive missed cycles before a page is evicted. Default: 2.
    pub grace_period_crawls: u32,

    /// Timeout for one annotator call. Default: 60s.
    pub annotator_timeout: Duration,

    /// Characters of page text sent to the annotator. Default: 8000.
    pub max_annotation_chars: usize,

    /// Crawl attempts running at once across all jobs. Default: 4.
    pub max_concurrent_crawls: usize,

    /// Time between monitoring sweeps. Default: 24h.
    pub monitor_interval: Duration,

    /// Jobs crawled more recently than this are skipped by sweeps. Default: 0.
    pub min_recrawl_age: Duration,

    /// `in_progress` jobs older than this are reclaimed at startup. Default: 30m.
    pub stale_attempt_after: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            crawl: CrawlConfig::default(),
            grace_period_crawls: 2,
            annotator_timeout: Duration::from_secs(60),
            max_annotation_chars: 8000,
            max_concurrent_crawls: 4,
            monitor_interval: Duration::from_secs(24 * 60 * 60),
            min_recrawl_age: Duration::ZERO,
            stale_attempt_after: Duration::from_secs(30 * 60),
        }
    }
}

impl MonitorConfig {
    pub fn with_crawl(mut self, crawl: CrawlConfig) -> Self {
        self.crawl = crawl;
        self
    }

    pub fn with_grace_period(mut self, crawls: u32) -> Self {
        self.grace_period_crawls = crawls;
        self
    }

    pub fn with_annotator_timeout(mut self, timeout: Duration) -> Self {
        self.annotator_timeout = timeout;
        self
    }

    pub fn with_max_annotation_chars(mut self, chars: usize) -> Self {
        self.max_annotation_chars = chars;
        self
    }

    pub fn with_max_concurrent_crawls(mut self, crawls: usize) -> Self {
        self.max_concurrent_crawls = crawls;
        self
    }

    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    pub fn with_min_recrawl_age(mut self, age: Duration) -> Self {
        self.min_recrawl_age = age;
        self
    }

    pub fn with_stale_attempt_after(mut self, after: Duration) -> Self {
        self.stale_attempt_after = after;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.crawl.validate()?;
        if self.grace_period_crawls == 0 {
            return Err(MonitorError::Config(
                "grace_period_crawls must be at least 1".into(),
            ));
        }
        if self.max_concurrent_crawls == 0 {
            return Err(MonitorError::Config(
                "max_concurrent_crawls must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
