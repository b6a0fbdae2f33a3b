//! Bounded breadth-first crawl engine.
//!
//! # Algorithm
//!
//! ```text
//! frontier = [seed]                       visited = {seed}
//! for depth in 0..=max_depth:
//!     batch = frontier truncated to (max_pages - fetched)
//!     fetch batch concurrently (≤ max_concurrent_fetches, one at a time per host)
//!     for each success, in frontier order:
//!         keep page; if depth < max_depth, enqueue unseen same-site links
//! ```
//!
//! An incremental crawl sends the stored cache validators of known pages. A
//! "not modified" answer counts as a fetch and reuses the stored text and
//! links.
//!
//! Per-page failures are collected, never raised, unless the crawl ends with
//! zero pages.

pub mod throttle;

use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{FetchError, MonitorError, Result};
use crate::fetchers::{extract_content, RobotsTxt};
use crate::links::{normalize_url, same_site};
use crate::traits::fetcher::{Conditional, FetchedDocument, Fetcher};
use crate::types::config::CrawlConfig;
use crate::types::page::{
    CrawlFailure, CrawlOutcome, ExtractedPage, FailureKind, Page, StopReason,
};

pub use throttle::HostThrottle;

/// Progress snapshot emitted after every completed fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlProgress {
    /// Fetches completed so far (successes and failures)
    pub visited: usize,
    pub max_pages: usize,
    pub depth: usize,
}

enum Fetched {
    Document(FetchedDocument),
    NotModified,
    Failed(FetchError),
    /// Not attempted because the crawl deadline passed
    Skipped,
}

/// Drives a [`Fetcher`] across a site.
///
/// The engine owns the per-host throttle, so concurrent crawls of the same
/// host through one engine are serialized too.
pub struct CrawlEngine<F: Fetcher> {
    fetcher: Arc<F>,
    throttle: HostThrottle,
}

impl<F: Fetcher> CrawlEngine<F> {
    pub fn new(fetcher: Arc<F>) -> Self {
        Self {
            fetcher,
            throttle: HostThrottle::new(),
        }
    }

    pub fn fetcher(&self) -> &Arc<F> {
        &self.fetcher
    }

    /// Crawl from `seed` within the limits of `config`.
    ///
    /// Returns `CrawlExhausted` when the seed is unreachable or no page at all
    /// could be retrieved.
    pub async fn crawl(
        &self,
        seed: &Url,
        config: &CrawlConfig,
        on_progress: &(dyn Fn(CrawlProgress) + Send + Sync),
    ) -> Result<CrawlOutcome> {
        self.crawl_incremental(seed, config, &[], on_progress).await
    }

    /// Crawl like [`crawl`](Self::crawl), revalidating `previous` pages
    /// with conditional requests.
    pub async fn crawl_incremental(
        &self,
        seed: &Url,
        config: &CrawlConfig,
        previous: &[Page],
        on_progress: &(dyn Fn(CrawlProgress) + Send + Sync),
    ) -> Result<CrawlOutcome> {
        config.validate()?;
        let seed = normalize_url(seed.as_str())?;
        let deadline = Instant::now() + config.max_duration;

        let robots = if config.respect_robots_txt {
            self.fetcher
                .robots_txt(&seed)
                .await
                .map(|body| RobotsTxt::parse(&body))
        } else {
            None
        };
        let delay = robots
            .as_ref()
            .and_then(|r| r.crawl_delay(&config.user_agent))
            .map_or(config.request_delay, |d| d.max(config.request_delay));

        let mut visited: HashSet<String> = HashSet::from([seed.as_str().to_string()]);
        let mut frontier = vec![seed.clone()];
        let mut pages: Vec<ExtractedPage> = Vec::new();
        let mut failures: Vec<CrawlFailure> = Vec::new();
        let mut fetched = 0usize;
        let mut depth = 0usize;
        let mut stop_reason = StopReason::FrontierExhausted;
        let completed = AtomicUsize::new(0);
        let previous: HashMap<&str, &Page> =
            previous.iter().map(|p| (p.url.as_str(), p)).collect();

        info!(
            seed = %seed,
            max_depth = config.max_depth,
            max_pages = config.max_pages,
            "Starting crawl"
        );

        while !frontier.is_empty() {
            if Instant::now() >= deadline {
                stop_reason = StopReason::Deadline;
                break;
            }

            let mut batch = Vec::with_capacity(frontier.len());
            let mut budget_hit = false;
            for url in frontier.drain(..) {
                if let Some(robots) = &robots {
                    if !robots.is_allowed(&config.user_agent, &path_and_query(&url)) {
                        debug!(url = %url, "Skipping URL disallowed by robots.txt");
                        failures.push(CrawlFailure {
                            url: url.to_string(),
                            depth,
                            kind: FailureKind::Robots,
                            detail: FetchError::Disallowed {
                                url: url.to_string(),
                            }
                            .to_string(),
                        });
                        continue;
                    }
                }
                if fetched + batch.len() >= config.max_pages {
                    budget_hit = true;
                    break;
                }
                batch.push(url);
            }

            let completed = &completed;
            let previous = &previous;
            let results: Vec<(Url, Fetched)> = stream::iter(batch)
                .map(|url| async move {
                    let stored = previous.get(url.as_str()).copied();
                    let result = self.fetch_one(&url, stored, config, delay, deadline).await;
                    if !matches!(result, Fetched::Skipped) {
                        on_progress(CrawlProgress {
                            visited: completed.fetch_add(1, Ordering::SeqCst) + 1,
                            max_pages: config.max_pages,
                            depth,
                        });
                    }
                    (url, result)
                })
                .buffered(config.max_concurrent_fetches)
                .collect()
                .await;

            let mut next = Vec::new();
            for (url, result) in results {
                let (page, links) = match result {
                    Fetched::Document(document) => {
                        fetched += 1;
                        if !same_site(&seed, &document.final_url) {
                            failures.push(CrawlFailure {
                                url: url.to_string(),
                                depth,
                                kind: FailureKind::Content,
                                detail: format!("redirected off-site to {}", document.final_url),
                            });
                            continue;
                        }
                        if let Ok(final_url) = normalize_url(document.final_url.as_str()) {
                            visited.insert(final_url.as_str().to_string());
                        }

                        let content = extract_content(
                            &document.final_url,
                            &document.html,
                            config.max_paragraphs,
                        );
                        let links: Vec<Url> = content
                            .links
                            .iter()
                            .filter(|link| same_site(&seed, link))
                            .cloned()
                            .collect();
                        debug!(url = %url, depth, paragraphs = content.paragraphs.len(), "Page extracted");

                        let page = ExtractedPage {
                            url: url.to_string(),
                            title: content.title.clone(),
                            description: content.description.clone(),
                            text: content.text(),
                            depth,
                            etag: document.etag,
                            last_modified: document.last_modified,
                            links: links.iter().map(|l| l.to_string()).collect(),
                        };
                        (page, links)
                    }
                    Fetched::NotModified => {
                        fetched += 1;
                        let Some(stored) = previous.get(url.as_str()) else {
                            continue;
                        };
                        debug!(url = %url, depth, "Page not modified; reusing stored content");
                        let links = stored
                            .links
                            .iter()
                            .filter_map(|l| Url::parse(l).ok())
                            .filter(|l| same_site(&seed, l))
                            .collect();
                        (ExtractedPage::unchanged(stored, depth), links)
                    }
                    Fetched::Failed(error) => {
                        fetched += 1;
                        warn!(url = %url, depth, error = %error, "Page fetch failed");
                        failures.push(CrawlFailure {
                            url: url.to_string(),
                            depth,
                            kind: failure_kind(&error),
                            detail: error.to_string(),
                        });
                        continue;
                    }
                    Fetched::Skipped => {
                        stop_reason = StopReason::Deadline;
                        continue;
                    }
                };

                if depth < config.max_depth {
                    for link in links {
                        if visited.insert(link.as_str().to_string()) {
                            next.push(link);
                        }
                    }
                }
                pages.push(page);
            }

            if depth == 0 && pages.is_empty() {
                let reason = failures
                    .first()
                    .map(|f| f.detail.clone())
                    .unwrap_or_else(|| "seed URL unreachable".to_string());
                warn!(seed = %seed, reason = %reason, "Seed URL unreachable");
                return Err(MonitorError::CrawlExhausted {
                    url: seed.to_string(),
                    reason,
                });
            }

            if stop_reason == StopReason::Deadline {
                break;
            }
            if budget_hit {
                stop_reason = StopReason::PageBudget;
                break;
            }

            frontier = next;
            depth += 1;
        }

        if pages.is_empty() {
            return Err(MonitorError::CrawlExhausted {
                url: seed.to_string(),
                reason: format!("{} failed fetches", failures.len()),
            });
        }

        info!(
            seed = %seed,
            pages = pages.len(),
            failures = failures.len(),
            fetched,
            stop_reason = ?stop_reason,
            "Crawl finished"
        );

        Ok(CrawlOutcome {
            pages,
            failures,
            fetched,
            stop_reason,
        })
    }

    async fn fetch_one(
        &self,
        url: &Url,
        stored: Option<&Page>,
        config: &CrawlConfig,
        delay: std::time::Duration,
        deadline: Instant,
    ) -> Fetched {
        let host = url.host_str().unwrap_or_default();
        let _permit = self.throttle.acquire(host, delay).await;

        if Instant::now() >= deadline {
            return Fetched::Skipped;
        }

        let validators = stored
            .map(Page::cache_validators)
            .filter(|v| !v.is_empty())
            .unwrap_or_default();
        let request = async {
            if validators.is_empty() {
                self.fetcher.fetch(url).await.map(Conditional::Modified)
            } else {
                self.fetcher.fetch_conditional(url, &validators).await
            }
        };

        match tokio::time::timeout(config.request_timeout, request).await {
            Ok(Ok(Conditional::Modified(document))) => Fetched::Document(document),
            Ok(Ok(Conditional::NotModified)) => Fetched::NotModified,
            Ok(Err(error)) => Fetched::Failed(error),
            Err(_) => Fetched::Failed(FetchError::Timeout {
                url: url.to_string(),
            }),
        }
    }
}

fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

fn failure_kind(error: &FetchError) -> FailureKind {
    match error {
        FetchError::Timeout { .. } => FailureKind::Timeout,
        FetchError::HttpStatus { .. } => FailureKind::HttpStatus,
        FetchError::Transport { .. } => FailureKind::Network,
        FetchError::NotHtml { .. } | FetchError::TooLarge { .. } => FailureKind::Content,
        FetchError::Disallowed { .. } => FailureKind::Robots,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{link_page, MockFetcher};
    use crate::types::job::JobId;
    use chrono::Utc;
    use std::sync::Mutex;
    use std::time::Duration;

    fn config() -> CrawlConfig {
        CrawlConfig::default()
            .with_request_delay(Duration::ZERO)
            .with_robots_txt(false)
    }

    fn seed() -> Url {
        Url::parse("https://example.com/").unwrap()
    }

    fn no_progress(_: CrawlProgress) {}

    #[tokio::test]
    async fn test_homepage_with_ten_links_respects_page_budget() {
        let links: Vec<String> = (1..=10).map(|i| format!("/page-{}", i)).collect();
        let mut fetcher = MockFetcher::new().with_page(
            "https://example.com/",
            link_page("Home", &links.iter().map(String::as_str).collect::<Vec<_>>()),
        );
        for link in &links {
            fetcher = fetcher.with_page(format!("https://example.com{}", link), link_page(link, &[]));
        }
        let fetcher = Arc::new(fetcher);
        let engine = CrawlEngine::new(fetcher.clone());

        let outcome = engine
            .crawl(&seed(), &config().with_max_depth(1).with_max_pages(5), &no_progress)
            .await
            .unwrap();

        let urls: Vec<&str> = outcome.page_urls().collect();
        assert_eq!(
            urls,
            vec![
                "https://example.com/",
                "https://example.com/page-1",
                "https://example.com/page-2",
                "https://example.com/page-3",
                "https://example.com/page-4",
            ]
        );
        assert_eq!(outcome.stop_reason, StopReason::PageBudget);
        assert_eq!(fetcher.fetched_urls().len(), 5);
    }

    #[tokio::test]
    async fn test_cycles_and_duplicates_are_fetched_once() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .with_page("https://example.com/", link_page("Home", &["/a", "/b", "/a/"]))
                .with_page("https://example.com/a", link_page("A", &["/", "/b", "/c"]))
                .with_page("https://example.com/b", link_page("B", &["/a", "/c"]))
                .with_page("https://example.com/c", link_page("C", &["/", "/a"])),
        );
        let engine = CrawlEngine::new(fetcher.clone());

        let outcome = engine
            .crawl(&seed(), &config().with_max_depth(5), &no_progress)
            .await
            .unwrap();

        assert_eq!(outcome.pages.len(), 4);
        assert_eq!(outcome.stop_reason, StopReason::FrontierExhausted);
        let mut fetched = fetcher.fetched_urls();
        fetched.sort();
        fetched.dedup();
        assert_eq!(fetched.len(), fetcher.fetched_urls().len());
    }

    #[tokio::test]
    async fn test_depth_limit() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .with_page("https://example.com/", link_page("Home", &["/one"]))
                .with_page("https://example.com/one", link_page("One", &["/two"]))
                .with_page("https://example.com/two", link_page("Two", &["/three"])),
        );
        let engine = CrawlEngine::new(fetcher.clone());

        let outcome = engine
            .crawl(&seed(), &config().with_max_depth(1), &no_progress)
            .await
            .unwrap();

        assert_eq!(outcome.page_urls().collect::<Vec<_>>(), vec![
            "https://example.com/",
            "https://example.com/one",
        ]);
        assert!(outcome.pages.iter().all(|p| p.depth <= 1));
    }

    #[tokio::test]
    async fn test_off_site_links_are_not_followed() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .with_page(
                    "https://example.com/",
                    link_page("Home", &["https://blog.example.com/post", "https://other.org/"]),
                )
                .with_page("https://blog.example.com/post", link_page("Post", &[])),
        );
        let engine = CrawlEngine::new(fetcher.clone());

        let outcome = engine.crawl(&seed(), &config(), &no_progress).await.unwrap();

        assert_eq!(outcome.pages.len(), 2);
        assert!(!fetcher.fetched_urls().iter().any(|u| u.contains("other.org")));
    }

    #[tokio::test]
    async fn test_failures_are_recorded_not_raised() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .with_page("https://example.com/", link_page("Home", &["/ok", "/slow", "/gone"]))
                .with_page("https://example.com/ok", link_page("Ok", &[]))
                .with_timeout("https://example.com/slow")
                .with_status("https://example.com/gone", 404),
        );
        let engine = CrawlEngine::new(fetcher);

        let outcome = engine.crawl(&seed(), &config(), &no_progress).await.unwrap();

        assert_eq!(outcome.pages.len(), 2);
        assert_eq!(outcome.failures.len(), 2);
        assert_eq!(outcome.fetched, 4);
        let slow = outcome
            .failures
            .iter()
            .find(|f| f.url == "https://example.com/slow")
            .unwrap();
        assert_eq!(slow.kind, FailureKind::Timeout);
        assert!(outcome.failed_urls().any(|u| u == "https://example.com/gone"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout_bounds_slow_fetches() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .with_page("https://example.com/", link_page("Home", &["/hang"]))
                .with_page("https://example.com/hang", link_page("Hang", &[]))
                .with_delay("https://example.com/hang", Duration::from_secs(120)),
        );
        let engine = CrawlEngine::new(fetcher);
        let config = config().with_request_timeout(Duration::from_secs(1));

        let outcome = engine.crawl(&seed(), &config, &no_progress).await.unwrap();

        assert_eq!(outcome.pages.len(), 1);
        assert_eq!(outcome.failures[0].kind, FailureKind::Timeout);
    }

    #[tokio::test]
    async fn test_unreachable_seed_is_exhausted() {
        let fetcher = Arc::new(MockFetcher::new().with_status("https://example.com/", 503));
        let engine = CrawlEngine::new(fetcher);

        let err = engine.crawl(&seed(), &config(), &no_progress).await.unwrap_err();

        assert!(matches!(err, MonitorError::CrawlExhausted { .. }));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_robots_txt_disallow_is_honored() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .with_robots("User-agent: *\nDisallow: /private\n")
                .with_page("https://example.com/", link_page("Home", &["/private/a", "/public"]))
                .with_page("https://example.com/private/a", link_page("Secret", &[]))
                .with_page("https://example.com/public", link_page("Public", &[])),
        );
        let engine = CrawlEngine::new(fetcher.clone());

        let outcome = engine
            .crawl(&seed(), &config().with_robots_txt(true), &no_progress)
            .await
            .unwrap();

        assert_eq!(outcome.pages.len(), 2);
        assert_eq!(outcome.failures[0].kind, FailureKind::Robots);
        assert!(!fetcher
            .fetched_urls()
            .contains(&"https://example.com/private/a".to_string()));
    }

    #[tokio::test]
    async fn test_progress_is_reported_per_fetch() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .with_page("https://example.com/", link_page("Home", &["/a", "/b"]))
                .with_page("https://example.com/a", link_page("A", &[]))
                .with_page("https://example.com/b", link_page("B", &[])),
        );
        let engine = CrawlEngine::new(fetcher);
        let seen = Mutex::new(Vec::new());
        let record = |p: CrawlProgress| seen.lock().unwrap().push(p.visited);

        engine.crawl(&seed(), &config(), &record).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_incremental_crawl_revalidates_known_pages() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .with_page("https://example.com/", link_page("Home", &["/a"]))
                .with_etag("https://example.com/", "\"home-v1\"")
                .with_page("https://example.com/a", link_page("A", &[])),
        );
        let engine = CrawlEngine::new(fetcher.clone());

        let first = engine.crawl(&seed(), &config(), &no_progress).await.unwrap();
        assert_eq!(first.pages[0].etag.as_deref(), Some("\"home-v1\""));
        assert_eq!(first.pages[0].links, vec!["https://example.com/a".to_string()]);

        let stored: Vec<Page> = first
            .pages
            .iter()
            .map(|p| Page::observed(JobId::new(), p, Utc::now()))
            .collect();
        let second = engine
            .crawl_incremental(&seed(), &config(), &stored, &no_progress)
            .await
            .unwrap();

        // the home page answered 304, and its stored links were still followed
        assert_eq!(fetcher.not_modified_count(), 1);
        assert_eq!(second.fetched, 2);
        assert_eq!(
            second.page_urls().collect::<Vec<_>>(),
            first.page_urls().collect::<Vec<_>>()
        );
        assert_eq!(second.pages[0].text, first.pages[0].text);

        fetcher.set_page("https://example.com/", link_page("Home v2", &["/a"]));
        fetcher.set_etag("https://example.com/", "\"home-v2\"");
        let third = engine
            .crawl_incremental(&seed(), &config(), &stored, &no_progress)
            .await
            .unwrap();

        assert_eq!(fetcher.not_modified_count(), 1);
        assert_eq!(third.pages[0].title.as_deref(), Some("Home v2"));
        assert_eq!(third.pages[0].etag.as_deref(), Some("\"home-v2\""));
    }
}
