//! Testing utilities including mock implementations.
//!
//! These are useful for exercising the orchestrator and scheduler without
//! real network or AI calls.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use url::Url;

use crate::error::{FetchError, FetchResult, MonitorError, NotifyError, Result};
use crate::links::normalize_url;
use crate::traits::{
    annotator::{Annotation, Annotator},
    fetcher::{CacheValidators, Conditional, FetchedDocument, Fetcher},
    notifier::{NotifyEvent, Notifier},
};
use crate::types::job::JobId;

/// Simple HTML page with a title, one paragraph and the given links.
pub fn link_page(title: &str, links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!("<a href=\"{}\">link</a>", href))
        .collect();
    format!(
        "<html><head><title>{title}</title></head><body>\
         <p>Welcome to the {title} page of this site.</p>\
         <nav>{anchors}</nav></body></html>"
    )
}

#[derive(Clone)]
enum MockResponse {
    Page(String),
    Status(u16),
    Timeout,
}

fn key(url: &str) -> String {
    normalize_url(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}

/// In-memory site graph.
///
/// Unknown URLs answer 404. The site can be edited while a test runs
/// (`set_page`, `remove_page`) to simulate content changes between crawls.
/// Pages given an ETag answer matching conditional requests with
/// "not modified".
#[derive(Default)]
pub struct MockFetcher {
    responses: Arc<RwLock<HashMap<String, MockResponse>>>,
    etags: Arc<RwLock<HashMap<String, String>>>,
    delays: Arc<RwLock<HashMap<String, Duration>>>,
    robots: Arc<RwLock<Option<String>>>,
    fetched: Arc<RwLock<Vec<String>>>,
    not_modified: AtomicUsize,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` at `url`.
    pub fn with_page(self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.set_page(url, html);
        self
    }

    /// Answer `url` with an HTTP error status.
    pub fn with_status(self, url: impl Into<String>, status: u16) -> Self {
        self.responses
            .write()
            .unwrap()
            .insert(key(&url.into()), MockResponse::Status(status));
        self
    }

    /// Fail `url` with a timeout error.
    pub fn with_timeout(self, url: impl Into<String>) -> Self {
        self.responses
            .write()
            .unwrap()
            .insert(key(&url.into()), MockResponse::Timeout);
        self
    }

    /// Sleep before answering `url`.
    pub fn with_delay(self, url: impl Into<String>, delay: Duration) -> Self {
        self.delays.write().unwrap().insert(key(&url.into()), delay);
        self
    }

    pub fn with_etag(self, url: impl Into<String>, etag: impl Into<String>) -> Self {
        self.set_etag(url, etag);
        self
    }

    /// Serve a robots.txt body for every origin.
    pub fn with_robots(self, body: &str) -> Self {
        *self.robots.write().unwrap() = Some(body.to_string());
        self
    }

    pub fn set_page(&self, url: impl Into<String>, html: impl Into<String>) {
        self.responses
            .write()
            .unwrap()
            .insert(key(&url.into()), MockResponse::Page(html.into()));
    }

    pub fn remove_page(&self, url: &str) {
        self.responses.write().unwrap().remove(&key(url));
    }

    pub fn set_etag(&self, url: impl Into<String>, etag: impl Into<String>) {
        self.etags
            .write()
            .unwrap()
            .insert(key(&url.into()), etag.into());
    }

    /// Conditional requests answered with "not modified".
    pub fn not_modified_count(&self) -> usize {
        self.not_modified.load(Ordering::SeqCst)
    }

    /// Every URL passed to `fetch`, in call order.
    pub fn fetched_urls(&self) -> Vec<String> {
        self.fetched.read().unwrap().clone()
    }

    pub fn clear_fetched(&self) {
        self.fetched.write().unwrap().clear();
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &Url) -> FetchResult<FetchedDocument> {
        let key = key(url.as_str());
        self.fetched.write().unwrap().push(key.clone());

        let delay = self.delays.read().unwrap().get(&key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let response = self.responses.read().unwrap().get(&key).cloned();
        match response {
            Some(MockResponse::Page(html)) => Ok(FetchedDocument {
                requested_url: url.clone(),
                final_url: url.clone(),
                html,
                etag: self.etags.read().unwrap().get(&key).cloned(),
                last_modified: None,
            }),
            Some(MockResponse::Status(status)) => Err(FetchError::HttpStatus {
                url: key,
                status,
            }),
            Some(MockResponse::Timeout) => Err(FetchError::Timeout { url: key }),
            None => Err(FetchError::HttpStatus {
                url: key,
                status: 404,
            }),
        }
    }

    async fn fetch_conditional(
        &self,
        url: &Url,
        validators: &CacheValidators,
    ) -> FetchResult<Conditional> {
        let key = key(url.as_str());
        let current = self.etags.read().unwrap().get(&key).cloned();
        let serving = matches!(
            self.responses.read().unwrap().get(&key),
            Some(MockResponse::Page(_))
        );

        if serving && current.is_some() && validators.etag == current {
            self.fetched.write().unwrap().push(key);
            self.not_modified.fetch_add(1, Ordering::SeqCst);
            return Ok(Conditional::NotModified);
        }
        self.fetch(url).await.map(Conditional::Modified)
    }

    async fn robots_txt(&self, _url: &Url) -> Option<String> {
        self.robots.read().unwrap().clone()
    }
}

/// Annotator returning a fixed annotation and recording its inputs.
pub struct MockAnnotator {
    annotation: Arc<RwLock<Annotation>>,
    failures_remaining: AtomicUsize,
    always_fail: Arc<RwLock<bool>>,
    delay: Option<Duration>,
    calls: Arc<RwLock<Vec<String>>>,
}

impl Default for MockAnnotator {
    fn default() -> Self {
        Self {
            annotation: Arc::new(RwLock::new(Annotation {
                category: "Documentation".to_string(),
                summary: "Test summary.".to_string(),
            })),
            failures_remaining: AtomicUsize::new(0),
            always_fail: Arc::new(RwLock::new(false)),
            delay: None,
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl MockAnnotator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_annotation(self, category: &str, summary: &str) -> Self {
        self.set_annotation(category, summary);
        self
    }

    /// Fail the next `count` calls.
    pub fn with_failures(self, count: usize) -> Self {
        self.failures_remaining.store(count, Ordering::SeqCst);
        self
    }

    /// Sleep before answering (to exercise the annotator timeout).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_annotation(&self, category: &str, summary: &str) {
        *self.annotation.write().unwrap() = Annotation {
            category: category.to_string(),
            summary: summary.to_string(),
        };
    }

    /// Fail every call until switched off.
    pub fn set_failing(&self, failing: bool) {
        *self.always_fail.write().unwrap() = failing;
    }

    /// Inputs of every call, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }
}

#[async_trait]
impl Annotator for MockAnnotator {
    async fn annotate(&self, text: &str) -> Result<Annotation> {
        self.calls.write().unwrap().push(text.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted_failure = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted_failure || *self.always_fail.read().unwrap() {
            return Err(MonitorError::Annotator("mock annotator failure".into()));
        }

        Ok(self.annotation.read().unwrap().clone())
    }
}

/// Notifier that keeps every event it receives.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Arc<RwLock<Vec<(JobId, NotifyEvent)>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(JobId, NotifyEvent)> {
        self.events.read().unwrap().clone()
    }

    /// Whether a `ContentChanged` event was recorded for `job_id`.
    pub fn saw_change(&self, job_id: JobId) -> bool {
        self.events
            .read()
            .unwrap()
            .iter()
            .any(|(id, e)| *id == job_id && matches!(e, NotifyEvent::ContentChanged { .. }))
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, job_id: JobId, event: &NotifyEvent) -> std::result::Result<(), NotifyError> {
        self.events.write().unwrap().push((job_id, event.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_fetcher_serves_and_records() {
        let fetcher = MockFetcher::new()
            .with_page("https://example.com", link_page("Home", &["/a"]))
            .with_status("https://example.com/missing", 410);

        let home = Url::parse("https://example.com/").unwrap();
        let doc = fetcher.fetch(&home).await.unwrap();
        assert!(doc.html.contains("<title>Home</title>"));

        let missing = Url::parse("https://example.com/missing").unwrap();
        assert!(matches!(
            fetcher.fetch(&missing).await,
            Err(FetchError::HttpStatus { status: 410, .. })
        ));

        let unknown = Url::parse("https://example.com/nope").unwrap();
        assert!(matches!(
            fetcher.fetch(&unknown).await,
            Err(FetchError::HttpStatus { status: 404, .. })
        ));

        assert_eq!(fetcher.fetched_urls().len(), 3);
    }

    #[tokio::test]
    async fn test_mock_annotator_scripted_failures() {
        let annotator = MockAnnotator::new().with_failures(1);
        assert!(annotator.annotate("a").await.is_err());
        assert!(annotator.annotate("b").await.is_ok());
        assert_eq!(annotator.calls(), vec!["a".to_string(), "b".to_string()]);
    }
}
