//! Page types - stored pages, freshly extracted pages and crawl outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::job::JobId;
use crate::traits::fetcher::CacheValidators;

/// A crawled page belonging to a job.
///
/// `(job_id, url)` is unique. `missed_cycles` counts consecutive crawl cycles
/// in which the page was not observed; it drives grace-period eviction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub job_id: JobId,

    /// Normalized page URL
    pub url: String,

    pub title: Option<String>,

    /// Meta or OpenGraph description
    pub description: Option<String>,

    /// Extracted readable text
    pub content: String,

    /// SHA-256 of `content`
    pub content_hash: String,

    /// BFS depth at which the page was last observed
    pub depth: usize,

    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub missed_cycles: u32,

    /// Cache validators from the last full response
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,

    /// Same-site links found on the page, followed again when the server
    /// answers "not modified"
    #[serde(default)]
    pub links: Vec<String>,
}

impl Page {
    /// Build a stored page from a fresh observation.
    pub fn observed(job_id: JobId, page: &ExtractedPage, seen_at: DateTime<Utc>) -> Self {
        Self {
            job_id,
            url: page.url.clone(),
            title: page.title.clone(),
            description: page.description.clone(),
            content: page.text.clone(),
            content_hash: hash_content(&page.text),
            depth: page.depth,
            first_seen: seen_at,
            last_seen: seen_at,
            missed_cycles: 0,
            etag: page.etag.clone(),
            last_modified: page.last_modified.clone(),
            links: page.links.clone(),
        }
    }

    pub fn cache_validators(&self) -> CacheValidators {
        CacheValidators {
            etag: self.etag.clone(),
            last_modified: self.last_modified.clone(),
        }
    }
}

/// Calculate the SHA-256 hex digest of a text.
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// A page as produced by one crawl attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedPage {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub text: String,
    pub depth: usize,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    /// Same-site links, normalized
    pub links: Vec<String>,
}

impl ExtractedPage {
    /// Re-observe a stored page the server reported as not modified.
    pub fn unchanged(stored: &Page, depth: usize) -> Self {
        Self {
            url: stored.url.clone(),
            title: stored.title.clone(),
            description: stored.description.clone(),
            text: stored.content.clone(),
            depth,
            etag: stored.etag.clone(),
            last_modified: stored.last_modified.clone(),
            links: stored.links.clone(),
        }
    }
}

/// Serializable classification of a per-page failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    HttpStatus,
    Network,
    Content,
    Robots,
}

/// A URL that was scheduled but produced no page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlFailure {
    pub url: String,
    pub depth: usize,
    pub kind: FailureKind,
    pub detail: String,
}

/// Why traversal ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// No unvisited in-domain links within the depth limit
    FrontierExhausted,
    /// `max_pages` fetches were issued
    PageBudget,
    /// The crawl-wide deadline passed
    Deadline,
}

/// Result of one crawl attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlOutcome {
    /// Successful pages in breadth-first, first-discovered order
    pub pages: Vec<ExtractedPage>,
    pub failures: Vec<CrawlFailure>,
    /// Number of fetches issued (successes and failures)
    pub fetched: usize,
    pub stop_reason: StopReason,
}

impl CrawlOutcome {
    pub fn page_urls(&self) -> impl Iterator<Item = &str> {
        self.pages.iter().map(|p| p.url.as_str())
    }

    pub fn failed_urls(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|f| f.url.as_str())
    }
}
