//! Typed errors for the site monitor library.
//!
//! Uses `thiserror` for library errors (not `anyhow`). Job-level failures are
//! `MonitorError`; per-page failures are `FetchError` and never abort a crawl
//! on their own.

use thiserror::Error;

use crate::types::job::{JobId, JobStatus};

/// Errors surfaced by the orchestrator, scheduler and stores.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Malformed, unsupported or blocked input URL
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The crawl produced zero pages
    #[error("crawl of {url} retrieved no pages: {reason}")]
    CrawlExhausted { url: String, reason: String },

    /// External annotator call failed
    #[error("annotator error: {0}")]
    Annotator(String),

    /// External annotator did not answer in time
    #[error("annotator timed out after {0:?}")]
    AnnotatorTimeout(std::time::Duration),

    /// Storage operation failed
    #[error("persistence error: {0}")]
    Persistence(String),

    /// No job with this identifier
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// Job content is only readable once the job has completed
    #[error("job is not completed (status: {status})")]
    NotCompleted { status: JobStatus },

    /// Status change outside the lifecycle table
    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    /// A crawl attempt holds the job lock
    #[error("job {0} has a crawl attempt in flight")]
    JobBusy(JobId),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),
}

impl MonitorError {
    pub(crate) fn invalid_url(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn persistence(e: impl ToString) -> Self {
        Self::Persistence(e.to_string())
    }
}

/// Errors that can occur while fetching a single page.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Request exceeded the per-request timeout
    #[error("timeout fetching {url}")]
    Timeout { url: String },

    /// Non-success HTTP status
    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    /// Connection, TLS or body read failure
    #[error("transport error for {url}: {message}")]
    Transport { url: String, message: String },

    /// Response is not an HTML document
    #[error("{url} is not HTML ({content_type})")]
    NotHtml { url: String, content_type: String },

    /// Response body over the size limit
    #[error("{url} is too large ({bytes} bytes)")]
    TooLarge { url: String, bytes: u64 },

    /// robots.txt disallows this path
    #[error("robots.txt disallows: {url}")]
    Disallowed { url: String },
}

/// Errors from notification delivery. Logged, never propagated into a crawl.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Result type alias for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Result type alias for page fetches.
pub type FetchResult<T> = std::result::Result<T, FetchError>;
