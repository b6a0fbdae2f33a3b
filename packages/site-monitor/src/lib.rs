//! Crawl-and-Monitor Library
//!
//! Submits website URLs, crawls them breadth-first within fixed bounds,
//! fingerprints the extracted text, turns it into an llms.txt artifact via an
//! AI annotator, and re-crawls monitored sites on a schedule so the artifact
//! is regenerated only when the content actually changed.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use site_monitor::{HttpFetcher, MemoryStore, MonitoringScheduler, OfflineAnnotator, Orchestrator};
//!
//! let orchestrator = Orchestrator::builder(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(HttpFetcher::new(Duration::from_secs(10))?),
//!     Arc::new(OfflineAnnotator::new()),
//! )
//! .build()?;
//!
//! let submission = orchestrator.submit("https://example.com").await?;
//! orchestrator.wait_idle().await;
//! println!("{}", orchestrator.artifact(submission.job.id).await?);
//!
//! let scheduler = MonitoringScheduler::new(orchestrator.clone());
//! scheduler.trigger_sweep().await?;
//! ```
//!
//! # Modules
//!
//! - [`orchestrator`] - Job lifecycle, submission and crawl attempts
//! - [`scheduler`] - Monitoring sweeps
//! - [`crawler`] - Bounded BFS crawl engine
//! - [`detector`] - Fingerprints and grace-period retention
//! - [`artifact`] - llms.txt rendering
//! - [`fetchers`] - HTTP fetching, browser fallback, HTML extraction, robots.txt
//! - [`stores`] - Storage implementations (MemoryStore, SqliteStore)
//! - [`ai`] - Annotator implementations
//! - [`notifiers`] - Notifier implementations
//! - [`security`] - SSRF protection for submitted URLs
//! - [`testing`] - Mock implementations for testing

pub mod ai;
pub mod artifact;
pub mod crawler;
pub mod detector;
pub mod error;
pub mod fetchers;
pub mod links;
pub mod notifiers;
pub mod orchestrator;
pub mod scheduler;
pub mod security;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{FetchError, MonitorError, NotifyError, Result};
pub use traits::{
    annotator::{Annotation, Annotator},
    fetcher::{CacheValidators, Conditional, FetchedDocument, Fetcher},
    notifier::{NotifyEvent, Notifier},
    store::{JobStore, MonitorStore, PageStore},
};
pub use types::{
    config::{CrawlConfig, MonitorConfig},
    job::{Job, JobId, JobStatus, Progress, SubmitDisposition, Submission},
    page::{CrawlFailure, CrawlOutcome, ExtractedPage, FailureKind, Page, StopReason},
    status::{MonitoringStatus, SweepOutcome, SweepReport},
};

pub use ai::{OfflineAnnotator, OpenAiAnnotator, OpenAiConfig};
pub use crawler::{CrawlEngine, CrawlProgress};
pub use fetchers::{FallbackFetcher, HttpFetcher};

#[cfg(feature = "browser")]
pub use fetchers::ChromeRenderer;
pub use links::normalize_url;
pub use notifiers::{LogNotifier, WebhookNotifier};
pub use orchestrator::{AttemptOutcome, Orchestrator, OrchestratorBuilder};
pub use scheduler::MonitoringScheduler;
pub use security::UrlValidator;

pub use stores::MemoryStore;

#[cfg(feature = "sqlite")]
pub use stores::SqliteStore;

// Re-export testing utilities
pub use testing::{MockAnnotator, MockFetcher, RecordingNotifier};
