//! Notifier trait: fire-and-forget change notifications.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::NotifyError;
use crate::types::job::JobId;

/// Events worth telling someone about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotifyEvent {
    ContentChanged {
        url: String,
        previous_hash: String,
        new_hash: String,
    },
    CrawlFailed {
        url: String,
        detail: String,
    },
}

/// Side channel for notifications. Failures never fail a crawl attempt.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, job_id: JobId, event: &NotifyEvent) -> Result<(), NotifyError>;
}
