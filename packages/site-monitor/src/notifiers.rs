//! Notifier implementations.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::info;

use crate::error::{MonitorError, NotifyError, Result};
use crate::traits::notifier::{NotifyEvent, Notifier};
use crate::types::job::JobId;

/// Writes notifications to the tracing log.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, job_id: JobId, event: &NotifyEvent) -> std::result::Result<(), NotifyError> {
        match event {
            NotifyEvent::ContentChanged {
                url,
                previous_hash,
                new_hash,
            } => info!(
                job_id = %job_id,
                url = %url,
                previous_hash = %previous_hash,
                new_hash = %new_hash,
                "Content changed"
            ),
            NotifyEvent::CrawlFailed { url, detail } => {
                info!(job_id = %job_id, url = %url, detail = %detail, "Crawl failed")
            }
        }
        Ok(())
    }
}

/// POSTs each event as JSON to a fixed URL.
///
/// Body: `{"job_id": "...", "event": "content_changed", ...event fields}`.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| MonitorError::Config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn payload(job_id: JobId, event: &NotifyEvent) -> serde_json::Value {
    let mut body = serde_json::to_value(event).unwrap_or_else(|_| json!({}));
    if let Some(map) = body.as_object_mut() {
        map.insert("job_id".to_string(), json!(job_id.to_string()));
    }
    body
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, job_id: JobId, event: &NotifyEvent) -> std::result::Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&payload(job_id, event))
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Delivery(format!(
                "webhook {} answered {}",
                self.url, status
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_payload_shape() {
        let job_id = JobId::new();
        let body = payload(
            job_id,
            &NotifyEvent::ContentChanged {
                url: "https://example.com/".to_string(),
                previous_hash: "old".to_string(),
                new_hash: "new".to_string(),
            },
        );

        assert_eq!(body["event"], "content_changed");
        assert_eq!(body["job_id"], job_id.to_string());
        assert_eq!(body["previous_hash"], "old");
        assert_eq!(body["new_hash"], "new");
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        let event = NotifyEvent::CrawlFailed {
            url: "https://example.com/".to_string(),
            detail: "HTTP 503".to_string(),
        };
        tokio_test::assert_ok!(LogNotifier::new().notify(JobId::new(), &event).await);
    }

    #[tokio::test]
    async fn test_unreachable_webhook_reports_delivery_error() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:9/hook").unwrap();
        let event = NotifyEvent::CrawlFailed {
            url: "https://example.com/".to_string(),
            detail: "HTTP 503".to_string(),
        };
        tokio_test::assert_err!(notifier.notify(JobId::new(), &event).await);
    }
}
