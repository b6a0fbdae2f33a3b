//! HTTP fetcher backed by reqwest.
//!
//! Static HTML only; pages that need JavaScript go through
//! [`FallbackFetcher`](super::FallbackFetcher).

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::error::{FetchError, FetchResult, MonitorError, Result};
use crate::security::UrlValidator;
use crate::traits::fetcher::{CacheValidators, Conditional, FetchedDocument, Fetcher};
use crate::types::config::DEFAULT_USER_AGENT;

/// Bodies larger than this are rejected.
pub const MAX_BODY_BYTES: u64 = 10 * 1024 * 1024;

pub const MAX_REDIRECTS: usize = 5;

/// Fetches pages over HTTP(S), following up to five redirects.
///
/// Every redirect hop is checked against a [`UrlValidator`], so a public
/// page cannot bounce the crawler onto an internal address.
pub struct HttpFetcher {
    client: reqwest::Client,
    user_agent: String,
    timeout: Duration,
    max_body_bytes: u64,
}

impl HttpFetcher {
    /// Create a fetcher with the default browser-like user agent.
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_user_agent(DEFAULT_USER_AGENT, timeout)
    }

    pub fn with_user_agent(user_agent: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(user_agent, timeout, UrlValidator::new())?,
            user_agent: user_agent.to_string(),
            timeout,
            max_body_bytes: MAX_BODY_BYTES,
        })
    }

    /// Check redirect targets with `validator` instead of the default rules.
    pub fn with_url_validator(mut self, validator: UrlValidator) -> Result<Self> {
        self.client = build_client(&self.user_agent, self.timeout, validator)?;
        Ok(self)
    }

    /// Set a custom HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_max_body_bytes(mut self, bytes: u64) -> Self {
        self.max_body_bytes = bytes;
        self
    }

    fn transport_error(url: &Url, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            return FetchError::Timeout {
                url: url.to_string(),
            };
        }
        // the redirect policy's reason sits in the source chain
        let mut message = e.to_string();
        let mut source = std::error::Error::source(&e);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        FetchError::Transport {
            url: url.to_string(),
            message,
        }
    }

    async fn get(&self, url: &Url, validators: &CacheValidators) -> FetchResult<Conditional> {
        debug!(url = %url, conditional = !validators.is_empty(), "HTTP fetch starting");

        let mut request = self.client.get(url.clone());
        if let Some(etag) = &validators.etag {
            request = request.header(header::IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = &validators.last_modified {
            request = request.header(header::IF_MODIFIED_SINCE, last_modified);
        }

        let mut response = request
            .send()
            .await
            .map_err(|e| Self::transport_error(url, e))?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED && !validators.is_empty() {
            debug!(url = %url, "Not modified");
            return Ok(Conditional::NotModified);
        }
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        // Servers that omit Content-Type still get parsed
        if let Some(content_type) = header_value(response.headers(), header::CONTENT_TYPE) {
            if !is_html(&content_type) {
                return Err(FetchError::NotHtml {
                    url: url.to_string(),
                    content_type,
                });
            }
        }

        if let Some(length) = response.content_length() {
            if length > self.max_body_bytes {
                return Err(FetchError::TooLarge {
                    url: url.to_string(),
                    bytes: length,
                });
            }
        }

        let final_url = response.url().clone();
        let etag = header_value(response.headers(), header::ETAG);
        let last_modified = header_value(response.headers(), header::LAST_MODIFIED);

        // Content-Length may be absent or wrong; count what actually arrives
        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Self::transport_error(url, e))?
        {
            let received = (body.len() + chunk.len()) as u64;
            if received > self.max_body_bytes {
                return Err(FetchError::TooLarge {
                    url: url.to_string(),
                    bytes: received,
                });
            }
            body.extend_from_slice(&chunk);
        }

        debug!(url = %url, final_url = %final_url, bytes = body.len(), "HTTP fetch complete");

        Ok(Conditional::Modified(FetchedDocument {
            requested_url: url.clone(),
            final_url,
            html: String::from_utf8_lossy(&body).into_owned(),
            etag,
            last_modified,
        }))
    }
}

fn build_client(
    user_agent: &str,
    timeout: Duration,
    validator: UrlValidator,
) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .default_headers(headers)
        .redirect(redirect_policy(validator))
        .build()
        .map_err(|e| MonitorError::Config(format!("failed to create HTTP client: {}", e)))
}

fn redirect_policy(validator: UrlValidator) -> reqwest::redirect::Policy {
    reqwest::redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error(format!("more than {} redirects", MAX_REDIRECTS));
        }
        let verdict = validator.validate(attempt.url().as_str(), attempt.url());
        match verdict {
            Ok(()) => attempt.follow(),
            Err(e) => {
                warn!(to = %attempt.url(), error = %e, "Refusing redirect");
                attempt.error(e)
            }
        }
    })
}

fn header_value(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn is_html(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    mime == "text/html" || mime == "application/xhtml+xml"
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> FetchResult<FetchedDocument> {
        match self.get(url, &CacheValidators::default()).await? {
            Conditional::Modified(document) => Ok(document),
            Conditional::NotModified => Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: StatusCode::NOT_MODIFIED.as_u16(),
            }),
        }
    }

    async fn fetch_conditional(
        &self,
        url: &Url,
        validators: &CacheValidators,
    ) -> FetchResult<Conditional> {
        self.get(url, validators).await
    }

    async fn robots_txt(&self, url: &Url) -> Option<String> {
        let robots_url = url.join("/robots.txt").ok()?;

        match self
            .client
            .get(robots_url.clone())
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response.text().await.ok(),
            Ok(response) => {
                debug!(url = %robots_url, status = %response.status(), "No robots.txt");
                None
            }
            Err(e) => {
                warn!(url = %robots_url, error = %e, "Could not read robots.txt");
                None
            }
        }
    }
}
