//! Plain HTTP first, a rendering fetcher when that fails.
//!
//! Sites that block non-browser clients or only work with JavaScript fail the
//! plain request (403, 5xx, timeouts, resets). Those fetches are retried
//! through the renderer, usually a headless browser. Answers that a browser
//! would get too (404, 410, non-HTML, oversized, robots) are not retried.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use crate::error::{FetchError, FetchResult};
use crate::traits::fetcher::{CacheValidators, Conditional, FetchedDocument, Fetcher};

/// Wraps a primary fetcher with an optional renderer.
pub struct FallbackFetcher<P> {
    primary: P,
    renderer: Option<Arc<dyn Fetcher>>,
}

impl<P: Fetcher> FallbackFetcher<P> {
    /// No renderer: behaves exactly like `primary`.
    pub fn new(primary: P) -> Self {
        Self {
            primary,
            renderer: None,
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn Fetcher>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn has_renderer(&self) -> bool {
        self.renderer.is_some()
    }

    pub fn primary(&self) -> &P {
        &self.primary
    }

    async fn render(&self, url: &Url, error: FetchError) -> FetchResult<FetchedDocument> {
        match &self.renderer {
            Some(renderer) if should_render(&error) => {
                info!(url = %url, error = %error, "Plain fetch failed; rendering in browser");
                renderer.fetch(url).await.map_err(|render_error| {
                    debug!(url = %url, error = %render_error, "Rendering failed too");
                    render_error
                })
            }
            _ => Err(error),
        }
    }
}

/// Failures a real browser has a chance of getting past.
pub fn should_render(error: &FetchError) -> bool {
    match error {
        FetchError::Timeout { .. } | FetchError::Transport { .. } => true,
        FetchError::HttpStatus { status, .. } => !matches!(status, 304 | 404 | 410),
        FetchError::NotHtml { .. } | FetchError::TooLarge { .. } | FetchError::Disallowed { .. } => {
            false
        }
    }
}

#[async_trait]
impl<P: Fetcher> Fetcher for FallbackFetcher<P> {
    async fn fetch(&self, url: &Url) -> FetchResult<FetchedDocument> {
        match self.primary.fetch(url).await {
            Ok(document) => Ok(document),
            Err(error) => self.render(url, error).await,
        }
    }

    async fn fetch_conditional(
        &self,
        url: &Url,
        validators: &CacheValidators,
    ) -> FetchResult<Conditional> {
        match self.primary.fetch_conditional(url, validators).await {
            Ok(result) => Ok(result),
            Err(error) => self.render(url, error).await.map(Conditional::Modified),
        }
    }

    async fn robots_txt(&self, url: &Url) -> Option<String> {
        self.primary.robots_txt(url).await
    }
}
