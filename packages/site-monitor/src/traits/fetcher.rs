//! Fetcher trait: retrieve one page's HTML.

use async_trait::async_trait;
use url::Url;

use crate::error::FetchResult;

/// A fetched HTML document.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    /// URL that was requested
    pub requested_url: Url,

    /// URL after redirects
    pub final_url: Url,

    pub html: String,

    /// `ETag` response header, kept for the next conditional request
    pub etag: Option<String>,

    /// `Last-Modified` response header
    pub last_modified: Option<String>,
}

/// Validators from an earlier response of the same URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheValidators {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl CacheValidators {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

/// Result of a conditional fetch.
#[derive(Debug, Clone)]
pub enum Conditional {
    Modified(FetchedDocument),
    /// The server confirmed the stored copy is current (HTTP 304)
    NotModified,
}

/// Retrieves single pages. Link and text extraction happen on the returned
/// HTML (see [`crate::fetchers::extract`]).
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch one page.
    async fn fetch(&self, url: &Url) -> FetchResult<FetchedDocument>;

    /// Fetch one page unless it is unchanged since `validators` were issued.
    ///
    /// Fetchers without cache support always return `Modified`.
    async fn fetch_conditional(
        &self,
        url: &Url,
        _validators: &CacheValidators,
    ) -> FetchResult<Conditional> {
        self.fetch(url).await.map(Conditional::Modified)
    }

    /// Fetch the robots.txt body for the origin of `url`.
    ///
    /// `None` means no robots.txt (or unreachable), which allows everything.
    async fn robots_txt(&self, _url: &Url) -> Option<String> {
        None
    }
}
