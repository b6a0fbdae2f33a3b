//! Fetcher implementations and HTML extraction.

#[cfg(feature = "browser")]
pub mod browser;
pub mod extract;
pub mod fallback;
pub mod http;
pub mod robots;

#[cfg(feature = "browser")]
pub use browser::ChromeRenderer;
pub use extract::{extract_content, ExtractedContent};
pub use fallback::FallbackFetcher;
pub use http::HttpFetcher;
pub use robots::RobotsTxt;
