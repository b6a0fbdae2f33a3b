//! Headless Chrome renderer (feature `browser`).
//!
//! One browser process per renderer; each fetch opens a fresh tab, waits for
//! navigation and reads the rendered DOM.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{FetchError, FetchResult, MonitorError, Result};
use crate::traits::fetcher::{FetchedDocument, Fetcher};

/// Renders pages in headless Chrome.
pub struct ChromeRenderer {
    browser: Browser,
    handler: JoinHandle<()>,
    timeout: Duration,
}

impl ChromeRenderer {
    /// Launch Chrome. `executable` overrides chromiumoxide's own lookup.
    pub async fn launch(
        user_agent: &str,
        timeout: Duration,
        executable: Option<PathBuf>,
    ) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .request_timeout(timeout)
            .arg(format!("--user-agent={}", user_agent))
            .arg("--disable-gpu")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .arg("--no-first-run")
            .arg("--mute-audio");
        if let Some(path) = executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| MonitorError::Config(format!("invalid browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| MonitorError::Config(format!("failed to launch browser: {}", e)))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    // chromiumoxide reports CDP messages it cannot decode; they are harmless
                    trace!(error = %e, "Browser handler error");
                }
            }
            debug!("Browser handler finished");
        });

        info!("Headless browser launched");
        Ok(Self {
            browser,
            handler,
            timeout,
        })
    }

    async fn render(&self, url: &Url) -> std::result::Result<(String, Option<String>), String> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| e.to_string())?;

        let loaded = async {
            page.goto(url.as_str()).await?;
            page.wait_for_navigation().await?;
            let html = page.content().await?;
            let final_url = page.url().await?;
            Ok::<_, chromiumoxide::error::CdpError>((html, final_url))
        }
        .await
        .map_err(|e| e.to_string());

        if let Err(e) = page.close().await {
            debug!(url = %url, error = %e, "Failed to close browser tab");
        }
        loaded
    }
}

impl Drop for ChromeRenderer {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[async_trait]
impl Fetcher for ChromeRenderer {
    async fn fetch(&self, url: &Url) -> FetchResult<FetchedDocument> {
        debug!(url = %url, "Rendering page");

        let (html, final_url) = match tokio::time::timeout(self.timeout, self.render(url)).await {
            Ok(Ok(rendered)) => rendered,
            Ok(Err(message)) => {
                warn!(url = %url, error = %message, "Browser render failed");
                return Err(FetchError::Transport {
                    url: url.to_string(),
                    message,
                });
            }
            Err(_) => {
                return Err(FetchError::Timeout {
                    url: url.to_string(),
                })
            }
        };

        let final_url = final_url
            .and_then(|u| Url::parse(&u).ok())
            .unwrap_or_else(|| url.clone());

        Ok(FetchedDocument {
            requested_url: url.clone(),
            final_url,
            html,
            etag: None,
            last_modified: None,
        })
    }
}
