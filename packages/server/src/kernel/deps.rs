//! Server dependencies
//!
//! Builds the orchestrator and monitoring scheduler from [`Config`]. External
//! services are picked here: OpenAI when an API key is configured, the
//! offline heuristic annotator otherwise; a webhook notifier when a URL is
//! configured, log output otherwise. With `BROWSER_FALLBACK` set (and the
//! `browser` feature built in) failed plain fetches are rendered in headless
//! Chrome.

use anyhow::{Context, Result};
use site_monitor::{
    Annotator, FallbackFetcher, HttpFetcher, LogNotifier, MonitoringScheduler, Notifier, OfflineAnnotator,
    OpenAiAnnotator, OpenAiConfig, Orchestrator, SqliteStore, UrlValidator, WebhookNotifier,
};
use std::sync::Arc;

use crate::config::Config;

pub type AppFetcher = FallbackFetcher<HttpFetcher>;
pub type AppOrchestrator = Orchestrator<SqliteStore, AppFetcher>;
pub type AppScheduler = MonitoringScheduler<SqliteStore, AppFetcher>;

/// Everything the CLI commands and scheduled tasks need.
#[derive(Clone)]
pub struct ServerDeps {
    pub orchestrator: AppOrchestrator,
    pub scheduler: Arc<AppScheduler>,
}

impl ServerDeps {
    pub async fn build(config: &Config) -> Result<Self> {
        tracing::info!("Connecting to database...");
        let store = if config.database_url == "sqlite::memory:" {
            SqliteStore::in_memory().await
        } else {
            SqliteStore::new(&config.database_url).await
        }
        .context("Failed to connect to database")?;
        tracing::info!("Database connected");

        let validator = config
            .allowed_hosts
            .iter()
            .fold(UrlValidator::new(), |v, host| v.allow_host(host));
        let fetcher = build_fetcher(config, &validator).await?;

        let orchestrator = Orchestrator::builder(
            Arc::new(store),
            Arc::new(fetcher),
            build_annotator(config)?,
        )
        .with_config(config.monitor.clone())
        .with_notifier(build_notifier(config)?)
        .with_url_validator(validator)
        .build()
        .context("Invalid monitor configuration")?;

        let scheduler = Arc::new(MonitoringScheduler::new(orchestrator.clone()));
        Ok(Self {
            orchestrator,
            scheduler,
        })
    }
}

async fn build_fetcher(config: &Config, validator: &UrlValidator) -> Result<AppFetcher> {
    let crawl = &config.monitor.crawl;
    let http = HttpFetcher::with_user_agent(&crawl.user_agent, crawl.request_timeout)
        .and_then(|f| f.with_url_validator(validator.clone()))
        .context("Failed to create HTTP fetcher")?;
    let fetcher = FallbackFetcher::new(http);

    if !config.browser_fallback {
        return Ok(fetcher);
    }
    attach_renderer(fetcher, config).await
}

#[cfg(feature = "browser")]
async fn attach_renderer(fetcher: AppFetcher, config: &Config) -> Result<AppFetcher> {
    let crawl = &config.monitor.crawl;
    let renderer = site_monitor::ChromeRenderer::launch(
        &crawl.user_agent,
        crawl.request_timeout,
        config.chromium_path.clone().map(std::path::PathBuf::from),
    )
    .await
    .context("Failed to launch headless browser")?;
    tracing::info!("Browser fallback enabled");
    Ok(fetcher.with_renderer(Arc::new(renderer)))
}

#[cfg(not(feature = "browser"))]
async fn attach_renderer(fetcher: AppFetcher, _config: &Config) -> Result<AppFetcher> {
    tracing::warn!("BROWSER_FALLBACK is set but this build lacks the `browser` feature");
    Ok(fetcher)
}

fn build_annotator(config: &Config) -> Result<Arc<dyn Annotator>> {
    match &config.openai_api_key {
        Some(key) => {
            let mut openai = OpenAiConfig::new(key.clone());
            if let Some(model) = &config.openai_model {
                openai = openai.with_model(model.clone());
            }
            let annotator =
                OpenAiAnnotator::new(openai).context("Failed to create OpenAI annotator")?;
            tracing::info!(model = annotator.model(), "Using OpenAI annotator");
            Ok(Arc::new(annotator))
        }
        None => {
            tracing::warn!("OPENAI_API_KEY not set; using offline annotator");
            Ok(Arc::new(OfflineAnnotator::new()))
        }
    }
}

fn build_notifier(config: &Config) -> Result<Arc<dyn Notifier>> {
    match &config.notify_webhook_url {
        Some(url) => {
            let notifier =
                WebhookNotifier::new(url.clone()).context("Failed to create webhook notifier")?;
            tracing::info!(url = %notifier.url(), "Sending change notifications to webhook");
            Ok(Arc::new(notifier))
        }
        None => Ok(Arc::new(LogNotifier::new())),
    }
}
