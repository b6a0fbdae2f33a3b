use anyhow::{Context, Result};
use dotenvy::dotenv;
use site_monitor::{CrawlConfig, MonitorConfig};
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://site_monitor.db?mode=rwc";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub openai_api_key: Option<String>,
    pub openai_model: Option<String>,
    pub notify_webhook_url: Option<String>,
    /// Hosts exempt from the private-address checks on submission
    pub allowed_hosts: Vec<String>,
    /// Render pages in headless Chrome when a plain fetch is refused
    pub browser_fallback: bool,
    pub chromium_path: Option<String>,
    pub monitor: MonitorConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup. Unset keys fall back to the
    /// library defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = MonitorConfig::default();
        let crawl_defaults = &defaults.crawl;

        let mut crawl = CrawlConfig::default()
            .with_max_pages(parse_or(&lookup, "CRAWL_MAX_PAGES", crawl_defaults.max_pages)?)
            .with_max_depth(parse_or(&lookup, "CRAWL_MAX_DEPTH", crawl_defaults.max_depth)?)
            .with_max_paragraphs(parse_or(
                &lookup,
                "CRAWL_MAX_PARAGRAPHS",
                crawl_defaults.max_paragraphs,
            )?)
            .with_request_timeout(secs_or(
                &lookup,
                "CRAWL_REQUEST_TIMEOUT_SECS",
                crawl_defaults.request_timeout,
            )?)
            .with_request_delay(secs_or(&lookup, "CRAWL_DELAY_SECS", crawl_defaults.request_delay)?)
            .with_max_duration(secs_or(
                &lookup,
                "CRAWL_MAX_DURATION_SECS",
                crawl_defaults.max_duration,
            )?)
            .with_max_concurrent_fetches(parse_or(
                &lookup,
                "CRAWL_CONCURRENCY",
                crawl_defaults.max_concurrent_fetches,
            )?);
        if let Some(user_agent) = non_empty(&lookup, "USER_AGENT") {
            crawl = crawl.with_user_agent(user_agent);
        }

        let monitor = MonitorConfig::default()
            .with_crawl(crawl)
            .with_grace_period(parse_or(
                &lookup,
                "GRACE_PERIOD_CRAWLS",
                defaults.grace_period_crawls,
            )?)
            .with_max_concurrent_crawls(parse_or(
                &lookup,
                "MAX_CONCURRENT_CRAWLS",
                defaults.max_concurrent_crawls,
            )?)
            .with_monitor_interval(hours_or(
                &lookup,
                "MONITOR_INTERVAL_HOURS",
                defaults.monitor_interval,
            )?)
            .with_min_recrawl_age(hours_or(
                &lookup,
                "MONITOR_MIN_RECRAWL_HOURS",
                defaults.min_recrawl_age,
            )?);
        monitor.validate().context("Invalid crawl configuration")?;

        let allowed_hosts = non_empty(&lookup, "ALLOWED_HOSTS")
            .map(|hosts| {
                hosts
                    .split(',')
                    .map(str::trim)
                    .filter(|h| !h.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            database_url: non_empty(&lookup, "DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            openai_api_key: non_empty(&lookup, "OPENAI_API_KEY"),
            openai_model: non_empty(&lookup, "OPENAI_MODEL"),
            notify_webhook_url: non_empty(&lookup, "NOTIFY_WEBHOOK_URL"),
            allowed_hosts,
            browser_fallback: flag(&lookup, "BROWSER_FALLBACK")?,
            chromium_path: non_empty(&lookup, "CHROMIUM_PATH"),
            monitor,
        })
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|v| !v.trim().is_empty())
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<bool> {
    match non_empty(lookup, key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => anyhow::bail!("{} must be true or false", key),
        },
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match non_empty(lookup, key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number", key)),
        None => Ok(default),
    }
}

fn secs_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration> {
    parse_or(lookup, key, default.as_secs()).map(Duration::from_secs)
}

fn hours_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration> {
    match non_empty(lookup, key) {
        Some(_) => parse_or::<u64>(lookup, key, 0).map(|h| Duration::from_secs(h * 60 * 60)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = config(&[]).unwrap();

        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert!(config.openai_api_key.is_none());
        assert!(config.notify_webhook_url.is_none());
        assert!(config.allowed_hosts.is_empty());
        assert!(!config.browser_fallback);
        assert_eq!(config.monitor.crawl.max_pages, 20);
        assert_eq!(config.monitor.crawl.max_depth, 1);
        assert_eq!(config.monitor.grace_period_crawls, 2);
        assert_eq!(config.monitor.monitor_interval, Duration::from_secs(24 * 60 * 60));
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = config(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("OPENAI_API_KEY", "sk-test"),
            ("CRAWL_MAX_PAGES", "50"),
            ("CRAWL_MAX_DEPTH", "3"),
            ("CRAWL_DELAY_SECS", "0"),
            ("GRACE_PERIOD_CRAWLS", "4"),
            ("MONITOR_INTERVAL_HOURS", "6"),
            ("ALLOWED_HOSTS", "intranet.local, docs.internal ,"),
            ("USER_AGENT", "site-monitor-test"),
        ])
        .unwrap();

        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.monitor.crawl.max_pages, 50);
        assert_eq!(config.monitor.crawl.max_depth, 3);
        assert_eq!(config.monitor.crawl.request_delay, Duration::ZERO);
        assert_eq!(config.monitor.crawl.user_agent, "site-monitor-test");
        assert_eq!(config.monitor.grace_period_crawls, 4);
        assert_eq!(config.monitor.monitor_interval, Duration::from_secs(6 * 60 * 60));
        assert_eq!(config.allowed_hosts, vec!["intranet.local", "docs.internal"]);
    }

    #[test]
    fn test_blank_values_count_as_unset() {
        let config = config(&[("OPENAI_API_KEY", "  "), ("CRAWL_MAX_PAGES", "")]).unwrap();
        assert!(config.openai_api_key.is_none());
        assert_eq!(config.monitor.crawl.max_pages, 20);
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        let err = config(&[("CRAWL_MAX_PAGES", "lots")]).unwrap_err();
        assert!(err.to_string().contains("CRAWL_MAX_PAGES"));
    }

    #[test]
    fn test_browser_fallback_flag() {
        let config = config(&[("BROWSER_FALLBACK", "Yes"), ("CHROMIUM_PATH", "/usr/bin/chromium")])
            .unwrap();
        assert!(config.browser_fallback);
        assert_eq!(config.chromium_path.as_deref(), Some("/usr/bin/chromium"));

        let err = config_err(&[("BROWSER_FALLBACK", "sometimes")]);
        assert!(err.contains("BROWSER_FALLBACK"));
    }

    fn config_err(vars: &[(&str, &str)]) -> String {
        config(vars).unwrap_err().to_string()
    }

    #[test]
    fn test_zero_grace_period_is_rejected() {
        assert!(config(&[("GRACE_PERIOD_CRAWLS", "0")]).is_err());
    }
}
