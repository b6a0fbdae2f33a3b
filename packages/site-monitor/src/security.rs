//! SSRF protection for submitted URLs.

use std::collections::HashSet;
use std::net::IpAddr;
use url::{Host, Url};

use crate::error::{MonitorError, Result};

/// Maximum accepted URL length.
pub const MAX_URL_LENGTH: usize = 2048;

/// Validates submitted URLs before a job is created.
///
/// Rejects:
/// - Non-HTTP(S) schemes
/// - Internal hosts (localhost, cloud metadata names)
/// - Private, loopback and link-local IP ranges
/// - Path traversal patterns, raw or percent-encoded
/// - URLs longer than [`MAX_URL_LENGTH`]
#[derive(Debug, Clone)]
pub struct UrlValidator {
    blocked_hosts: HashSet<String>,
    blocked_cidrs: Vec<ipnet::IpNet>,
    suspicious_patterns: Vec<&'static str>,
    /// Bypass host and CIDR checks for these hosts
    allowed_hosts: HashSet<String>,
}

impl Default for UrlValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlValidator {
    pub fn new() -> Self {
        let cidrs = [
            "10.0.0.0/8",
            "172.16.0.0/12",
            "192.168.0.0/16",
            "169.254.0.0/16", // Link-local / cloud metadata
            "127.0.0.0/8",
            "0.0.0.0/8",
            "::1/128",
            "::/128",
            "fc00::/7",  // IPv6 private
            "fe80::/10", // IPv6 link-local
        ];

        Self {
            blocked_hosts: [
                "localhost",
                "metadata.google.internal",
                "metadata.gke.internal",
                "instance-data",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            blocked_cidrs: cidrs.iter().filter_map(|c| c.parse().ok()).collect(),
            suspicious_patterns: vec!["../", "..\\", "%2e%2e%2f", "%2e%2e%5c", "%2e%2e/"],
            allowed_hosts: HashSet::new(),
        }
    }

    /// Add an allowed host (bypasses host and IP checks).
    pub fn allow_host(mut self, host: impl Into<String>) -> Self {
        self.allowed_hosts.insert(host.into().to_ascii_lowercase());
        self
    }

    pub fn block_host(mut self, host: impl Into<String>) -> Self {
        self.blocked_hosts.insert(host.into().to_ascii_lowercase());
        self
    }

    pub fn block_cidr(mut self, cidr: ipnet::IpNet) -> Self {
        self.blocked_cidrs.push(cidr);
        self
    }

    /// Check the raw input and its parsed form.
    ///
    /// Suspicious patterns are checked against the raw string because
    /// parsing resolves `../` segments away.
    pub fn validate(&self, raw: &str, parsed: &Url) -> Result<()> {
        if raw.len() > MAX_URL_LENGTH {
            return Err(MonitorError::invalid_url(
                truncate(raw),
                format!("URL too long (max {} characters)", MAX_URL_LENGTH),
            ));
        }

        let lower = raw.to_ascii_lowercase();
        if let Some(pattern) = self.suspicious_patterns.iter().find(|p| lower.contains(*p)) {
            return Err(MonitorError::invalid_url(
                raw,
                format!("suspicious pattern: {}", pattern),
            ));
        }

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(MonitorError::invalid_url(
                raw,
                format!("disallowed URL scheme: {}", parsed.scheme()),
            ));
        }

        let host = parsed
            .host()
            .ok_or_else(|| MonitorError::invalid_url(raw, "URL has no host"))?;

        let ip = match host {
            Host::Domain(domain) => {
                let domain = domain.to_ascii_lowercase();
                if self.allowed_hosts.contains(&domain) {
                    return Ok(());
                }
                if self.blocked_hosts.contains(&domain) || domain.ends_with(".localhost") {
                    return Err(MonitorError::invalid_url(
                        raw,
                        format!("blocked host: {}", domain),
                    ));
                }
                return Ok(());
            }
            Host::Ipv4(ip) => IpAddr::V4(ip),
            Host::Ipv6(ip) => IpAddr::V6(ip),
        };

        if self.allowed_hosts.contains(&ip.to_string()) {
            return Ok(());
        }
        if let Some(cidr) = self.blocked_cidrs.iter().find(|c| c.contains(&ip)) {
            return Err(MonitorError::invalid_url(
                raw,
                format!("blocked IP range: {} in {}", ip, cidr),
            ));
        }
        Ok(())
    }
}

fn truncate(raw: &str) -> String {
    raw.chars().take(80).collect::<String>() + "..."
}
