//! URL canonicalization and link filtering.
//!
//! Every URL that enters the system (submitted seeds, discovered links, page
//! keys) goes through [`normalize_url`] so that trivially different spellings
//! of the same page share one key.

use std::net::IpAddr;
use url::Url;

use crate::error::{MonitorError, Result};

/// Paths ending with these extensions are never enqueued.
const EXCLUDED_EXTENSIONS: &[&str] = &[
    ".pdf", ".jpg", ".jpeg", ".png", ".gif", ".css", ".js", ".zip", ".mp4",
];

const EXCLUDED_SCHEMES: &[&str] = &["mailto:", "tel:", "javascript:"];

/// Second-level labels that sit under a country TLD (`example.co.uk`).
const SECOND_LEVEL_SUFFIXES: &[&str] = &["co", "com", "org", "net", "ac", "gov", "edu"];

/// Parse and canonicalize a user-supplied URL.
///
/// Accepts only `http`/`https`. A bare host (`example.com/docs`) is read as
/// `https://`. The fragment is dropped, the trailing `/` is stripped from the
/// path (the root stays `/`), an empty query is dropped. Host lowercasing and
/// default-port removal come from `url::Url` itself.
pub fn normalize_url(input: &str) -> Result<Url> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(MonitorError::invalid_url(input, "empty URL"));
    }

    let parsed = match Url::parse(trimmed) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(&format!("https://{}", trimmed))
            .map_err(|e| MonitorError::invalid_url(input, e))?,
        Err(e) => return Err(MonitorError::invalid_url(input, e)),
    };

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(MonitorError::invalid_url(
            input,
            format!("unsupported scheme: {}", parsed.scheme()),
        ));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(MonitorError::invalid_url(input, "URL has no host"));
    }

    Ok(canonicalize(parsed))
}

fn canonicalize(mut url: Url) -> Url {
    url.set_fragment(None);

    let path = url.path().trim_end_matches('/').to_string();
    url.set_path(if path.is_empty() { "/" } else { &path });

    if url.query() == Some("") {
        url.set_query(None);
    }
    url
}

/// Whether a raw `href` should be skipped before resolution.
pub fn is_excluded_link(href: &str) -> bool {
    let lower = href.trim().to_ascii_lowercase();
    if lower.is_empty() || lower.starts_with('#') {
        return true;
    }
    if EXCLUDED_SCHEMES.iter().any(|s| lower.starts_with(s)) {
        return true;
    }
    has_excluded_extension(&lower)
}

fn has_excluded_extension(url_or_path: &str) -> bool {
    let path = url_or_path
        .split(['?', '#'])
        .next()
        .unwrap_or(url_or_path)
        .to_ascii_lowercase();
    EXCLUDED_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Resolve an `href` against the page it appeared on.
///
/// Returns `None` for excluded links and anything that is not http(s) after
/// resolution.
pub fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    if is_excluded_link(href) {
        return None;
    }
    let resolved = base.join(href.trim()).ok()?;
    if !matches!(resolved.scheme(), "http" | "https") || resolved.host_str().is_none() {
        return None;
    }
    if has_excluded_extension(resolved.path()) {
        return None;
    }
    Some(canonicalize(resolved))
}

/// Heuristic registrable domain (eTLD+1) of a host.
///
/// `blog.example.com` and `www.example.com` both map to `example.com`;
/// `shop.example.co.uk` maps to `example.co.uk`. IP literals map to themselves.
pub fn registrable_domain(host: &str) -> String {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if bare.parse::<IpAddr>().is_ok() {
        return host;
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        return host;
    }

    let n = labels.len();
    let take = if labels[n - 1].len() == 2 && SECOND_LEVEL_SUFFIXES.contains(&labels[n - 2]) {
        3
    } else {
        2
    };
    labels[n.saturating_sub(take)..].join(".")
}

/// Whether two URLs share a registrable domain.
pub fn same_site(a: &Url, b: &Url) -> bool {
    match (a.host_str(), b.host_str()) {
        (Some(x), Some(y)) => registrable_domain(x) == registrable_domain(y),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_strips_trailing_slash_and_fragment() {
        let url = normalize_url("https://Example.COM/docs/#intro").unwrap();
        assert_eq!(url.as_str(), "https://example.com/docs");

        let url = normalize_url("https://example.com").unwrap();
        assert_eq!(url.as_str(), "https://example.com/");

        let url = normalize_url("https://example.com:443/a/?").unwrap();
        assert_eq!(url.as_str(), "https://example.com/a");
    }

    #[test]
    fn test_normalize_keeps_query() {
        let url = normalize_url("http://example.com/search/?q=rust").unwrap();
        assert_eq!(url.as_str(), "http://example.com/search?q=rust");
    }

    #[test]
    fn test_normalize_bare_host_defaults_to_https() {
        let url = normalize_url("example.com/about/").unwrap();
        assert_eq!(url.as_str(), "https://example.com/about");
    }

    #[test]
    fn test_normalize_rejects_unsupported_input() {
        assert!(matches!(
            normalize_url("ftp://example.com/file"),
            Err(MonitorError::InvalidUrl { .. })
        ));
        assert!(normalize_url("mailto:someone@example.com").is_err());
        assert!(normalize_url("").is_err());
        assert!(normalize_url("http://").is_err());
        assert!(normalize_url("https://exa mple.com").is_err());
    }

    #[test]
    fn test_excluded_links() {
        assert!(is_excluded_link("#top"));
        assert!(is_excluded_link("mailto:hi@example.com"));
        assert!(is_excluded_link("tel:+15551234"));
        assert!(is_excluded_link("javascript:void(0)"));
        assert!(is_excluded_link("/files/report.PDF"));
        assert!(is_excluded_link("/img/logo.png?v=2"));
        assert!(!is_excluded_link("/docs/getting-started"));
        assert!(!is_excluded_link("https://example.com/blog/"));
    }

    #[test]
    fn test_resolve_link() {
        let base = Url::parse("https://example.com/docs/intro").unwrap();
        assert_eq!(
            resolve_link(&base, "../blog/#latest").unwrap().as_str(),
            "https://example.com/blog"
        );
        assert_eq!(
            resolve_link(&base, "setup/").unwrap().as_str(),
            "https://example.com/docs/setup"
        );
        assert!(resolve_link(&base, "ftp://example.com/x").is_none());
        assert!(resolve_link(&base, "/assets/app.js").is_none());
    }

    #[test]
    fn test_registrable_domain() {
        assert_eq!(registrable_domain("example.com"), "example.com");
        assert_eq!(registrable_domain("www.example.com"), "example.com");
        assert_eq!(registrable_domain("docs.api.example.com"), "example.com");
        assert_eq!(registrable_domain("shop.example.co.uk"), "example.co.uk");
        assert_eq!(registrable_domain("Example.COM."), "example.com");
        assert_eq!(registrable_domain("93.184.216.34"), "93.184.216.34");
    }

    #[test]
    fn test_same_site() {
        let a = Url::parse("https://www.example.com/").unwrap();
        let b = Url::parse("https://blog.example.com/post").unwrap();
        let c = Url::parse("https://example.org/").unwrap();
        assert!(same_site(&a, &b));
        assert!(!same_site(&a, &c));
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(
            host in "[a-z]{1,10}\\.(com|org|net)",
            segments in proptest::collection::vec("[a-z0-9-]{1,8}", 0..4),
            trailing in proptest::bool::ANY,
        ) {
            let mut raw = format!("https://{}/{}", host, segments.join("/"));
            if trailing {
                raw.push('/');
            }
            let once = normalize_url(&raw).unwrap();
            let twice = normalize_url(once.as_str()).unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}
