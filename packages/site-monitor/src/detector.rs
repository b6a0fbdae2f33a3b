//! Content fingerprinting and grace-period page retention.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::types::job::JobId;
use crate::types::page::{ExtractedPage, Page};

/// SHA-256 over `(url, text)` pairs in URL order.
///
/// Each pair is fed as `url NUL text NUL`, so the digest does not depend on
/// traversal order and two different page sets cannot collide by shifting
/// text across a page boundary.
pub fn fingerprint<'a, I>(pages: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut sorted: Vec<(&str, &str)> = pages.into_iter().collect();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    for (url, text) in sorted {
        hasher.update(url.as_bytes());
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

/// Fingerprint of a stored page set.
pub fn fingerprint_pages(pages: &[Page]) -> String {
    fingerprint(pages.iter().map(|p| (p.url.as_str(), p.content.as_str())))
}

/// Whether a new fingerprint differs from the stored one.
///
/// No stored fingerprint counts as changed.
pub fn has_changed(new_hash: &str, previous_hash: Option<&str>) -> bool {
    previous_hash != Some(new_hash)
}

/// Pages to persist and evict after one crawl cycle.
#[derive(Debug, Clone, Default)]
pub struct RetentionPlan {
    /// Observed pages plus unobserved pages still within the grace period,
    /// ordered by URL
    pub retained: Vec<Page>,
    /// URLs absent for `grace_period` consecutive cycles
    pub evicted: Vec<String>,
}

impl RetentionPlan {
    pub fn fingerprint(&self) -> String {
        fingerprint_pages(&self.retained)
    }

    /// Keep at most `max_pages` pages.
    ///
    /// Pages observed this cycle always stay (a crawl never yields more than
    /// `max_pages` of them). Unobserved pages are evicted early, the longest
    /// missing first, then the least recently seen.
    pub fn cap(&mut self, max_pages: usize) {
        let excess = self.retained.len().saturating_sub(max_pages);
        if excess == 0 {
            return;
        }

        let mut missing: Vec<&Page> = self
            .retained
            .iter()
            .filter(|p| p.missed_cycles > 0)
            .collect();
        missing.sort_by(|a, b| {
            b.missed_cycles
                .cmp(&a.missed_cycles)
                .then(a.last_seen.cmp(&b.last_seen))
                .then(a.url.cmp(&b.url))
        });
        let dropped: HashSet<String> = missing
            .into_iter()
            .take(excess)
            .map(|p| p.url.clone())
            .collect();

        self.retained.retain(|p| !dropped.contains(&p.url));
        self.evicted.extend(dropped);
        self.evicted.sort();
    }
}

/// Fold one crawl cycle into the stored page set.
///
/// Observed pages reset `missed_cycles` to zero and keep their `first_seen`.
/// Stored pages that were not observed get `missed_cycles + 1` and are
/// evicted once that reaches `grace_period`.
pub fn plan_retention(
    job_id: JobId,
    existing: &[Page],
    observed: &[ExtractedPage],
    grace_period: u32,
    seen_at: DateTime<Utc>,
) -> RetentionPlan {
    let previous: HashMap<&str, &Page> = existing.iter().map(|p| (p.url.as_str(), p)).collect();
    let mut retained: BTreeMap<String, Page> = BTreeMap::new();

    for extracted in observed {
        let mut page = Page::observed(job_id, extracted, seen_at);
        if let Some(old) = previous.get(extracted.url.as_str()) {
            page.first_seen = old.first_seen;
        }
        retained.insert(page.url.clone(), page);
    }

    let mut evicted = Vec::new();
    for old in existing {
        if retained.contains_key(&old.url) {
            continue;
        }
        let missed = old.missed_cycles.saturating_add(1);
        if missed >= grace_period {
            evicted.push(old.url.clone());
        } else {
            let mut kept = old.clone();
            kept.missed_cycles = missed;
            retained.insert(kept.url.clone(), kept);
        }
    }
    evicted.sort();

    RetentionPlan {
        retained: retained.into_values().collect(),
        evicted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn extracted(url: &str, text: &str) -> ExtractedPage {
        ExtractedPage {
            url: url.to_string(),
            title: None,
            description: None,
            text: text.to_string(),
            ..ExtractedPage::default()
        }
    }

    #[test]
    fn test_fingerprint_is_order_independent() {
        let a = fingerprint([("https://x.com/a", "alpha"), ("https://x.com/b", "beta")]);
        let b = fingerprint([("https://x.com/b", "beta"), ("https://x.com/a", "alpha")]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_fingerprint_detects_text_shifts() {
        let a = fingerprint([("https://x.com/a", "ab"), ("https://x.com/b", "c")]);
        let b = fingerprint([("https://x.com/a", "a"), ("https://x.com/b", "bc")]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_has_changed() {
        assert!(has_changed("abc", None));
        assert!(has_changed("abc", Some("def")));
        assert!(!has_changed("abc", Some("abc")));
    }

    #[test]
    fn test_grace_period_eviction() {
        let job_id = JobId::new();
        let now = Utc::now();
        let grace = 2;

        let cycle1 = plan_retention(
            job_id,
            &[],
            &[extracted("https://x.com/", "home"), extracted("https://x.com/old", "old")],
            grace,
            now,
        );
        assert_eq!(cycle1.retained.len(), 2);

        // absent once (grace - 1): still retained
        let cycle2 = plan_retention(
            job_id,
            &cycle1.retained,
            &[extracted("https://x.com/", "home")],
            grace,
            now,
        );
        let old = cycle2
            .retained
            .iter()
            .find(|p| p.url == "https://x.com/old")
            .unwrap();
        assert_eq!(old.missed_cycles, 1);
        assert!(cycle2.evicted.is_empty());

        // absent twice (grace): evicted
        let cycle3 = plan_retention(
            job_id,
            &cycle2.retained,
            &[extracted("https://x.com/", "home")],
            grace,
            now,
        );
        assert_eq!(cycle3.evicted, vec!["https://x.com/old".to_string()]);
        assert_eq!(cycle3.retained.len(), 1);
    }

    #[test]
    fn test_reobserved_page_resets_missed_cycles() {
        let job_id = JobId::new();
        let first = Utc::now() - chrono::Duration::days(3);
        let cycle1 = plan_retention(job_id, &[], &[extracted("https://x.com/a", "a")], 3, first);
        let cycle2 = plan_retention(job_id, &cycle1.retained, &[], 3, Utc::now());
        assert_eq!(cycle2.retained[0].missed_cycles, 1);

        let cycle3 = plan_retention(
            job_id,
            &cycle2.retained,
            &[extracted("https://x.com/a", "a v2")],
            3,
            Utc::now(),
        );
        assert_eq!(cycle3.retained[0].missed_cycles, 0);
        assert_eq!(cycle3.retained[0].first_seen, first);
        assert_eq!(cycle3.retained[0].content, "a v2");
    }

    #[test]
    fn test_retained_pages_keep_fingerprint_stable() {
        let job_id = JobId::new();
        let now = Utc::now();
        let pages = [extracted("https://x.com/", "home"), extracted("https://x.com/a", "a")];
        let full = plan_retention(job_id, &[], &pages, 2, now);

        // /a times out this cycle but is still within grace
        let partial = plan_retention(job_id, &full.retained, &pages[..1], 2, now);
        assert_eq!(full.fingerprint(), partial.fingerprint());
    }

    #[test]
    fn test_cap_evicts_missing_pages_first() {
        let job_id = JobId::new();
        let earlier = Utc::now() - chrono::Duration::hours(2);
        let pages = [
            extracted("https://x.com/", "home"),
            extracted("https://x.com/a", "a"),
            extracted("https://x.com/b", "b"),
        ];
        let cycle1 = plan_retention(job_id, &[], &pages, 5, earlier);
        let cycle2 = plan_retention(job_id, &cycle1.retained, &pages[..2], 5, Utc::now());
        let mut cycle3 = plan_retention(
            job_id,
            &cycle2.retained,
            &[extracted("https://x.com/", "home"), extracted("https://x.com/c", "c")],
            5,
            Utc::now(),
        );
        // /b missed twice, /a once
        assert_eq!(cycle3.retained.len(), 4);

        cycle3.cap(3);
        let urls: Vec<&str> = cycle3.retained.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(urls, vec!["https://x.com/", "https://x.com/a", "https://x.com/c"]);
        assert_eq!(cycle3.evicted, vec!["https://x.com/b".to_string()]);

        cycle3.cap(1);
        assert_eq!(cycle3.retained.len(), 2, "observed pages are never dropped");
        assert_eq!(
            cycle3.evicted,
            vec!["https://x.com/a".to_string(), "https://x.com/b".to_string()]
        );
    }

    #[test]
    fn test_cap_within_limit_is_a_no_op() {
        let mut plan = plan_retention(
            JobId::new(),
            &[],
            &[extracted("https://x.com/", "home")],
            2,
            Utc::now(),
        );
        plan.cap(20);
        assert_eq!(plan.retained.len(), 1);
        assert!(plan.evicted.is_empty());
    }

    proptest! {
        #[test]
        fn fingerprint_ignores_input_order(
            mut entries in proptest::collection::btree_map("[a-z]{1,8}", "[ -~]{0,40}", 1..8)
                .prop_map(|m| m.into_iter().collect::<Vec<_>>()),
            seed in 0u64..1000,
        ) {
            let original = fingerprint(entries.iter().map(|(u, t)| (u.as_str(), t.as_str())));
            let len = entries.len();
            entries.rotate_left((seed as usize) % len);
            entries.reverse();
            let shuffled = fingerprint(entries.iter().map(|(u, t)| (u.as_str(), t.as_str())));
            prop_assert_eq!(original, shuffled);
        }
    }
}
