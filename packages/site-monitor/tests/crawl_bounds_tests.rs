//! Crawl bounds hold for arbitrary site graphs.

mod common;

use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

use common::fast_crawl;
use site_monitor::testing::{link_page, MockFetcher};
use site_monitor::{CrawlEngine, CrawlProgress};
use url::Url;

/// Site of `links.len()` pages where page `i` links to each page in
/// `links[i]`. Page 0 is the homepage. `broken` pages answer 500.
fn site(links: &[Vec<usize>], broken: &HashSet<usize>) -> MockFetcher {
    let mut fetcher = MockFetcher::new();
    for (i, targets) in links.iter().enumerate() {
        if broken.contains(&i) {
            fetcher = fetcher.with_status(page_url(i), 500);
            continue;
        }
        let hrefs: Vec<String> = targets.iter().map(|t| page_url(*t)).collect();
        let hrefs: Vec<&str> = hrefs.iter().map(String::as_str).collect();
        fetcher = fetcher.with_page(page_url(i), link_page(&format!("Page {}", i), &hrefs));
    }
    fetcher
}

fn page_url(i: usize) -> String {
    if i == 0 {
        "https://example.com/".to_string()
    } else {
        format!("https://example.com/p{}", i)
    }
}

fn graph() -> impl Strategy<Value = (Vec<Vec<usize>>, HashSet<usize>)> {
    (2usize..30).prop_flat_map(|n| {
        (
            prop::collection::vec(prop::collection::vec(0..n, 0..8), n),
            prop::collection::hash_set(1..n, 0..n / 3),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn crawl_never_exceeds_page_or_depth_bounds(
        (links, broken) in graph(),
        max_pages in 1usize..12,
        max_depth in 0usize..4,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let fetcher = Arc::new(site(&links, &broken));
        let engine = CrawlEngine::new(fetcher.clone());
        let config = fast_crawl().with_max_pages(max_pages).with_max_depth(max_depth);
        let seed = Url::parse("https://example.com/").unwrap();

        let outcome = runtime
            .block_on(engine.crawl(&seed, &config, &|_: CrawlProgress| {}))
            .unwrap();

        let fetched = fetcher.fetched_urls();
        prop_assert!(fetched.len() <= max_pages);
        prop_assert_eq!(outcome.fetched, fetched.len());
        prop_assert_eq!(outcome.pages.len() + outcome.failures.len(), fetched.len());
        prop_assert!(outcome.pages.iter().all(|p| p.depth <= max_depth));

        let unique: HashSet<&String> = fetched.iter().collect();
        prop_assert_eq!(unique.len(), fetched.len());
    }
}
