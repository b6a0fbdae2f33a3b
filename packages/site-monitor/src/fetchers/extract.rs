//! Readable-text and link extraction from HTML.

use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

use crate::links::resolve_link;

/// Text blocks this short are navigation noise.
const MIN_BLOCK_CHARS: usize = 10;

/// Containers tried in order before falling back to `<body>`.
const MAIN_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role='main']",
    "div.content",
    ".main-content",
    ".article-content",
];

const BLOCK_SELECTOR: &str = "h1, h2, h3, h4, h5, h6, p, li";

/// Content pulled out of one HTML document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedContent {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Distinct text blocks in document order, capped
    pub paragraphs: Vec<String>,
    /// Absolute, normalized outbound links in document order, deduplicated
    pub links: Vec<Url>,
}

impl ExtractedContent {
    /// Paragraphs joined into the page text.
    pub fn text(&self) -> String {
        self.paragraphs.join("\n\n")
    }
}

/// Extract title, description, capped text blocks and links.
pub fn extract_content(base: &Url, html: &str, max_paragraphs: usize) -> ExtractedContent {
    let document = Html::parse_document(html);

    ExtractedContent {
        title: extract_title(&document),
        description: extract_description(&document),
        paragraphs: extract_paragraphs(&document, max_paragraphs),
        links: extract_links(&document, base),
    }
}

fn select_first<'a>(document: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(selector).ok()?;
    document.select(&selector).next()
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn extract_title(document: &Html) -> Option<String> {
    select_first(document, "title")
        .map(element_text)
        .filter(|t| !t.is_empty())
        .or_else(|| {
            select_first(document, "h1")
                .map(element_text)
                .filter(|t| !t.is_empty())
        })
}

fn extract_description(document: &Html) -> Option<String> {
    ["meta[name='description']", "meta[property='og:description']"]
        .iter()
        .filter_map(|s| select_first(document, s))
        .filter_map(|el| el.value().attr("content"))
        .map(|c| c.split_whitespace().collect::<Vec<_>>().join(" "))
        .find(|c| !c.is_empty())
}

fn main_container(document: &Html) -> ElementRef<'_> {
    MAIN_SELECTORS
        .iter()
        .find_map(|s| select_first(document, s))
        .or_else(|| select_first(document, "body"))
        .unwrap_or_else(|| document.root_element())
}

fn extract_paragraphs(document: &Html, max_paragraphs: usize) -> Vec<String> {
    let Ok(blocks) = Selector::parse(BLOCK_SELECTOR) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    main_container(document)
        .select(&blocks)
        .map(element_text)
        .filter(|t| t.chars().count() > MIN_BLOCK_CHARS)
        .filter(|t| seen.insert(t.clone()))
        .take(max_paragraphs)
        .collect()
}

fn extract_links(document: &Html, base: &Url) -> Vec<Url> {
    let Ok(anchors) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    document
        .select(&anchors)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| resolve_link(base, href))
        .filter(|url| seen.insert(url.as_str().to_string()))
        .collect()
}
