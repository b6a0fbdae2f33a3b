//! Heuristic annotator that never leaves the process.

use async_trait::async_trait;

use crate::error::Result;
use crate::traits::annotator::{Annotation, Annotator};

const SUMMARY_SENTENCES: usize = 2;
const MAX_SUMMARY_CHARS: usize = 400;

/// Keyword → category, checked in order against the URL lines of the input.
const CATEGORY_KEYWORDS: &[(&str, &str)] = &[
    ("doc", "Documentation"),
    ("api", "Documentation"),
    ("tutorial", "Tutorial"),
    ("guide", "Tutorial"),
    ("blog", "News"),
    ("news", "News"),
    ("product", "Product"),
    ("pricing", "Product"),
    ("shop", "Product"),
    ("course", "Education"),
    ("learn", "Education"),
];

/// Deterministic annotator for deployments without an AI key.
///
/// Category comes from URL keywords; the summary is the first sentences of
/// the first page's text.
#[derive(Debug, Clone, Default)]
pub struct OfflineAnnotator;

impl OfflineAnnotator {
    pub fn new() -> Self {
        Self
    }
}

fn categorize(text: &str) -> String {
    let urls: Vec<String> = text
        .lines()
        .filter_map(|l| l.strip_prefix("URL:"))
        .map(|u| u.trim().to_ascii_lowercase())
        .collect();

    CATEGORY_KEYWORDS
        .iter()
        .map(|(keyword, category)| {
            let hits = urls.iter().filter(|u| u.contains(keyword)).count();
            (hits, *category)
        })
        .filter(|(hits, _)| *hits > 0)
        // first keyword wins ties
        .fold(None::<(usize, &str)>, |best, candidate| match best {
            Some(b) if b.0 >= candidate.0 => Some(b),
            _ => Some(candidate),
        })
        .map_or_else(|| "Other".to_string(), |(_, category)| category.to_string())
}

fn summarize(text: &str) -> String {
    let title = text
        .lines()
        .find_map(|l| l.strip_prefix("Title:"))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    let body = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with("Title:") && !l.starts_with("URL:"))
        .unwrap_or("");

    let mut summary = String::new();
    let mut sentences = 0;
    for (idx, c) in body.char_indices() {
        summary.push(c);
        if matches!(c, '.' | '!' | '?')
            && body[idx + c.len_utf8()..].starts_with(char::is_whitespace)
        {
            sentences += 1;
            if sentences == SUMMARY_SENTENCES {
                break;
            }
        }
        if summary.chars().count() >= MAX_SUMMARY_CHARS {
            break;
        }
    }
    let summary = summary.trim().to_string();

    match (title, summary.is_empty()) {
        (Some(title), true) => format!("Content from {}", title),
        (None, true) => "Content from this site".to_string(),
        (_, false) => summary,
    }
}

#[async_trait]
impl Annotator for OfflineAnnotator {
    async fn annotate(&self, text: &str) -> Result<Annotation> {
        Ok(Annotation {
            category: categorize(text),
            summary: summarize(text),
        })
    }
}
