//! llms.txt artifact rendering.
//!
//! ```text
//! # <root page title>
//!
//! > <annotator summary>
//!
//! Category: <annotator category>
//!
//! This document lists key resources discovered from <root url>. ...
//!
//! ## Docs
//! - [Title](url): description
//! ```

use indexmap::IndexMap;

use crate::traits::annotator::Annotation;
use crate::types::page::Page;

/// Characters of page text used as a link note when there is no description.
const NOTE_CHARS: usize = 160;

/// Section heading for a page, from URL keywords.
pub fn categorize_url(url: &str) -> &'static str {
    let lower = url.to_ascii_lowercase();
    if lower.contains("doc") {
        "Docs"
    } else if lower.contains("example") || lower.contains("demo") {
        "Examples"
    } else if lower.contains("blog") || lower.contains("post") {
        "Blog"
    } else {
        "Other"
    }
}

/// Order pages root-first: by depth, then URL.
fn ordered(pages: &[Page]) -> Vec<&Page> {
    let mut ordered: Vec<&Page> = pages.iter().collect();
    ordered.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.url.cmp(&b.url)));
    ordered
}

/// Truncate on a char boundary.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn first_line(text: &str) -> &str {
    text.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim()
}

/// Build the text sent to the annotator, bounded to `max_chars`.
pub fn annotation_input(pages: &[Page], max_chars: usize) -> String {
    let mut input = String::new();
    for page in ordered(pages) {
        input.push_str(&format!(
            "Title: {}\nURL: {}\n{}\n\n",
            page.title.as_deref().unwrap_or(""),
            page.url,
            page.content
        ));
        if input.chars().count() >= max_chars {
            break;
        }
    }
    truncate_chars(&input, max_chars).trim_end().to_string()
}

/// Render the llms.txt artifact for a job.
pub fn render_llms_txt(
    root_url: &str,
    max_depth: usize,
    pages: &[Page],
    annotation: &Annotation,
) -> String {
    let pages = ordered(pages);
    let root = pages.iter().find(|p| p.url == root_url).or(pages.first());

    let title = root
        .and_then(|p| p.title.as_deref())
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(root_url);

    let mut lines = vec![format!("# {}", title), String::new()];

    if !annotation.summary.trim().is_empty() {
        lines.push(format!("> {}", annotation.summary.trim()));
        lines.push(String::new());
    }
    if let Some(description) = root.and_then(|p| p.description.as_deref()) {
        lines.push(description.to_string());
        lines.push(String::new());
    }
    lines.push(format!("Category: {}", annotation.category.trim()));
    lines.push(String::new());
    lines.push(format!(
        "This document lists key resources discovered from {}. Only pages up to depth {} are included.",
        root_url, max_depth
    ));

    let mut sections: IndexMap<&'static str, Vec<&Page>> = IndexMap::new();
    for page in pages.iter().copied().filter(|p| Some(&p.url) != root.map(|r| &r.url)) {
        sections.entry(categorize_url(&page.url)).or_default().push(page);
    }

    for (section, entries) in sections {
        lines.push(String::new());
        lines.push(format!("## {}", section));
        lines.push(String::new());
        for page in entries {
            let link_text = page.title.as_deref().unwrap_or(&page.url);
            let note = page
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| truncate_chars(first_line(&page.content), NOTE_CHARS));
            if note.is_empty() {
                lines.push(format!("- [{}]({})", link_text, page.url));
            } else {
                lines.push(format!("- [{}]({}): {}", link_text, page.url, note));
            }
        }
    }

    let mut artifact = lines.join("\n");
    artifact.push('\n');
    artifact
}
