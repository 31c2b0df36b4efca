//! HTML parsing for the index page and discussion threads
//!
//! This module handles:
//! - Extracting the ranked (id, title, link) list from the index page
//! - Extracting absolute links and their anchor text from a thread page
//! - Turning ids and anchor text into safe file and directory names
//!
//! `scraper::Html` is not `Send`, so every function here is synchronous and
//! returns owned data; callers parse between awaits, never across one.

use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Longest file stem produced by `sanitize_filename`, in characters
const MAX_FILENAME_CHARS: usize = 120;

/// One entry of the index, in display order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Stable external identifier (the row's `id` attribute)
    pub item_id: String,

    /// Link text of the title anchor
    pub title: String,

    /// Absolute URL of the item's external page
    pub link: String,
}

/// A link found in a discussion thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadLink {
    /// Absolute URL
    pub url: String,

    /// Anchor text, trimmed
    pub text: String,
}

/// Extracts up to `top_n` entries from the index page
///
/// # Extraction Rules
///
/// - Each entry is a `tr.athing` row carrying an `id` attribute
/// - Title and link come from `td.title > span.titleline > a`
/// - Rows without an id or title anchor are skipped with a warning
/// - Relative links are resolved against `base_url`
/// - Later duplicates of an id already seen are ignored
///
/// # Example
///
/// ```
/// use hn_mirror::crawler::parse_index;
/// use url::Url;
///
/// let html = r#"<table><tr class="athing" id="1"><td class="title">
///     <span class="titleline"><a href="https://example.com/">Example</a></span>
/// </td></tr></table>"#;
/// let base = Url::parse("https://news.ycombinator.com/").unwrap();
/// let entries = parse_index(html, &base, 30);
/// assert_eq!(entries[0].item_id, "1");
/// ```
pub fn parse_index(html: &str, base_url: &Url, top_n: usize) -> Vec<IndexEntry> {
    let document = Html::parse_document(html);

    let (Ok(row_selector), Ok(title_selector)) = (
        Selector::parse("tr.athing"),
        Selector::parse("td.title > span.titleline > a"),
    ) else {
        return Vec::new();
    };

    let mut entries: Vec<IndexEntry> = Vec::new();

    for row in document.select(&row_selector) {
        if entries.len() >= top_n {
            break;
        }

        let item_id = match row.value().attr("id").map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                tracing::warn!("Skipping index row without an id");
                continue;
            }
        };

        let Some(anchor) = row.select(&title_selector).next() else {
            tracing::warn!(item_id = %item_id, "Skipping index row without a title element");
            continue;
        };

        let title = anchor_text(&anchor);
        let Some(link) = anchor
            .value()
            .attr("href")
            .and_then(|href| resolve_link(href, base_url))
        else {
            tracing::warn!(item_id = %item_id, "Skipping index row with an unusable link");
            continue;
        };

        if entries.iter().any(|e| e.item_id == item_id) {
            tracing::debug!(item_id = %item_id, "Ignoring repeated index row");
            continue;
        }

        entries.push(IndexEntry {
            item_id,
            title,
            link,
        });
    }

    entries
}

/// Extracts every absolute http(s) link from a thread page
///
/// Only anchors whose `href` already starts with `http` are taken; relative
/// links point back into the index site and are not followed.
pub fn extract_thread_links(html: &str) -> Vec<ThreadLink> {
    let document = Html::parse_document(html);

    let Ok(selector) = Selector::parse(r#"a[href^="http"]"#) else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|element| {
            let href = element.value().attr("href")?.trim();
            let url = Url::parse(href).ok()?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return None;
            }
            Some(ThreadLink {
                url: url.to_string(),
                text: anchor_text(&element),
            })
        })
        .collect()
}

/// Replaces characters that are invalid in file names with `_`
///
/// Covers `: < > " / \ | ? *` and control characters. Empty input, or input
/// made only of dots, becomes `_`. Output is capped at 120 characters.
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| match c {
            ':' | '<' | '>' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(MAX_FILENAME_CHARS)
        .collect();

    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
        return "_".to_string();
    }

    sanitized
}

/// Derives an item's artifact directory name from its id
pub fn folder_name_for(item_id: &str) -> String {
    sanitize_filename(item_id)
}

fn anchor_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Resolves a link href to an absolute http(s) URL
///
/// Returns None for empty hrefs, fragments, non-http schemes, and anything
/// that fails to parse.
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute) if absolute.scheme() == "http" || absolute.scheme() == "https" => {
            Some(absolute.to_string())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://news.ycombinator.com/").unwrap()
    }

    fn row(id: &str, href: &str, title: &str) -> String {
        format!(
            r#"<tr class="athing" id="{id}">
                <td class="title"><span class="rank">1.</span></td>
                <td class="title"><span class="titleline"><a href="{href}">{title}</a>
                    <span class="sitebit comhead">(<a href="from?site=x"><span class="sitestr">x</span></a>)</span>
                </span></td>
            </tr>
            <tr><td class="subtext">42 points</td></tr>"#
        )
    }

    fn page(rows: &[String]) -> String {
        format!("<html><body><table>{}</table></body></html>", rows.join("\n"))
    }

    #[test]
    fn test_parse_index_in_display_order() {
        let html = page(&[
            row("300", "https://a.example/", "First"),
            row("100", "https://b.example/post", "Second"),
            row("200", "https://c.example/x?y=1", "Third"),
        ]);

        let entries = parse_index(&html, &base_url(), 30);
        let ids: Vec<_> = entries.iter().map(|e| e.item_id.as_str()).collect();
        assert_eq!(ids, vec!["300", "100", "200"]);
        assert_eq!(entries[1].title, "Second");
        assert_eq!(entries[2].link, "https://c.example/x?y=1");
    }

    #[test]
    fn test_relative_link_resolved_against_index() {
        let html = page(&[row("7", "item?id=7", "Ask HN: something")]);
        let entries = parse_index(&html, &base_url(), 30);
        assert_eq!(entries[0].link, "https://news.ycombinator.com/item?id=7");
    }

    #[test]
    fn test_top_n_truncates() {
        let rows: Vec<String> = (1..=40)
            .map(|i| row(&i.to_string(), "https://e.example/", "T"))
            .collect();
        let entries = parse_index(&page(&rows), &base_url(), 30);
        assert_eq!(entries.len(), 30);
        assert_eq!(entries[29].item_id, "30");
    }

    #[test]
    fn test_rows_without_title_or_id_skipped() {
        let html = page(&[
            r#"<tr class="athing" id="1"><td class="title">no anchor</td></tr>"#.to_string(),
            r#"<tr class="athing"><td class="title"><span class="titleline"><a href="https://x.example/">No id</a></span></td></tr>"#.to_string(),
            row("3", "https://ok.example/", "Kept"),
        ]);

        let entries = parse_index(&html, &base_url(), 30);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].item_id, "3");
    }

    #[test]
    fn test_repeated_ids_ignored() {
        let html = page(&[
            row("1", "https://a.example/", "A"),
            row("1", "https://a.example/", "A again"),
        ]);
        let entries = parse_index(&html, &base_url(), 30);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "A");
    }

    #[test]
    fn test_empty_page() {
        assert!(parse_index("<html></html>", &base_url(), 30).is_empty());
    }

    #[test]
    fn test_extract_thread_links() {
        let html = r#"
            <html><body>
                <a href="https://example.com/paper">The paper</a>
                <a href="item?id=5">reply</a>
                <a href="http://blog.example.org/post">  blog post  </a>
                <a href="mailto:someone@example.com">mail</a>
                <a href="https://news.ycombinator.com/user?id=pg">pg</a>
            </body></html>
        "#;

        let links = extract_thread_links(html);
        assert_eq!(links.len(), 3);
        assert_eq!(links[0].url, "https://example.com/paper");
        assert_eq!(links[0].text, "The paper");
        assert_eq!(links[1].text, "blog post");
    }

    #[test]
    fn test_sanitize_filename_removes_invalid_chars() {
        assert_eq!(sanitize_filename("a:b<c>d\"e/f\\g|h?i*j"), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(sanitize_filename("tab\there"), "tab_here");
    }

    #[test]
    fn test_sanitize_filename_preserves_valid_chars() {
        assert_eq!(sanitize_filename("Show HN: Rust (2024)"), "Show HN_ Rust (2024)");
        assert_eq!(sanitize_filename("résumé.v2"), "résumé.v2");
    }

    #[test]
    fn test_sanitize_filename_degenerate_inputs() {
        assert_eq!(sanitize_filename(""), "_");
        assert_eq!(sanitize_filename("   "), "_");
        assert_eq!(sanitize_filename(".."), "_");
    }

    #[test]
    fn test_sanitize_filename_caps_length() {
        let long = "a".repeat(500);
        assert_eq!(sanitize_filename(&long).chars().count(), 120);
    }

    #[test]
    fn test_folder_name_for() {
        assert_eq!(folder_name_for("41234567"), "41234567");
        assert_eq!(folder_name_for("a/b"), "a_b");
    }
}
