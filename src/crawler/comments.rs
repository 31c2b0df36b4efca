//! Discussion thread crawl
//!
//! For each item the thread page is saved under `<folder>/comments/`, then
//! every absolute link in it is fetched once and saved next to it, named
//! after the link's anchor text. This is one hop and no further.
//!
//! The crawl is best-effort: failures are logged and counted, never returned
//! as errors.

use crate::crawler::fetcher::Fetcher;
use crate::crawler::parser::{extract_thread_links, sanitize_filename};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Directory under an item's folder that holds thread pages
pub const COMMENTS_DIR: &str = "comments";

/// File name of the saved thread page
pub const THREAD_FILE: &str = "comments.html";

/// An item handed to the comment crawl
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentTarget {
    pub item_id: String,
    pub folder_name: String,
    pub thread_url: String,
}

/// Totals for one batch crawl
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    /// Threads fetched and saved
    pub threads_saved: usize,

    /// Threads that could not be fetched or saved
    pub threads_failed: usize,

    /// Linked pages saved across all threads
    pub links_saved: usize,

    /// Linked pages skipped because their fetch or save failed
    pub links_skipped: usize,
}

/// Fetches discussion threads and the pages they link to
#[derive(Debug, Clone)]
pub struct CommentCrawler {
    fetcher: Arc<Fetcher>,
    save_root: PathBuf,
    timeout: Duration,
    item_delay: Duration,
}

impl CommentCrawler {
    /// Creates a crawler
    ///
    /// `item_delay` is slept between consecutive items in a batch.
    pub fn new(
        fetcher: Arc<Fetcher>,
        save_root: impl Into<PathBuf>,
        timeout: Duration,
        item_delay: Duration,
    ) -> Self {
        Self {
            fetcher,
            save_root: save_root.into(),
            timeout,
            item_delay,
        }
    }

    /// Directory holding an item's thread page and linked pages
    pub fn comments_dir(&self, folder_name: &str) -> PathBuf {
        self.save_root.join(folder_name).join(COMMENTS_DIR)
    }

    /// Crawls each target in turn, pausing between them
    pub async fn crawl_batch(&self, targets: Vec<CommentTarget>) -> CrawlSummary {
        let mut summary = CrawlSummary::default();

        for (index, target) in targets.iter().enumerate() {
            if index > 0 && !self.item_delay.is_zero() {
                tokio::time::sleep(self.item_delay).await;
            }

            let (saved, skipped) = match self.crawl_comments(target).await {
                Some(counts) => {
                    summary.threads_saved += 1;
                    counts
                }
                None => {
                    tracing::error!(item_id = %target.item_id, "Failed to load comments");
                    summary.threads_failed += 1;
                    (0, 0)
                }
            };
            summary.links_saved += saved;
            summary.links_skipped += skipped;
        }

        tracing::info!(
            "Comment crawl finished: {} threads saved, {} failed, {} linked pages saved, {} skipped",
            summary.threads_saved,
            summary.threads_failed,
            summary.links_saved,
            summary.links_skipped
        );

        summary
    }

    /// Crawls one thread and its first-level links
    ///
    /// # Returns
    ///
    /// * `Some((saved, skipped))` - The thread page was saved; counts are for linked pages
    /// * `None` - The thread page could not be fetched or saved
    pub async fn crawl_comments(&self, target: &CommentTarget) -> Option<(usize, usize)> {
        let thread = self.fetcher.fetch(&target.thread_url, self.timeout).await;
        let content = thread.content?;

        let dir = self.comments_dir(&target.folder_name);
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            tracing::error!(item_id = %target.item_id, "Cannot create {}: {}", dir.display(), e);
            return None;
        }

        let thread_path = dir.join(THREAD_FILE);
        if let Err(e) = tokio::fs::write(&thread_path, content.as_bytes()).await {
            tracing::error!(item_id = %target.item_id, "Error saving to {}: {}", thread_path.display(), e);
            return None;
        }
        tracing::info!("Saved content to {}", thread_path.display());

        let links = extract_thread_links(&content);
        tracing::debug!(item_id = %target.item_id, "Thread has {} outbound links", links.len());

        let mut used_names: HashSet<String> = HashSet::new();
        used_names.insert(THREAD_FILE.to_string());

        let mut saved = 0;
        let mut skipped = 0;

        for link in links {
            let page = self.fetcher.fetch(&link.url, self.timeout).await;
            let Some(body) = page.content else {
                skipped += 1;
                continue;
            };

            let file_name = unique_file_name(&link.text, &mut used_names);
            let path = dir.join(&file_name);
            match tokio::fs::write(&path, body.as_bytes()).await {
                Ok(()) => {
                    tracing::debug!("Saved linked page {} to {}", link.url, path.display());
                    saved += 1;
                }
                Err(e) => {
                    tracing::error!("Error saving to {}: {}", path.display(), e);
                    skipped += 1;
                }
            }
        }

        Some((saved, skipped))
    }
}

/// Picks `<sanitized anchor>.html`, suffixing `_2`, `_3`... on collisions
fn unique_file_name(anchor_text: &str, used: &mut HashSet<String>) -> String {
    let stem = sanitize_filename(anchor_text);

    let mut candidate = format!("{}.html", stem);
    let mut suffix = 2;
    while used.contains(&candidate) {
        candidate = format!("{}_{}.html", stem, suffix);
        suffix += 1;
    }

    used.insert(candidate.clone());
    candidate
}

/// Lists the files saved for an item's thread, sorted by name
pub fn saved_comment_files(save_root: &Path, folder_name: &str) -> std::io::Result<Vec<String>> {
    let dir = save_root.join(folder_name).join(COMMENTS_DIR);
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        names.push(entry?.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}
