//! Crawler module for polling and downloading
//!
//! This module contains the core polling logic, including:
//! - Rate-limited HTTP fetching with content guards
//! - Index and thread parsing
//! - Reconciliation of the index against the ledger
//! - The per-item download pipeline and the comment crawl
//! - Overall poll coordination

mod comments;
mod coordinator;
mod fetcher;
mod parser;
pub mod pipeline;
mod reconciler;

pub use comments::{saved_comment_files, CommentCrawler, CommentTarget, CrawlSummary};
pub use coordinator::{run_poller, PollReport, Poller};
pub use fetcher::{build_http_client, fetch_url, FetchOutcome, FetchResult, Fetcher};
pub use parser::{
    extract_thread_links, folder_name_for, parse_index, sanitize_filename, IndexEntry, ThreadLink,
};
pub use pipeline::{ItemJob, ItemOutcome, ItemPipeline};
pub use reconciler::{diff, reconcile, retire, Reconciliation};

use crate::config::Config;
use crate::MirrorError;

/// Runs the poll loop until the process is terminated
///
/// This is the main entry point. It will:
/// 1. Create the save root and ledger if needed
/// 2. Build the HTTP client and permit pool
/// 3. Poll the index, reconcile, download new items, renumber
/// 4. Sleep for the poll interval and repeat
pub async fn poll(config: Config) -> Result<(), MirrorError> {
    run_poller(config).await
}
