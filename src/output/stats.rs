//! Statistics for polls and for the ledger as a whole
//!
//! `PollStatistics` is filled in by the coordinator during a poll and logged
//! at the end of it. `LedgerStatistics` summarizes what is on disk and backs
//! the `--stats` command.

use crate::crawler::pipeline::ItemOutcome;
use crate::crawler::saved_comment_files;
use crate::storage::CsvLedger;
use crate::Result;
use std::path::Path;
use std::time::Duration;

/// Counters for one poll cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollStatistics {
    /// False when the index could not be fetched and the poll was skipped
    pub index_available: bool,

    /// Entries taken from the index
    pub snapshot_len: usize,

    /// Items retired because they left the index
    pub retired: usize,

    /// Item pipelines dispatched
    pub dispatched: usize,

    /// Pipelines that saved a page and appended a new row
    pub successful_loads: usize,

    /// Bytes fetched across all pipelines
    pub total_bytes: u64,

    /// Sum of per-item fetch durations; overlaps when pipelines run concurrently
    pub estimated_fetch_time: Duration,

    /// Wall-clock time of the whole poll
    pub poll_time: Duration,
}

impl PollStatistics {
    /// Folds one pipeline outcome into the totals
    pub fn record(&mut self, outcome: &ItemOutcome) {
        if outcome.loaded {
            self.successful_loads += 1;
        }
        self.total_bytes += outcome.size;
        self.estimated_fetch_time += outcome.duration;
    }

    /// Logs the poll summary at info level
    pub fn log_summary(&self) {
        tracing::info!("Retired items: {}", self.retired);
        tracing::info!("Dispatched items: {}", self.dispatched);
        tracing::info!("Successful loads: {}", self.successful_loads);
        tracing::info!("Total data size: {} bytes", self.total_bytes);
        tracing::info!(
            "Estimated total fetch time: {:.2} seconds",
            self.estimated_fetch_time.as_secs_f64()
        );
        tracing::info!("Total poll time: {:.2} seconds", self.poll_time.as_secs_f64());
    }
}

/// Summary of the ledger and the artifacts behind it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerStatistics {
    /// Rows in the ledger
    pub total_items: usize,

    /// Rows with a download timestamp
    pub downloaded: usize,

    /// Rows with the failure sentinel
    pub failed: usize,

    /// Rows whose artifact directory is missing on disk
    pub missing_folders: usize,

    /// Thread and linked pages saved under `comments/` directories
    pub comment_pages: usize,
}

/// Loads statistics from the ledger and the save root
pub async fn load_statistics(ledger: &CsvLedger, save_root: &Path) -> Result<LedgerStatistics> {
    let (_, rows) = ledger.load().await?;

    let mut stats = LedgerStatistics {
        total_items: rows.len(),
        ..Default::default()
    };

    for row in &rows {
        if row.downloaded_at.is_downloaded() {
            stats.downloaded += 1;
        } else {
            stats.failed += 1;
        }

        if !save_root.join(&row.folder_name).is_dir() {
            stats.missing_folders += 1;
            continue;
        }

        if let Ok(files) = saved_comment_files(save_root, &row.folder_name) {
            stats.comment_pages += files.len();
        }
    }

    Ok(stats)
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &LedgerStatistics) {
    println!("=== Ledger Statistics ===\n");

    println!("Items:");
    println!("  Total: {}", stats.total_items);
    println!("  Downloaded: {}", stats.downloaded);
    println!("  Failed: {}", stats.failed);
    println!();

    println!("Artifacts:");
    println!("  Missing folders: {}", stats.missing_folders);
    println!("  Comment pages: {}", stats.comment_pages);
    println!();

    let success_rate = if stats.total_items > 0 {
        (stats.downloaded as f64 / stats.total_items as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Success Rate: {:.1}% ({} / {} items downloaded)",
        success_rate, stats.downloaded, stats.total_items
    );
}
