//! Poll coordinator - the outer loop
//!
//! This module drives one poll cycle after another:
//! - Fetching and parsing the index page
//! - Reconciling it against the ledger and retiring vanished items
//! - Dispatching one item pipeline per new item and awaiting them all
//! - Renumbering ledger positions to the index order
//! - Handing new items to the background comment crawl
//! - Sleeping until the next poll
//!
//! The comment crawl runs in the background across the sleep, but it is always
//! finished before the next poll retires anything, so it never writes into a
//! directory that retirement has already removed.

use crate::config::Config;
use crate::crawler::comments::{CommentCrawler, CommentTarget, CrawlSummary};
use crate::crawler::fetcher::Fetcher;
use crate::crawler::parser::{parse_index, IndexEntry};
use crate::crawler::pipeline::{ItemJob, ItemOutcome, ItemPipeline};
use crate::crawler::reconciler::{reconcile, retire};
use crate::output::PollStatistics;
use crate::state::PollPhase;
use crate::storage::CsvLedger;
use crate::{MirrorError, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::{JoinHandle, JoinSet};
use url::Url;

/// What one call to `Poller::poll_once` did
#[derive(Debug)]
pub struct PollReport {
    pub statistics: PollStatistics,

    /// Items handed to the background comment crawl
    pub comments_queued: usize,
}

/// Main poller structure
pub struct Poller {
    config: Arc<Config>,
    fetcher: Arc<Fetcher>,
    ledger: Arc<CsvLedger>,
    pipeline: ItemPipeline,
    comments: CommentCrawler,
    index_url: Url,
    save_root: PathBuf,
    phase: PollPhase,
    comment_crawl: Option<JoinHandle<CrawlSummary>>,
}

impl Poller {
    /// Creates a new poller instance
    ///
    /// Creates the save root and the ledger file if they are missing. Either
    /// failing is a startup error.
    ///
    /// # Returns
    ///
    /// * `Ok(Poller)` - Ready to poll
    /// * `Err(MirrorError)` - The save root or ledger is not usable, or the HTTP client failed to build
    pub async fn new(config: Config) -> Result<Self> {
        let fetcher = Arc::new(Fetcher::from_config(&config.fetcher, &config.user_agent)?);
        Self::with_fetcher(config, fetcher).await
    }

    /// Creates a poller around an existing fetcher
    ///
    /// Lets several pollers, or a poller and a test, share one permit pool.
    pub async fn with_fetcher(config: Config, fetcher: Arc<Fetcher>) -> Result<Self> {
        let save_root = config.output.save_root.clone();
        tokio::fs::create_dir_all(&save_root)
            .await
            .map_err(|source| MirrorError::SaveRoot {
                path: save_root.display().to_string(),
                source,
            })?;

        let ledger = Arc::new(CsvLedger::new(config.output.ledger_path()));
        ledger.ensure_initialized().await?;

        let index_url = Url::parse(&config.poller.index_url)?;

        let pipeline = ItemPipeline::new(
            Arc::clone(&fetcher),
            Arc::clone(&ledger),
            &save_root,
            config.fetcher.external_timeout(),
        );

        let comments = CommentCrawler::new(
            Arc::clone(&fetcher),
            &save_root,
            config.fetcher.external_timeout(),
            config.fetcher.request_delay(),
        );

        Ok(Self {
            config: Arc::new(config),
            fetcher,
            ledger,
            pipeline,
            comments,
            index_url,
            save_root,
            phase: PollPhase::Sleep,
            comment_crawl: None,
        })
    }

    pub fn ledger(&self) -> &Arc<CsvLedger> {
        &self.ledger
    }

    /// Polls forever, sleeping the configured interval between cycles
    ///
    /// A poll that fails (ledger I/O) is logged and the loop carries on.
    pub async fn run(&mut self) -> Result<()> {
        let interval = self.config.poller.poll_interval();
        tracing::info!(
            "Polling {} every {:?} (top {}, {} concurrent requests, {:?} request delay)",
            self.index_url,
            interval,
            self.config.poller.top_n,
            self.fetcher.capacity(),
            self.fetcher.request_delay()
        );

        loop {
            if let Err(e) = self.poll_once().await {
                tracing::error!("Poll failed: {}", e);
                self.phase = PollPhase::Sleep;
            }

            tracing::debug!("Sleeping {:?} until the next poll", interval);
            tokio::time::sleep(interval).await;
        }
    }

    /// Runs one poll cycle and stops in the `Sleep` phase
    pub async fn poll_once(&mut self) -> Result<PollReport> {
        let poll_start = Instant::now();
        let mut stats = PollStatistics::default();

        self.advance(PollPhase::FetchIndex)?;
        let snapshot = match self.fetch_snapshot().await {
            Some(snapshot) => snapshot,
            None => {
                self.advance(PollPhase::Sleep)?;
                stats.poll_time = poll_start.elapsed();
                return Ok(PollReport {
                    statistics: stats,
                    comments_queued: 0,
                });
            }
        };
        stats.index_available = true;
        stats.snapshot_len = snapshot.len();

        self.advance(PollPhase::Reconcile)?;
        self.finish_comment_crawl().await;
        let (_, rows) = self.ledger.load().await?;
        let delta = reconcile(&snapshot, &rows);
        stats.retired = retire(&self.ledger, &self.save_root, &delta.removed).await?;

        self.advance(PollPhase::Dispatch)?;
        let jobs = self.jobs_for(&snapshot, &delta.additions);
        stats.dispatched = jobs.len();
        let mut tasks = JoinSet::new();
        for job in jobs.iter().cloned() {
            tracing::info!(
                item_id = %job.item_id,
                title = %job.title,
                url = %job.external_link,
                "Processing item"
            );
            let pipeline = self.pipeline.clone();
            tasks.spawn(async move {
                let result = pipeline.process(&job).await;
                (job.item_id, result)
            });
        }

        self.advance(PollPhase::AwaitCompletion)?;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(outcome))) => stats.record(&outcome),
                Ok((item_id, Err(e))) => {
                    tracing::error!(item_id = %item_id, "Item pipeline failed: {}", e);
                    stats.record(&ItemOutcome::default());
                }
                Err(e) => {
                    tracing::error!("Item task panicked or was cancelled: {}", e);
                }
            }
        }

        self.advance(PollPhase::Renumber)?;
        let order: Vec<String> = snapshot.iter().map(|e| e.item_id.clone()).collect();
        self.ledger.renumber_and_sort(&order).await?;

        self.advance(PollPhase::CrawlComments)?;
        let comments_queued = self.spawn_comment_crawl(&jobs);

        stats.poll_time = poll_start.elapsed();
        stats.log_summary();

        self.advance(PollPhase::Sleep)?;
        Ok(PollReport {
            statistics: stats,
            comments_queued,
        })
    }

    /// Fetches and parses the index, returning None when the poll should be skipped
    async fn fetch_snapshot(&self) -> Option<Vec<IndexEntry>> {
        let page = self
            .fetcher
            .fetch(self.index_url.as_str(), self.config.fetcher.main_page_timeout())
            .await;

        let Some(html) = page.content else {
            tracing::warn!("Failed to fetch the index page, retrying after the poll interval");
            return None;
        };

        let snapshot = parse_index(&html, &self.index_url, self.config.poller.top_n);
        if snapshot.is_empty() {
            // Treated like an outage: an empty parse would otherwise retire everything
            tracing::warn!("Index page contained no items, skipping this poll");
            return None;
        }

        tracing::debug!("Index lists {} items", snapshot.len());
        Some(snapshot)
    }

    fn jobs_for(&self, snapshot: &[IndexEntry], additions: &[IndexEntry]) -> Vec<ItemJob> {
        additions
            .iter()
            .filter_map(|entry| {
                let rank = snapshot.iter().position(|e| e.item_id == entry.item_id)?;
                Some(ItemJob::from_index(entry, (rank + 1) as u32))
            })
            .collect()
    }

    /// Waits for the comment crawl started by the previous poll, if any
    ///
    /// Returns `None` when no crawl was pending or its task panicked.
    pub async fn finish_comment_crawl(&mut self) -> Option<CrawlSummary> {
        let handle = self.comment_crawl.take()?;
        if !handle.is_finished() {
            tracing::info!("Waiting for the previous comment crawl to finish");
        }

        match handle.await {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::error!("Comment crawl task panicked or was cancelled: {}", e);
                None
            }
        }
    }

    fn spawn_comment_crawl(&mut self, jobs: &[ItemJob]) -> usize {
        if jobs.is_empty() {
            return 0;
        }

        let targets: Vec<CommentTarget> = jobs
            .iter()
            .map(|job| CommentTarget {
                item_id: job.item_id.clone(),
                folder_name: job.folder_name.clone(),
                thread_url: self.config.poller.thread_url(&job.item_id),
            })
            .collect();

        let queued = targets.len();
        tracing::debug!("Starting comment crawl for {} items", queued);
        let comments = self.comments.clone();
        self.comment_crawl = Some(tokio::spawn(async move { comments.crawl_batch(targets).await }));
        queued
    }

    fn advance(&mut self, to: PollPhase) -> Result<()> {
        if !self.phase.can_transition_to(to) {
            return Err(MirrorError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        tracing::trace!("Poll phase {} -> {}", self.phase, to);
        self.phase = to;
        Ok(())
    }
}

/// Builds a poller from `config` and polls forever
///
/// # Example
///
/// ```no_run
/// use hn_mirror::config::Config;
/// use hn_mirror::crawler::run_poller;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// run_poller(Config::default()).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_poller(config: Config) -> Result<()> {
    let mut poller = Poller::new(config).await?;
    poller.run().await
}
