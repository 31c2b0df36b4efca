//! Per-item download pipeline
//!
//! One pipeline run handles one newly listed item: it makes sure the artifact
//! directory exists, fetches the external page, saves it, and records the
//! result in the ledger. Successes and failures both end up as a ledger row,
//! so a failed item is not retried on the next poll.

use crate::crawler::fetcher::Fetcher;
use crate::crawler::parser::IndexEntry;
use crate::storage::{CsvLedger, DownloadStatus, LedgerEntry};
use crate::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Everything the pipeline needs to know about one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemJob {
    /// Rank on the index at dispatch time
    pub position: u32,

    /// URL of the item's external page
    pub external_link: String,

    pub item_id: String,

    pub title: String,

    /// Artifact directory name under the save root
    pub folder_name: String,
}

impl ItemJob {
    /// Builds a job from an index entry at the given 1-based rank
    pub fn from_index(entry: &IndexEntry, position: u32) -> Self {
        Self {
            position,
            external_link: entry.link.clone(),
            item_id: entry.item_id.clone(),
            title: entry.title.clone(),
            folder_name: crate::crawler::parser::folder_name_for(&entry.item_id),
        }
    }
}

/// Result of one pipeline run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemOutcome {
    /// True only when the page was saved and a new row appended
    pub loaded: bool,

    /// Bytes fetched for the external page
    pub size: u64,

    /// Time spent fetching the external page
    pub duration: Duration,
}

/// Runs item jobs against a shared fetcher and ledger
#[derive(Debug, Clone)]
pub struct ItemPipeline {
    fetcher: Arc<Fetcher>,
    ledger: Arc<CsvLedger>,
    save_root: PathBuf,
    external_timeout: Duration,
}

impl ItemPipeline {
    pub fn new(
        fetcher: Arc<Fetcher>,
        ledger: Arc<CsvLedger>,
        save_root: impl Into<PathBuf>,
        external_timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            ledger,
            save_root: save_root.into(),
            external_timeout,
        }
    }

    /// Path of the saved external page for an item
    pub fn external_page_path(&self, job: &ItemJob) -> PathBuf {
        self.save_root
            .join(&job.folder_name)
            .join(format!("{}_external.html", job.item_id))
    }

    /// Processes one item
    ///
    /// # Steps
    ///
    /// 1. Create the artifact directory (idempotent)
    /// 2. Fetch the external page
    /// 3. On success, save it and append a timestamped row unless one exists
    /// 4. On any failure, including an unusable directory, append a row
    ///    carrying the failure sentinel
    ///
    /// # Returns
    ///
    /// * `Ok(ItemOutcome)` - The item was recorded (or already present)
    /// * `Err(MirrorError)` - The ledger could not be written
    pub async fn process(&self, job: &ItemJob) -> Result<ItemOutcome> {
        let item_dir = self.save_root.join(&job.folder_name);
        if let Err(e) = tokio::fs::create_dir_all(&item_dir).await {
            tracing::error!(item_id = %job.item_id, "Cannot create {}: {}", item_dir.display(), e);
            return self.record_failure(job).await;
        }

        let fetched = self
            .fetcher
            .fetch(&job.external_link, self.external_timeout)
            .await;

        if let Some(content) = fetched.content {
            let path = self.external_page_path(job);
            match tokio::fs::write(&path, content.as_bytes()).await {
                Ok(()) => {
                    tracing::info!("Saved content to {}", path.display());

                    let appended = self
                        .ledger
                        .append_if_absent(self.entry(job, DownloadStatus::now()))
                        .await?;

                    if appended {
                        tracing::info!(item_id = %job.item_id, title = %job.title, "Loaded item");
                    }

                    return Ok(ItemOutcome {
                        loaded: appended,
                        size: fetched.size,
                        duration: fetched.duration,
                    });
                }
                Err(e) => {
                    tracing::error!(
                        item_id = %job.item_id,
                        "Error saving to {}: {}",
                        path.display(),
                        e
                    );
                }
            }
        }

        self.record_failure(job).await
    }

    async fn record_failure(&self, job: &ItemJob) -> Result<ItemOutcome> {
        let appended = self
            .ledger
            .append_if_absent(self.entry(job, DownloadStatus::Failed))
            .await?;

        if appended {
            tracing::warn!(item_id = %job.item_id, url = %job.external_link, "Recorded download failure");
        }

        Ok(ItemOutcome::default())
    }

    fn entry(&self, job: &ItemJob, downloaded_at: DownloadStatus) -> LedgerEntry {
        LedgerEntry {
            position: job.position,
            item_id: job.item_id.clone(),
            title: job.title.clone(),
            downloaded_at,
            folder_name: job.folder_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UserAgentConfig;
    use crate::crawler::fetcher::build_http_client;
    use std::path::Path;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn pipeline(root: &Path) -> ItemPipeline {
        let client = build_http_client(&UserAgentConfig::default()).unwrap();
        let fetcher = Arc::new(Fetcher::new(client, 5, Duration::ZERO, 1024 * 1024));
        let ledger = Arc::new(CsvLedger::new(root.join("ledger.csv")));
        ItemPipeline::new(fetcher, ledger, root, Duration::from_millis(300))
    }

    fn job(id: &str, link: String) -> ItemJob {
        ItemJob {
            position: 1,
            external_link: link,
            item_id: id.to_string(),
            title: format!("Story {}", id),
            folder_name: id.to_string(),
        }
    }

    #[test]
    fn test_job_from_index() {
        let entry = IndexEntry {
            item_id: "99".to_string(),
            title: "Hello".to_string(),
            link: "https://example.com/".to_string(),
        };
        let job = ItemJob::from_index(&entry, 4);
        assert_eq!(job.position, 4);
        assert_eq!(job.folder_name, "99");
        assert_eq!(job.external_link, "https://example.com/");
    }

    #[tokio::test]
    async fn test_successful_item_is_saved_and_recorded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/story"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(b"<html>story</html>".to_vec(), "text/html"),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(dir.path());
        let job = job("10", format!("{}/story", server.uri()));

        let outcome = pipeline.process(&job).await.unwrap();
        assert!(outcome.loaded);
        assert_eq!(outcome.size, 18);

        let saved = std::fs::read_to_string(pipeline.external_page_path(&job)).unwrap();
        assert_eq!(saved, "<html>story</html>");

        let (_, rows) = pipeline.ledger.load().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].downloaded_at.is_downloaded());
        assert_eq!(rows[0].title, "Story 10");
    }

    #[tokio::test]
    async fn test_failed_fetch_records_sentinel() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(dir.path());
        let job = job("D", format!("{}/slow", server.uri()));

        let outcome = pipeline.process(&job).await.unwrap();
        assert_eq!(outcome, ItemOutcome::default());

        assert!(dir.path().join("D").is_dir());
        assert!(!pipeline.external_page_path(&job).exists());

        let (_, rows) = pipeline.ledger.load().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].downloaded_at, DownloadStatus::Failed);
    }

    #[tokio::test]
    async fn test_unusable_directory_records_sentinel() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("blocked"), "a file, not a directory").unwrap();

        let pipeline = pipeline(dir.path());
        let job = job("blocked", "http://127.0.0.1:9/".to_string());

        let outcome = pipeline.process(&job).await.unwrap();
        assert_eq!(outcome, ItemOutcome::default());

        let (_, rows) = pipeline.ledger.load().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].item_id, "blocked");
        assert_eq!(rows[0].downloaded_at, DownloadStatus::Failed);
    }

    #[tokio::test]
    async fn test_existing_row_is_not_duplicated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(b"<html></html>".to_vec(), "text/html"),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(dir.path());
        let job = job("5", server.uri());

        assert!(pipeline.process(&job).await.unwrap().loaded);

        let again = pipeline.process(&job).await.unwrap();
        assert!(!again.loaded);
        assert_eq!(again.size, 13);

        let (_, rows) = pipeline.ledger.load().await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_racing_pipelines_for_same_item() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(b"<html></html>".to_vec(), "text/html"),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(dir.path());
        let job = job("race", server.uri());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pipeline = pipeline.clone();
            let job = job.clone();
            handles.push(tokio::spawn(async move { pipeline.process(&job).await.unwrap() }));
        }

        let mut loaded = 0;
        for handle in handles {
            if handle.await.unwrap().loaded {
                loaded += 1;
            }
        }

        assert_eq!(loaded, 1);
        let (_, rows) = pipeline.ledger.load().await.unwrap();
        assert_eq!(rows.len(), 1);
    }
}
