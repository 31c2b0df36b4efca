//! Integration tests for the poller
//!
//! These tests use wiremock to stand in for the index, the external pages
//! and the discussion threads, and drive full poll cycles end-to-end.

use hn_mirror::config::Config;
use hn_mirror::crawler::Poller;
use hn_mirror::storage::{DownloadStatus, LedgerEntry};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing every URL at the mock server
fn create_test_config(base_url: &str, root: &Path) -> Config {
    let mut config = Config::default();
    config.poller.index_url = format!("{}/", base_url);
    config.poller.thread_url_template = format!("{}/item?id={{id}}", base_url);
    config.fetcher.request_delay_ms = 0;
    config.fetcher.main_page_timeout_ms = 2_000;
    config.fetcher.external_timeout_ms = 1_000;
    config.output.save_root = root.join("mirror");
    config
}

fn html(body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.into().into_bytes(), "text/html")
}

/// Renders an index page listing `ids` in order, each linking to `/<id>`
fn index_page(base_url: &str, ids: &[&str]) -> String {
    let rows: Vec<String> = ids
        .iter()
        .map(|id| {
            format!(
                r#"<tr class="athing" id="{id}">
                    <td class="title"><span class="rank">.</span></td>
                    <td class="title"><span class="titleline"><a href="{base_url}/{id}">Story {id}</a></span></td>
                </tr>
                <tr><td class="subtext">1 point</td></tr>"#
            )
        })
        .collect();
    format!("<html><body><table>{}</table></body></html>", rows.join("\n"))
}

async fn mount_index(server: &MockServer, ids: &[&str]) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(index_page(&server.uri(), ids)))
        .mount(server)
        .await;
}

async fn mount_pages(server: &MockServer, ids: &[&str]) {
    for id in ids {
        Mock::given(method("GET"))
            .and(path(format!("/{}", id)))
            .respond_with(html(format!("<html>external {}</html>", id)))
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/item"))
        .respond_with(html("<html><body>no comments yet</body></html>"))
        .mount(server)
        .await;
}

async fn poll(poller: &mut Poller) {
    let report = poller.poll_once().await.expect("poll should succeed");
    if report.comments_queued > 0 {
        assert!(poller.finish_comment_crawl().await.is_some());
    }
}

async fn ledger_rows(poller: &Poller) -> Vec<LedgerEntry> {
    poller.ledger().load().await.expect("ledger should load").1
}

fn positions(rows: &[LedgerEntry]) -> Vec<(u32, &str)> {
    rows.iter().map(|r| (r.position, r.item_id.as_str())).collect()
}

#[tokio::test]
async fn test_first_poll_downloads_all_items() {
    let server = MockServer::start().await;
    mount_index(&server, &["a", "b", "c"]).await;
    mount_pages(&server, &["a", "b", "c"]).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path());
    let save_root = config.output.save_root.clone();
    let mut poller = Poller::new(config).await.unwrap();

    poll(&mut poller).await;

    let rows = ledger_rows(&poller).await;
    assert_eq!(positions(&rows), vec![(1, "a"), (2, "b"), (3, "c")]);
    assert!(rows.iter().all(|r| r.downloaded_at.is_downloaded()));
    assert_eq!(rows[1].title, "Story b");

    for id in ["a", "b", "c"] {
        let external = save_root.join(id).join(format!("{}_external.html", id));
        assert_eq!(
            std::fs::read_to_string(external).unwrap(),
            format!("<html>external {}</html>", id)
        );
        assert!(save_root.join(id).join("comments").join("comments.html").is_file());
    }
}

#[tokio::test]
async fn test_vanished_item_is_retired_and_positions_follow_index() {
    let server = MockServer::start().await;
    mount_index(&server, &["a", "b"]).await;
    mount_pages(&server, &["a", "b", "c"]).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path());
    let save_root = config.output.save_root.clone();
    let mut poller = Poller::new(config).await.unwrap();

    poll(&mut poller).await;
    assert!(save_root.join("a").is_dir());

    server.reset().await;
    mount_index(&server, &["b", "c"]).await;
    mount_pages(&server, &["b", "c"]).await;

    poll(&mut poller).await;

    let rows = ledger_rows(&poller).await;
    assert_eq!(positions(&rows), vec![(1, "b"), (2, "c")]);
    assert!(!save_root.join("a").exists());
    assert!(save_root.join("c").join("c_external.html").is_file());
}

#[tokio::test]
async fn test_timed_out_item_records_failure() {
    let server = MockServer::start().await;
    mount_index(&server, &["a", "d"]).await;
    mount_pages(&server, &["a"]).await;
    Mock::given(method("GET"))
        .and(path("/d"))
        .respond_with(html("<html>too late</html>").set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path());
    let save_root = config.output.save_root.clone();
    let mut poller = Poller::new(config).await.unwrap();

    let report = poller.poll_once().await.unwrap();
    assert_eq!(report.statistics.dispatched, 2);
    assert_eq!(report.statistics.successful_loads, 1);

    let rows = ledger_rows(&poller).await;
    assert_eq!(positions(&rows), vec![(1, "a"), (2, "d")]);
    assert_eq!(rows[1].downloaded_at, DownloadStatus::Failed);
    assert!(!save_root.join("d").join("d_external.html").exists());

    // A failed row is not retried while the item stays listed
    let again = poller.poll_once().await.unwrap();
    assert_eq!(again.statistics.dispatched, 0);
    assert_eq!(again.comments_queued, 0);
}

#[tokio::test]
async fn test_index_failure_leaves_ledger_untouched() {
    let server = MockServer::start().await;
    mount_index(&server, &["a", "b"]).await;
    mount_pages(&server, &["a", "b"]).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path());
    let save_root = config.output.save_root.clone();
    let mut poller = Poller::new(config).await.unwrap();

    poll(&mut poller).await;
    let before = ledger_rows(&poller).await;

    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let report = poller.poll_once().await.unwrap();
    assert!(!report.statistics.index_available);
    assert_eq!(ledger_rows(&poller).await, before);
    assert!(save_root.join("a").is_dir());
    assert!(save_root.join("b").is_dir());
}

#[tokio::test]
async fn test_empty_index_does_not_retire_everything() {
    let server = MockServer::start().await;
    mount_index(&server, &["a"]).await;
    mount_pages(&server, &["a"]).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path());
    let mut poller = Poller::new(config).await.unwrap();

    poll(&mut poller).await;

    server.reset().await;
    mount_index(&server, &[]).await;

    let report = poller.poll_once().await.unwrap();
    assert!(!report.statistics.index_available);
    assert_eq!(positions(&ledger_rows(&poller).await), vec![(1, "a")]);
}

#[tokio::test]
async fn test_ledger_survives_restart() {
    let server = MockServer::start().await;
    mount_index(&server, &["a", "b"]).await;
    mount_pages(&server, &["a", "b"]).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path());

    let mut first = Poller::new(config.clone()).await.unwrap();
    poll(&mut first).await;
    drop(first);

    let mut second = Poller::new(config).await.unwrap();
    let report = second.poll_once().await.unwrap();
    assert_eq!(report.statistics.dispatched, 0);
    assert_eq!(
        positions(&ledger_rows(&second).await),
        vec![(1, "a"), (2, "b")]
    );
}

#[tokio::test]
async fn test_pending_comment_crawl_cannot_resurrect_retired_items() {
    let server = MockServer::start().await;
    let base = server.uri();

    // First index response lists a and x; every later one lists only b
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(index_page(&base, &["a", "x"])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(index_page(&base, &["b"])))
        .mount(&server)
        .await;

    for id in ["a", "x", "b"] {
        Mock::given(method("GET"))
            .and(path(format!("/{}", id)))
            .respond_with(html(format!("<html>external {}</html>", id)))
            .mount(&server)
            .await;
    }

    // a's thread links to a slow page, so x's thread is crawled late
    Mock::given(method("GET"))
        .and(path("/item"))
        .and(query_param("id", "a"))
        .respond_with(html(format!(r#"<html><a href="{base}/slow">Slow read</a></html>"#)))
        .mount(&server)
        .await;
    for id in ["x", "b"] {
        Mock::given(method("GET"))
            .and(path("/item"))
            .and(query_param("id", id))
            .respond_with(html("<html>quiet thread</html>"))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(html("<html>slow</html>").set_delay(Duration::from_millis(800)))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&base, dir.path());
    let save_root = config.output.save_root.clone();
    let mut poller = Poller::new(config).await.unwrap();

    let first = poller.poll_once().await.unwrap();
    assert_eq!(first.comments_queued, 2);

    // Runs while the first crawl is still fetching the slow page
    let second = poller.poll_once().await.unwrap();
    assert_eq!(second.statistics.retired, 2);
    poller.finish_comment_crawl().await;

    assert_eq!(positions(&ledger_rows(&poller).await), vec![(1, "b")]);
    assert!(!save_root.join("a").exists());
    assert!(!save_root.join("x").exists());
    assert!(save_root.join("b").join("comments").join("comments.html").is_file());
}
