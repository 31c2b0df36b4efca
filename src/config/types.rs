use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for hn-mirror
///
/// Every section is optional in the TOML file; missing sections and keys fall
/// back to the defaults below.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub poller: PollerConfig,
    pub fetcher: FetcherConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
}

/// Poll loop configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// URL of the ranked index page
    #[serde(rename = "index-url")]
    pub index_url: String,

    /// Discussion thread URL, with `{id}` replaced by the item id
    #[serde(rename = "thread-url-template")]
    pub thread_url_template: String,

    /// Seconds to sleep between polls
    #[serde(rename = "poll-interval-secs")]
    pub poll_interval_secs: u64,

    /// Number of index entries taken from the top of each poll
    #[serde(rename = "top-n")]
    pub top_n: usize,
}

/// Fetcher limits and timeouts
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Size of the global permit pool shared by every request
    #[serde(rename = "max-concurrent-requests")]
    pub max_concurrent_requests: u32,

    /// Delay charged to each permit before its request (milliseconds)
    #[serde(rename = "request-delay-ms")]
    pub request_delay_ms: u64,

    /// Largest response body accepted, in bytes
    #[serde(rename = "max-content-size")]
    pub max_content_size: u64,

    /// Timeout for the index page (milliseconds)
    #[serde(rename = "main-page-timeout-ms")]
    pub main_page_timeout_ms: u64,

    /// Timeout for external, thread and linked pages (milliseconds)
    #[serde(rename = "external-timeout-ms")]
    pub external_timeout_ms: u64,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory holding one artifact directory per item
    #[serde(rename = "save-root")]
    pub save_root: PathBuf,

    /// Path to the CSV ledger; defaults to `<save-root>/downloaded_items.csv`
    #[serde(rename = "ledger-path")]
    pub ledger_path: Option<PathBuf>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            index_url: "https://news.ycombinator.com/".to_string(),
            thread_url_template: "https://news.ycombinator.com/item?id={id}".to_string(),
            poll_interval_secs: 600,
            top_n: 30,
        }
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 5,
            request_delay_ms: 500,
            max_content_size: 10 * 1024 * 1024,
            main_page_timeout_ms: 10_000,
            external_timeout_ms: 10_000,
        }
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "hn-mirror".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/hn-mirror".to_string(),
            contact_email: "admin@example.com".to_string(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            save_root: PathBuf::from("hn_data"),
            ledger_path: None,
        }
    }
}

impl PollerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Builds the discussion thread URL for an item
    pub fn thread_url(&self, item_id: &str) -> String {
        self.thread_url_template.replace("{id}", item_id)
    }
}

impl FetcherConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn main_page_timeout(&self) -> Duration {
        Duration::from_millis(self.main_page_timeout_ms)
    }

    pub fn external_timeout(&self) -> Duration {
        Duration::from_millis(self.external_timeout_ms)
    }
}

impl UserAgentConfig {
    /// Formats the header value: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

impl OutputConfig {
    /// Resolves the ledger path, falling back to a file inside the save root
    pub fn ledger_path(&self) -> PathBuf {
        self.ledger_path
            .clone()
            .unwrap_or_else(|| self.save_root.join("downloaded_items.csv"))
    }
}
