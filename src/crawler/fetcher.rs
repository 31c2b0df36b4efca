//! HTTP fetcher implementation
//!
//! This module is the only place that talks to the network. It handles:
//! - Building the HTTP client with a proper user agent string
//! - A global permit pool bounding in-flight requests
//! - A fixed delay charged to each permit before its request
//! - Content-Type and Content-Length guards
//! - Error classification
//!
//! Failures never propagate as errors: every fetch yields a `FetchResult`,
//! empty when anything went wrong.

use crate::config::{FetcherConfig, UserAgentConfig};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Content types accepted as pages
const ACCEPTED_CONTENT_TYPES: [&str; 2] = ["text/html", "application/xhtml+xml"];

/// Classified result of a single GET
#[derive(Debug)]
pub enum FetchOutcome {
    /// Successfully fetched and decoded the page
    Success {
        /// Final URL after redirects
        final_url: String,
        /// Page body
        body: String,
    },

    /// Response is not an HTML type
    ContentMismatch {
        /// The Content-Type received, empty if absent
        content_type: String,
    },

    /// Declared or actual body size exceeds the cap
    TooLarge {
        /// Bytes declared or read before giving up
        size: u64,
    },

    /// Non-success HTTP status
    HttpError { status_code: u16 },

    /// Connection failure, timeout, or protocol error
    NetworkError { error: String },

    /// Body was not valid UTF-8
    DecodeError { error: String },
}

/// What callers of the fetcher get back
///
/// `content` is `None` for every kind of failure; `size` and `duration` are
/// zero in that case.
#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    /// Page body, if it was retrieved
    pub content: Option<String>,

    /// Size of the body in bytes
    pub size: u64,

    /// Time from sending the request to finishing the body
    pub duration: Duration,
}

/// Builds an HTTP client with proper configuration
///
/// Per-request timeouts are applied by the caller; the client only carries
/// the user agent and connection defaults.
///
/// # Example
///
/// ```no_run
/// use hn_mirror::config::UserAgentConfig;
/// use hn_mirror::crawler::build_http_client;
///
/// let client = build_http_client(&UserAgentConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Performs one GET and classifies the response
///
/// # Request Flow
///
/// 1. Send GET with `timeout`
/// 2. Non-2xx status → HttpError
/// 3. Content-Type not HTML → ContentMismatch
/// 4. Declared Content-Length over `max_size` → TooLarge
/// 5. Read the body in chunks, aborting once it passes `max_size`
/// 6. Decode as UTF-8, else DecodeError
pub async fn fetch_url(client: &Client, url: &str, timeout: Duration, max_size: u64) -> FetchOutcome {
    let mut response = match client.get(url).timeout(timeout).send().await {
        Ok(response) => response,
        Err(e) => return classify_error(e),
    };

    let status = response.status();
    if !status.is_success() {
        return FetchOutcome::HttpError {
            status_code: status.as_u16(),
        };
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if !is_html_content_type(&content_type) {
        return FetchOutcome::ContentMismatch { content_type };
    }

    let declared = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    if let Some(size) = declared {
        if size > max_size {
            return FetchOutcome::TooLarge { size };
        }
    }

    let final_url = response.url().to_string();

    let mut body = Vec::with_capacity(declared.unwrap_or(0) as usize);
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                body.extend_from_slice(&chunk);
                if body.len() as u64 > max_size {
                    return FetchOutcome::TooLarge {
                        size: body.len() as u64,
                    };
                }
            }
            Ok(None) => break,
            Err(e) => return classify_error(e),
        }
    }

    match String::from_utf8(body) {
        Ok(body) => FetchOutcome::Success { final_url, body },
        Err(e) => FetchOutcome::DecodeError {
            error: e.to_string(),
        },
    }
}

fn is_html_content_type(content_type: &str) -> bool {
    let lowered = content_type.to_ascii_lowercase();
    ACCEPTED_CONTENT_TYPES.iter().any(|t| lowered.contains(t))
}

fn classify_error(e: reqwest::Error) -> FetchOutcome {
    if e.is_timeout() {
        FetchOutcome::NetworkError {
            error: "Request timeout".to_string(),
        }
    } else if e.is_connect() {
        FetchOutcome::NetworkError {
            error: "Connection refused".to_string(),
        }
    } else if e.is_decode() {
        FetchOutcome::DecodeError {
            error: e.to_string(),
        }
    } else {
        FetchOutcome::NetworkError {
            error: e.to_string(),
        }
    }
}

/// Rate-limited fetcher shared by every task in the process
///
/// Holds the global permit pool. Each request acquires one permit, waits the
/// request delay while holding it, then sends; the permit is released when
/// the body has been read or the fetch failed. With capacity `n` and delay
/// `d` the sustained rate is roughly `n / d` requests per second.
///
/// Construct once and share through `Arc`; tests can build independent
/// instances with their own capacities.
#[derive(Debug)]
pub struct Fetcher {
    client: Client,
    permits: Arc<Semaphore>,
    capacity: usize,
    request_delay: Duration,
    max_content_size: u64,
}

impl Fetcher {
    /// Creates a fetcher with an explicit client and limits
    pub fn new(client: Client, capacity: usize, request_delay: Duration, max_content_size: u64) -> Self {
        Self {
            client,
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            request_delay,
            max_content_size,
        }
    }

    /// Creates a fetcher from configuration
    pub fn from_config(fetcher: &FetcherConfig, user_agent: &UserAgentConfig) -> Result<Self, reqwest::Error> {
        let client = build_http_client(user_agent)?;
        Ok(Self::new(
            client,
            fetcher.max_concurrent_requests as usize,
            fetcher.request_delay(),
            fetcher.max_content_size,
        ))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn request_delay(&self) -> Duration {
        self.request_delay
    }

    /// Fetches `url`, logging and swallowing every failure
    pub async fn fetch(&self, url: &str, timeout: Duration) -> FetchResult {
        // The semaphore is never closed, so acquire only fails if that changes
        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                tracing::error!(url = %url, "Fetcher permit pool closed");
                return FetchResult::default();
            }
        };

        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }

        let start = Instant::now();
        let outcome = fetch_url(&self.client, url, timeout, self.max_content_size).await;
        let duration = start.elapsed();

        match outcome {
            FetchOutcome::Success { final_url, body } => {
                tracing::debug!(
                    url = %url,
                    final_url = %final_url,
                    bytes = body.len(),
                    "Fetched in {:?}",
                    duration
                );
                FetchResult {
                    size: body.len() as u64,
                    content: Some(body),
                    duration,
                }
            }
            FetchOutcome::ContentMismatch { content_type } => {
                tracing::warn!(url = %url, "Skipping non-HTML content ({})", content_type);
                FetchResult::default()
            }
            FetchOutcome::TooLarge { size } => {
                tracing::warn!(
                    url = %url,
                    "Skipping due to large content size ({} bytes, limit {})",
                    size,
                    self.max_content_size
                );
                FetchResult::default()
            }
            FetchOutcome::HttpError { status_code } => {
                tracing::error!(url = %url, "HTTP {}", status_code);
                FetchResult::default()
            }
            FetchOutcome::NetworkError { error } => {
                tracing::error!(url = %url, "Error fetching: {}", error);
                FetchResult::default()
            }
            FetchOutcome::DecodeError { error } => {
                tracing::error!(url = %url, "Could not decode body as text: {}", error);
                FetchResult::default()
            }
        }
    }
}
