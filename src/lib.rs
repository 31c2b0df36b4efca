//! hn-mirror: a polling mirror for a ranked link index
//!
//! This crate polls an index page, downloads each newly listed item's external
//! page and discussion thread, and keeps a durable CSV ledger of what has been
//! downloaded, ordered by the item's current rank on the index.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for hn-mirror operations
///
/// Per-item network failures never surface here; they are recorded in the
/// ledger as failures. This type covers the faults that stop a poll or
/// prevent startup.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Ledger error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Save root {path} is not usable: {source}")]
    SaveRoot {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid poll phase transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::PollPhase,
        to: state::PollPhase,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for hn-mirror operations
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Fetcher, Poller};
pub use state::PollPhase;
pub use storage::{CsvLedger, DownloadStatus, LedgerEntry};
