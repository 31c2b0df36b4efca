//! Storage module for the download ledger
//!
//! This module owns the durable record of downloaded items:
//! - The CSV file format and its header schema
//! - Whole-file atomic rewrites
//! - A process-wide lock that serializes every read-modify-write cycle

mod csv_ledger;
mod error;
mod schema;

pub use csv_ledger::CsvLedger;
pub use error::{StorageError, StorageResult};
pub use schema::{decode_ledger, default_header, encode_ledger, LEDGER_COLUMNS};

use chrono::{Local, NaiveDateTime};
use std::fmt;

/// Format of the `downloaded_at` column for successful downloads
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Value stored in `downloaded_at` when the external page could not be fetched
pub const FAILURE_SENTINEL: &str = "download failure";

/// Outcome recorded for an item's external page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    /// The external page was fetched and saved at this local time
    Downloaded(NaiveDateTime),

    /// The external page could not be fetched or saved
    Failed,
}

impl DownloadStatus {
    /// Records a successful download at the current local time
    pub fn now() -> Self {
        Self::Downloaded(Local::now().naive_local())
    }

    pub fn is_downloaded(&self) -> bool {
        matches!(self, Self::Downloaded(_))
    }

    /// Converts the status to its ledger column value
    pub fn to_field(&self) -> String {
        match self {
            Self::Downloaded(at) => at.format(TIMESTAMP_FORMAT).to_string(),
            Self::Failed => FAILURE_SENTINEL.to_string(),
        }
    }

    /// Parses a ledger column value
    ///
    /// Returns None if the value is neither the failure sentinel nor a
    /// timestamp in `TIMESTAMP_FORMAT`.
    pub fn from_field(s: &str) -> Option<Self> {
        let s = s.trim();
        if s == FAILURE_SENTINEL {
            return Some(Self::Failed);
        }
        NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
            .ok()
            .map(Self::Downloaded)
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_field())
    }
}

/// One row of the ledger
///
/// Only `position` is ever rewritten after the row is appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    /// 1-based rank on the index as of the last renumbering
    pub position: u32,

    /// Stable external identifier; unique across the ledger
    pub item_id: String,

    /// Title captured when the item was first seen
    pub title: String,

    /// Download timestamp or failure marker
    pub downloaded_at: DownloadStatus,

    /// Artifact directory name under the save root
    pub folder_name: String,
}
