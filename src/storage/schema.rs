//! Ledger file format
//!
//! The ledger is a UTF-8 CSV file with the header
//! `position,item_id,title,downloaded_at,folder_name` followed by one row per
//! item, sorted by position ascending.

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::{DownloadStatus, LedgerEntry};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};

/// Column names of the ledger file, in order
pub const LEDGER_COLUMNS: [&str; 5] = [
    "position",
    "item_id",
    "title",
    "downloaded_at",
    "folder_name",
];

/// Returns the header written to a fresh ledger
pub fn default_header() -> Vec<String> {
    LEDGER_COLUMNS.iter().map(|c| c.to_string()).collect()
}

/// Parses ledger bytes into a header and rows
///
/// An empty file yields the default header and no rows. Rows that cannot be
/// parsed are skipped with a warning rather than failing the whole load.
pub fn decode_ledger(bytes: &[u8]) -> StorageResult<(Vec<String>, Vec<LedgerEntry>)> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut records = reader.records();

    let header = match records.next() {
        Some(record) => record?.iter().map(|f| f.to_string()).collect(),
        None => return Ok((default_header(), Vec::new())),
    };

    let mut rows = Vec::new();
    for (index, record) in records.enumerate() {
        let record = record?;
        match parse_row(&record) {
            Ok(entry) => rows.push(entry),
            Err(reason) => {
                // +2: one for the header, one for 1-based line numbers
                tracing::warn!("Skipping malformed ledger row {}: {}", index + 2, reason);
            }
        }
    }

    Ok((header, rows))
}

/// Serializes a header and rows into CSV bytes
///
/// Rows are written in the order given; callers sort first.
pub fn encode_ledger(header: &[String], rows: &[LedgerEntry]) -> StorageResult<Vec<u8>> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());

    writer.write_record(header)?;
    for row in rows {
        writer.write_record(&entry_to_record(row))?;
    }

    writer
        .into_inner()
        .map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Sorts rows by position, keeping the existing order between equal positions
pub fn sort_by_position(rows: &mut [LedgerEntry]) {
    rows.sort_by_key(|row| row.position);
}

fn parse_row(record: &StringRecord) -> Result<LedgerEntry, String> {
    if record.len() < LEDGER_COLUMNS.len() {
        return Err(format!(
            "expected {} columns, found {}",
            LEDGER_COLUMNS.len(),
            record.len()
        ));
    }

    let position = record[0]
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid position '{}': {}", &record[0], e))?;

    let item_id = record[1].to_string();
    if item_id.is_empty() {
        return Err("empty item_id".to_string());
    }

    let downloaded_at = DownloadStatus::from_field(&record[3])
        .ok_or_else(|| format!("invalid downloaded_at '{}'", &record[3]))?;

    Ok(LedgerEntry {
        position,
        item_id,
        title: record[2].to_string(),
        downloaded_at,
        folder_name: record[4].to_string(),
    })
}

fn entry_to_record(entry: &LedgerEntry) -> [String; 5] {
    [
        entry.position.to_string(),
        entry.item_id.clone(),
        entry.title.clone(),
        entry.downloaded_at.to_field(),
        entry.folder_name.clone(),
    ]
}
