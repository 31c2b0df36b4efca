//! CSV-backed ledger store
//!
//! Every public operation takes the store's lock for its whole
//! read-modify-write cycle, so concurrent pipelines never interleave their
//! halves and never lose each other's updates.

use crate::storage::error::StorageResult;
use crate::storage::schema::{decode_ledger, default_header, encode_ledger, sort_by_position};
use crate::storage::LedgerEntry;
use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// The shared download ledger
///
/// Wrap in `Arc` and hand clones to every task that needs it; the lock lives
/// inside the store so callers cannot bypass it.
#[derive(Debug)]
pub struct CsvLedger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CsvLedger {
    /// Creates a store backed by the file at `path`
    ///
    /// Nothing is read or written until the first operation.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the ledger file with just the header if it does not exist
    pub async fn ensure_initialized(&self) -> StorageResult<()> {
        let _guard = self.lock.lock().await;

        if fs::try_exists(&self.path).await? {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        self.write_unlocked(&default_header(), &[]).await?;
        tracing::info!("Created ledger at {}", self.path.display());
        Ok(())
    }

    /// Returns the header and all rows
    ///
    /// A missing file yields the default header and no rows.
    pub async fn load(&self) -> StorageResult<(Vec<String>, Vec<LedgerEntry>)> {
        let _guard = self.lock.lock().await;
        self.read_unlocked().await
    }

    /// Rewrites the whole ledger with `rows`, sorted by position
    pub async fn replace(&self, header: &[String], mut rows: Vec<LedgerEntry>) -> StorageResult<()> {
        let _guard = self.lock.lock().await;
        sort_by_position(&mut rows);
        self.write_unlocked(header, &rows).await
    }

    /// Appends `entry` unless a row with the same id already exists
    ///
    /// The existence check and the append happen under one lock acquisition,
    /// so racing callers with the same id produce exactly one row.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The row was appended
    /// * `Ok(false)` - A row for this id already existed; nothing was written
    pub async fn append_if_absent(&self, entry: LedgerEntry) -> StorageResult<bool> {
        let _guard = self.lock.lock().await;
        let (header, mut rows) = self.read_unlocked().await?;

        if rows.iter().any(|row| row.item_id == entry.item_id) {
            tracing::debug!(item_id = %entry.item_id, "Ledger already has a row, skipping append");
            return Ok(false);
        }

        rows.push(entry);
        sort_by_position(&mut rows);
        self.write_unlocked(&header, &rows).await?;
        Ok(true)
    }

    /// Drops every row whose id is in `ids` and persists once
    ///
    /// # Returns
    ///
    /// The number of rows removed. Nothing is written when it is zero.
    pub async fn remove_items(&self, ids: &HashSet<String>) -> StorageResult<usize> {
        let _guard = self.lock.lock().await;
        let (header, mut rows) = self.read_unlocked().await?;

        let before = rows.len();
        rows.retain(|row| !ids.contains(&row.item_id));
        let removed = before - rows.len();

        if removed > 0 {
            self.write_unlocked(&header, &rows).await?;
        }
        Ok(removed)
    }

    /// Rewrites positions to match `remote_order` and persists sorted
    ///
    /// Rows whose id appears in `remote_order` get that id's 1-based rank.
    /// Rows missing from it keep their current position; retiring them is
    /// the reconciler's job.
    pub async fn renumber_and_sort(&self, remote_order: &[String]) -> StorageResult<()> {
        let _guard = self.lock.lock().await;
        let (header, mut rows) = self.read_unlocked().await?;

        let ranks: HashMap<&str, u32> = remote_order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), (i + 1) as u32))
            .collect();

        for row in rows.iter_mut() {
            if let Some(&rank) = ranks.get(row.item_id.as_str()) {
                row.position = rank;
            }
        }

        sort_by_position(&mut rows);
        self.write_unlocked(&header, &rows).await
    }

    async fn read_unlocked(&self) -> StorageResult<(Vec<String>, Vec<LedgerEntry>)> {
        match fs::read(&self.path).await {
            Ok(bytes) => decode_ledger(&bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok((default_header(), Vec::new())),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes to a sibling temp file, syncs it, then renames over the ledger
    async fn write_unlocked(&self, header: &[String], rows: &[LedgerEntry]) -> StorageResult<()> {
        let bytes = encode_ledger(header, rows)?;
        let tmp = self.temp_path();

        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("ledger"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
