//! Reconciliation between the remote index and the local ledger
//!
//! Each poll compares the ids on the index with the ids in the ledger.
//! Ids only on the index are new work; ids only in the ledger are retired,
//! which removes both their row and their artifact directory.

use crate::crawler::parser::IndexEntry;
use crate::storage::{CsvLedger, LedgerEntry};
use crate::Result;
use std::collections::HashSet;
use std::path::Path;

/// Delta between one index snapshot and the ledger
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// Ledger rows whose id is no longer on the index
    pub removed: Vec<LedgerEntry>,

    /// Index entries whose id is not yet in the ledger, in index order
    pub additions: Vec<IndexEntry>,
}

/// Returns `local_ids - remote_ids`
pub fn diff(remote_ids: &HashSet<String>, local_ids: &HashSet<String>) -> HashSet<String> {
    local_ids.difference(remote_ids).cloned().collect()
}

/// Computes what to retire and what to fetch for one poll
///
/// `additions` keeps the snapshot's order so dispatch follows the index.
pub fn reconcile(snapshot: &[IndexEntry], rows: &[LedgerEntry]) -> Reconciliation {
    let remote_ids: HashSet<String> = snapshot.iter().map(|e| e.item_id.clone()).collect();
    let local_ids: HashSet<String> = rows.iter().map(|r| r.item_id.clone()).collect();

    let removed_ids = diff(&remote_ids, &local_ids);

    Reconciliation {
        removed: rows
            .iter()
            .filter(|r| removed_ids.contains(&r.item_id))
            .cloned()
            .collect(),
        additions: snapshot
            .iter()
            .filter(|e| !local_ids.contains(&e.item_id))
            .cloned()
            .collect(),
    }
}

/// Deletes the artifact directories of `removed` and drops their rows
///
/// Directories are deleted first, then the ledger is rewritten once for the
/// whole batch. A directory that is already gone is not an error; any other
/// deletion failure is logged and the row is still dropped.
///
/// # Returns
///
/// The number of ledger rows removed
pub async fn retire(ledger: &CsvLedger, save_root: &Path, removed: &[LedgerEntry]) -> Result<usize> {
    if removed.is_empty() {
        return Ok(0);
    }

    for row in removed {
        remove_artifact_dir(save_root, row).await;
    }

    let ids: HashSet<String> = removed.iter().map(|r| r.item_id.clone()).collect();
    let count = ledger.remove_items(&ids).await?;

    tracing::info!("Retired {} items no longer on the index", count);
    Ok(count)
}

async fn remove_artifact_dir(save_root: &Path, row: &LedgerEntry) {
    if row.folder_name.is_empty() {
        tracing::warn!(item_id = %row.item_id, "Row has no folder name, nothing to delete");
        return;
    }

    let dir = save_root.join(&row.folder_name);
    match tokio::fs::remove_dir_all(&dir).await {
        Ok(()) => {
            tracing::info!(item_id = %row.item_id, "Removed old data in {}", dir.display());
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(item_id = %row.item_id, "No artifact directory to remove");
        }
        Err(e) => {
            tracing::error!(item_id = %row.item_id, "Failed to remove {}: {}", dir.display(), e);
        }
    }
}
