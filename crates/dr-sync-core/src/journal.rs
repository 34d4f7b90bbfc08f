use std::sync::Arc;

use tracing::debug;

use crate::error::SyncError;
use crate::model::{BackupInfo, FileDiff};
use crate::store::MetadataStore;

/// Append-only persistence boundary for diffs and backup relationships.
///
/// Store failures surface as `SyncError::Persistence`; nothing is retried.
#[derive(Clone)]
pub struct DiffJournal {
    store: Arc<dyn MetadataStore>,
}

impl std::fmt::Debug for DiffJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffJournal").finish_non_exhaustive()
    }
}

impl DiffJournal {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    pub async fn append_diff(&self, diff: &FileDiff) -> Result<u64, SyncError> {
        let id = self.store.insert_file_diff(diff).await.map_err(persistence)?;
        debug!(
            "Journaled diff {} for {} (offset={:?}, length={:?})",
            id,
            diff.src,
            diff.offset(),
            diff.length()
        );
        Ok(id)
    }

    pub async fn append_backup(&self, info: &BackupInfo) -> Result<(), SyncError> {
        self.store.insert_backup_info(info).await.map_err(persistence)
    }

    /// Supersede whatever backup relationship the rule had with `info`.
    pub async fn replace_backup(&self, info: &BackupInfo) -> Result<(), SyncError> {
        self.store.replace_backup_info(info).await.map_err(persistence)
    }

    pub async fn delete_backup(&self, rule_id: i64) -> Result<bool, SyncError> {
        self.store.delete_backup_info(rule_id).await.map_err(persistence)
    }
}

fn persistence(e: SyncError) -> SyncError {
    match e {
        SyncError::Persistence(_) => e,
        other => SyncError::Persistence(other.to_string()),
    }
}
