use async_trait::async_trait;

use crate::error::SyncError;
use crate::model::{BackupInfo, FileDiff, FileDiffState, FileInfo};

/// Metadata store abstraction: file listings plus backup and diff persistence.
///
/// The store is the source of truth for backup relationships; every failure
/// is reported as `SyncError::Persistence`.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// List every entry (files and directories) below `dir`.
    async fn list_files_by_prefix(&self, dir: &str) -> Result<Vec<FileInfo>, SyncError>;

    /// Insert a backup relationship.
    async fn insert_backup_info(&self, info: &BackupInfo) -> Result<(), SyncError>;

    /// Delete the backup relationship of a rule, if any.
    ///
    /// # Returns
    /// Whether an entry was removed
    async fn delete_backup_info(&self, rule_id: i64) -> Result<bool, SyncError>;

    /// Atomically replace the backup relationship of `info.rule_id`.
    ///
    /// Either the old entry is gone and `info` is stored, or nothing changed.
    async fn replace_backup_info(&self, info: &BackupInfo) -> Result<(), SyncError>;

    /// Get the backup relationship of a rule.
    async fn get_backup_info(&self, rule_id: i64) -> Result<Option<BackupInfo>, SyncError>;

    /// List all persisted backup relationships.
    async fn list_backup_infos(&self) -> Result<Vec<BackupInfo>, SyncError>;

    /// Append a diff to the journal.
    ///
    /// # Returns
    /// The journal id assigned to the diff
    async fn insert_file_diff(&self, diff: &FileDiff) -> Result<u64, SyncError>;

    /// List journal entries, optionally restricted to one state.
    async fn list_file_diffs(
        &self,
        state: Option<FileDiffState>,
    ) -> Result<Vec<FileDiff>, SyncError>;
}
