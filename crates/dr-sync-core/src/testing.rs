//! In-memory collaborators for unit tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::SyncError;
use crate::model::{BackupInfo, FileDiff, FileDiffState, FileInfo};
use crate::path::relative_to;
use crate::probe::FileProbe;
use crate::store::MetadataStore;

#[derive(Default)]
struct StoreState {
    files: Vec<FileInfo>,
    backups: BTreeMap<i64, BackupInfo>,
    diffs: Vec<FileDiff>,
}

/// Metadata store backed by memory, with switchable failures.
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<StoreState>,
    pub fail_listing: AtomicBool,
    pub fail_diff_insert: AtomicBool,
    pub fail_backup_write: AtomicBool,
    pub fail_backup_delete: AtomicBool,
}

impl FakeStore {
    pub fn with_files(files: Vec<FileInfo>) -> Self {
        let store = Self::default();
        store.state.lock().unwrap().files = files;
        store
    }

    pub fn diffs(&self) -> Vec<FileDiff> {
        self.state.lock().unwrap().diffs.clone()
    }

    pub fn backup(&self, rule_id: i64) -> Option<BackupInfo> {
        self.state.lock().unwrap().backups.get(&rule_id).cloned()
    }

    pub fn put_backup(&self, info: BackupInfo) {
        self.state.lock().unwrap().backups.insert(info.rule_id, info);
    }

    pub fn fail(flag: &AtomicBool, on: bool) {
        flag.store(on, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool, what: &str) -> Result<(), SyncError> {
        if flag.load(Ordering::SeqCst) {
            return Err(SyncError::Persistence(format!("{} failed", what)));
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for FakeStore {
    async fn list_files_by_prefix(&self, dir: &str) -> Result<Vec<FileInfo>, SyncError> {
        Self::check(&self.fail_listing, "listing")?;
        let state = self.state.lock().unwrap();
        Ok(state
            .files
            .iter()
            .filter(|f| relative_to(dir, &f.path).is_some())
            .cloned()
            .collect())
    }

    async fn insert_backup_info(&self, info: &BackupInfo) -> Result<(), SyncError> {
        Self::check(&self.fail_backup_write, "insert backup")?;
        self.put_backup(info.clone());
        Ok(())
    }

    async fn delete_backup_info(&self, rule_id: i64) -> Result<bool, SyncError> {
        Self::check(&self.fail_backup_delete, "delete backup")?;
        Ok(self.state.lock().unwrap().backups.remove(&rule_id).is_some())
    }

    async fn replace_backup_info(&self, info: &BackupInfo) -> Result<(), SyncError> {
        Self::check(&self.fail_backup_write, "replace backup")?;
        self.put_backup(info.clone());
        Ok(())
    }

    async fn get_backup_info(&self, rule_id: i64) -> Result<Option<BackupInfo>, SyncError> {
        Ok(self.backup(rule_id))
    }

    async fn list_backup_infos(&self) -> Result<Vec<BackupInfo>, SyncError> {
        Ok(self.state.lock().unwrap().backups.values().cloned().collect())
    }

    async fn insert_file_diff(&self, diff: &FileDiff) -> Result<u64, SyncError> {
        Self::check(&self.fail_diff_insert, "insert diff")?;
        let mut state = self.state.lock().unwrap();
        let id = state.diffs.len() as u64 + 1;
        let mut stored = diff.clone();
        stored.id = Some(id);
        state.diffs.push(stored);
        Ok(id)
    }

    async fn list_file_diffs(
        &self,
        state: Option<FileDiffState>,
    ) -> Result<Vec<FileDiff>, SyncError> {
        Ok(self
            .diffs()
            .into_iter()
            .filter(|d| state.is_none_or(|s| d.state == s))
            .collect())
    }
}

/// Probe answering from a fixed table; unknown uris fail.
#[derive(Default)]
pub struct ScriptedProbe {
    lengths: HashMap<String, u64>,
    pub probed: Mutex<Vec<String>>,
}

impl ScriptedProbe {
    pub fn with(entries: &[(&str, u64)]) -> Self {
        Self {
            lengths: entries.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            probed: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl FileProbe for ScriptedProbe {
    async fn length(&self, uri: &str) -> Result<u64, SyncError> {
        self.probed.lock().unwrap().push(uri.to_string());
        self.lengths
            .get(uri)
            .copied()
            .ok_or_else(|| SyncError::Probe(format!("{} unreachable", uri)))
    }
}
