use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dr_sync_core::{BackupInfo, FileDiff, FileDiffState, FileInfo, MetadataStore, SyncError};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

/// Persisted backup relationships.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct BackupIndex {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    backups: Vec<BackupInfo>,
}

fn default_version() -> u32 {
    1
}

/// Metadata store over the local filesystem.
///
/// File listings come straight from the directory tree. Backup relationships
/// and the diff journal live in the state directory:
/// ```text
/// {state_dir}/
///   backups.json
///   file_diff.jsonl
/// ```
#[derive(Debug)]
pub struct LocalMetaStore {
    state_dir: PathBuf,
    /// Serializes writes to the state files. Holds the next diff id once
    /// the journal has been scanned.
    write_lock: Mutex<Option<u64>>,
}

impl LocalMetaStore {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            state_dir: state_dir.as_ref().to_path_buf(),
            write_lock: Mutex::new(None),
        }
    }

    fn backups_path(&self) -> PathBuf {
        self.state_dir.join("backups.json")
    }

    fn diffs_path(&self) -> PathBuf {
        self.state_dir.join("file_diff.jsonl")
    }

    async fn ensure_state_dir(&self) -> Result<(), SyncError> {
        fs::create_dir_all(&self.state_dir).await.map_err(|e| {
            SyncError::Persistence(format!(
                "Failed to create state dir {}: {}",
                self.state_dir.display(),
                e
            ))
        })
    }

    async fn load_backups(&self) -> Result<BackupIndex, SyncError> {
        let path = self.backups_path();
        match fs::read_to_string(&path).await {
            Ok(json) => serde_json::from_str(&json).map_err(|e| {
                SyncError::Persistence(format!("Failed to parse {}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BackupIndex::default()),
            Err(e) => Err(SyncError::Persistence(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn save_backups(&self, index: &BackupIndex) -> Result<(), SyncError> {
        self.ensure_state_dir().await?;
        let path = self.backups_path();

        let json = serde_json::to_string_pretty(index).map_err(|e| {
            SyncError::Persistence(format!("Failed to serialize backups: {}", e))
        })?;

        // Write atomically
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &json).await.map_err(|e| {
            SyncError::Persistence(format!("Failed to write {}: {}", temp_path.display(), e))
        })?;
        fs::rename(&temp_path, &path).await.map_err(|e| {
            SyncError::Persistence(format!("Failed to rename to {}: {}", path.display(), e))
        })?;

        debug!("Saved {} backup relationships", index.backups.len());
        Ok(())
    }

    async fn read_diffs(&self) -> Result<Vec<FileDiff>, SyncError> {
        let path = self.diffs_path();
        let file = match fs::File::open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => {
                return Err(SyncError::Persistence(format!(
                    "Failed to open {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let mut diffs = Vec::new();
        let mut lines = BufReader::new(file).lines();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| SyncError::Persistence(format!("Failed to read diff journal: {}", e)))?
        {
            if line.trim().is_empty() {
                continue;
            }
            let diff: FileDiff = serde_json::from_str(&line).map_err(|e| {
                SyncError::Persistence(format!("Failed to parse diff journal entry: {}", e))
            })?;
            diffs.push(diff);
        }
        Ok(diffs)
    }
}

#[async_trait]
impl MetadataStore for LocalMetaStore {
    #[instrument(skip(self), level = "debug")]
    async fn list_files_by_prefix(&self, dir: &str) -> Result<Vec<FileInfo>, SyncError> {
        let mut files = Vec::new();
        let mut pending = vec![PathBuf::from(dir)];

        while let Some(current) = pending.pop() {
            let mut entries = match fs::read_dir(&current).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(SyncError::Persistence(format!(
                        "Failed to list dir {}: {}",
                        current.display(),
                        e
                    )))
                }
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| {
                    SyncError::Persistence(format!("Failed to read dir entry: {}", e))
                })?
            {
                let path = entry.path();
                let metadata = entry.metadata().await.map_err(|e| {
                    SyncError::Persistence(format!(
                        "Failed to get metadata of {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                let path_str = path.to_string_lossy().to_string();

                if metadata.is_dir() {
                    files.push(FileInfo::dir(path_str));
                    pending.push(path);
                } else if metadata.is_file() {
                    files.push(FileInfo::file(path_str, metadata.len()));
                }
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        debug!("Listed {} entries under {}", files.len(), dir);
        Ok(files)
    }

    #[instrument(skip(self), level = "debug")]
    async fn insert_backup_info(&self, info: &BackupInfo) -> Result<(), SyncError> {
        let _guard = self.write_lock.lock().await;
        let mut index = self.load_backups().await?;
        index.backups.push(info.clone());
        self.save_backups(&index).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete_backup_info(&self, rule_id: i64) -> Result<bool, SyncError> {
        let _guard = self.write_lock.lock().await;
        let mut index = self.load_backups().await?;
        let before = index.backups.len();
        index.backups.retain(|b| b.rule_id != rule_id);
        if index.backups.len() == before {
            return Ok(false);
        }
        self.save_backups(&index).await?;
        Ok(true)
    }

    #[instrument(skip(self), level = "debug")]
    async fn replace_backup_info(&self, info: &BackupInfo) -> Result<(), SyncError> {
        let _guard = self.write_lock.lock().await;
        let mut index = self.load_backups().await?;
        index.backups.retain(|b| b.rule_id != info.rule_id);
        index.backups.push(info.clone());
        // Delete and insert land in a single atomic rename.
        self.save_backups(&index).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_backup_info(&self, rule_id: i64) -> Result<Option<BackupInfo>, SyncError> {
        let index = self.load_backups().await?;
        Ok(index.backups.into_iter().find(|b| b.rule_id == rule_id))
    }

    #[instrument(skip(self), level = "debug")]
    async fn list_backup_infos(&self) -> Result<Vec<BackupInfo>, SyncError> {
        Ok(self.load_backups().await?.backups)
    }

    #[instrument(skip(self, diff), level = "debug", fields(src = %diff.src))]
    async fn insert_file_diff(&self, diff: &FileDiff) -> Result<u64, SyncError> {
        let mut next_id = self.write_lock.lock().await;
        self.ensure_state_dir().await?;

        let id = match *next_id {
            Some(id) => id,
            None => {
                self.read_diffs()
                    .await?
                    .iter()
                    .filter_map(|d| d.id)
                    .max()
                    .unwrap_or(0)
                    + 1
            }
        };
        let mut stored = diff.clone();
        stored.id = Some(id);

        let line = serde_json::to_string(&stored).map_err(|e| {
            SyncError::Persistence(format!("Failed to serialize diff: {}", e))
        })?;

        let path = self.diffs_path();
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| {
                SyncError::Persistence(format!("Failed to open {}: {}", path.display(), e))
            })?;
        file.write_all(format!("{}\n", line).as_bytes())
            .await
            .map_err(|e| SyncError::Persistence(format!("Failed to write diff journal: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| SyncError::Persistence(format!("Failed to flush diff journal: {}", e)))?;

        *next_id = Some(id + 1);
        debug!("Appended diff {} for {}", id, diff.src);
        Ok(id)
    }

    #[instrument(skip(self), level = "debug")]
    async fn list_file_diffs(
        &self,
        state: Option<FileDiffState>,
    ) -> Result<Vec<FileDiff>, SyncError> {
        let diffs = self.read_diffs().await?;
        Ok(match state {
            Some(state) => diffs.into_iter().filter(|d| d.state == state).collect(),
            None => diffs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (LocalMetaStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalMetaStore::new(temp_dir.path().join("state"));
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_backup_crud() {
        let (store, _temp) = setup();

        assert!(store.list_backup_infos().await.unwrap().is_empty());
        assert!(store.get_backup_info(1).await.unwrap().is_none());

        store
            .insert_backup_info(&BackupInfo::new(1, "/data/a", "backup:/bk", 60))
            .await
            .unwrap();
        store
            .insert_backup_info(&BackupInfo::new(2, "/data/b", "backup:/bk", 60))
            .await
            .unwrap();
        assert_eq!(store.list_backup_infos().await.unwrap().len(), 2);

        store
            .replace_backup_info(&BackupInfo::new(1, "/data/a", "backup:/other", 120))
            .await
            .unwrap();
        let infos = store.list_backup_infos().await.unwrap();
        assert_eq!(infos.len(), 2);
        let replaced = store.get_backup_info(1).await.unwrap().unwrap();
        assert_eq!(replaced.dest, "backup:/other/");
        assert_eq!(replaced.period, 120);

        assert!(store.delete_backup_info(1).await.unwrap());
        assert!(!store.delete_backup_info(1).await.unwrap());
        assert!(store.get_backup_info(1).await.unwrap().is_none());
        assert!(store.get_backup_info(2).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_backups_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let state_dir = temp_dir.path().join("state");

        LocalMetaStore::new(&state_dir)
            .replace_backup_info(&BackupInfo::new(3, "/data/a", "backup:/bk", 60))
            .await
            .unwrap();

        let reopened = LocalMetaStore::new(&state_dir);
        assert_eq!(reopened.list_backup_infos().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_diff_journal() {
        let (store, _temp) = setup();

        let first = store
            .insert_file_diff(&FileDiff::append("/data/a/f1", 400, 600))
            .await
            .unwrap();
        let second = store
            .insert_file_diff(&FileDiff::append("/data/a/f2", 0, 10))
            .await
            .unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 2);

        let diffs = store.list_file_diffs(None).await.unwrap();
        assert_eq!(diffs.len(), 2);
        assert_eq!(diffs[0].id, Some(1));
        assert_eq!(diffs[0].offset(), Some(400));
        assert_eq!(diffs[0].length(), Some(600));

        let pending = store
            .list_file_diffs(Some(FileDiffState::Pending))
            .await
            .unwrap();
        assert_eq!(pending.len(), 2);
        let applied = store
            .list_file_diffs(Some(FileDiffState::Applied))
            .await
            .unwrap();
        assert!(applied.is_empty());
    }

    #[tokio::test]
    async fn test_diff_ids_continue_after_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let state_dir = temp_dir.path().join("state");

        let store = LocalMetaStore::new(&state_dir);
        for i in 0..3 {
            store
                .insert_file_diff(&FileDiff::append(format!("/data/a/f{}", i), 0, 1))
                .await
                .unwrap();
        }

        let reopened = LocalMetaStore::new(&state_dir);
        let id = reopened
            .insert_file_diff(&FileDiff::append("/data/a/f3", 0, 1))
            .await
            .unwrap();
        assert_eq!(id, 4);
    }

    #[tokio::test]
    async fn test_append_does_not_rescan_journal() {
        let (store, _temp) = setup();
        store
            .insert_file_diff(&FileDiff::append("/data/a/f1", 0, 1))
            .await
            .unwrap();

        // The journal is only scanned for the first id; later appends
        // must not re-read (and here, choke on) earlier lines.
        let mut journal = std::fs::OpenOptions::new()
            .append(true)
            .open(store.diffs_path())
            .unwrap();
        std::io::Write::write_all(&mut journal, b"not json\n").unwrap();

        let id = store
            .insert_file_diff(&FileDiff::append("/data/a/f2", 0, 1))
            .await
            .unwrap();
        assert_eq!(id, 2);
    }

    #[tokio::test]
    async fn test_list_files_by_prefix() {
        let (store, temp) = setup();
        let data = temp.path().join("data");
        std::fs::create_dir_all(data.join("a/sub")).unwrap();
        std::fs::create_dir_all(data.join("ab")).unwrap();
        std::fs::write(data.join("a/f1"), vec![0u8; 1000]).unwrap();
        std::fs::write(data.join("a/sub/f2"), b"hello").unwrap();
        std::fs::write(data.join("ab/f3"), b"other").unwrap();

        let dir = data.join("a").to_string_lossy().to_string();
        let files = store.list_files_by_prefix(&dir).await.unwrap();

        let f1 = files.iter().find(|f| f.path.ends_with("/a/f1")).unwrap();
        assert_eq!(f1.length, 1000);
        assert!(!f1.is_dir);
        assert!(files.iter().any(|f| f.path.ends_with("/a/sub") && f.is_dir));
        assert!(files.iter().any(|f| f.path.ends_with("/a/sub/f2") && f.length == 5));
        assert!(!files.iter().any(|f| f.path.contains("/ab/")));
        assert_eq!(files.len(), 3);
    }

    #[tokio::test]
    async fn test_list_missing_dir_is_empty() {
        let (store, temp) = setup();
        let dir = temp.path().join("missing").to_string_lossy().to_string();
        assert!(store.list_files_by_prefix(&dir).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_unreadable_dir_is_persistence_error() {
        let (store, temp) = setup();
        let file = temp.path().join("plain");
        std::fs::write(&file, b"not a dir").unwrap();

        let err = store
            .list_files_by_prefix(&file.to_string_lossy())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Persistence(_)));
    }
}
