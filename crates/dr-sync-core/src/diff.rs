use std::sync::Arc;

use tracing::debug;

use crate::model::{FileDiff, FileInfo};
use crate::path::replica_path;
use crate::probe::FileProbe;

/// Decide the append needed to bring a replica of `source_len` bytes up to date.
///
/// Returns `None` when the replica is already as long as the source, or longer.
pub fn append_diff(path: &str, source_len: u64, replica_len: u64) -> Option<FileDiff> {
    if replica_len >= source_len {
        return None;
    }
    Some(FileDiff::append(path, replica_len, source_len - replica_len))
}

/// Compares primary files against their replicas and emits append diffs.
pub struct DiffComputer {
    probe: Arc<dyn FileProbe>,
}

impl std::fmt::Debug for DiffComputer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffComputer").finish_non_exhaustive()
    }
}

impl DiffComputer {
    pub fn new(probe: Arc<dyn FileProbe>) -> Self {
        Self { probe }
    }

    /// Reconcile every file below `source_dir` with its copy under `dest`.
    ///
    /// Directories and entries outside `source_dir` are skipped. A replica
    /// that cannot be probed counts as empty, so the whole file is resent.
    pub async fn reconcile(
        &self,
        source_dir: &str,
        dest: &str,
        source_files: &[FileInfo],
    ) -> Vec<FileDiff> {
        let mut diffs = Vec::new();

        for file in source_files.iter().filter(|f| !f.is_dir) {
            let Some(remote) = replica_path(source_dir, dest, &file.path) else {
                debug!("Skipping {}: not under {}", file.path, source_dir);
                continue;
            };

            let remote_len = match self.probe.length(&remote).await {
                Ok(len) => len,
                Err(e) => {
                    debug!("Probe of {} failed, assuming empty replica: {}", remote, e);
                    0
                }
            };

            match append_diff(&file.path, file.length, remote_len) {
                Some(diff) => diffs.push(diff),
                None => debug!(
                    "Primary len={}, remote len={} for {}",
                    file.length, remote_len, file.path
                ),
            }
        }

        diffs
    }
}
