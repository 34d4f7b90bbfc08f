use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use dr_sync_core::{FileProbe, SyncError};
use tokio::fs;
use tracing::{debug, instrument};

/// Replica probe reading lengths from the local filesystem.
///
/// Accepts plain paths, `file://` URIs and `<mount>:/path` URIs, where each
/// mount name is mapped to a local root directory.
#[derive(Debug, Clone, Default)]
pub struct LocalFsProbe {
    mounts: HashMap<String, PathBuf>,
}

impl LocalFsProbe {
    pub fn new(mounts: HashMap<String, PathBuf>) -> Self {
        Self { mounts }
    }

    /// Map a replica URI to a local path.
    pub fn resolve(&self, uri: &str) -> Result<PathBuf, SyncError> {
        if let Some(path) = uri.strip_prefix("file://") {
            return Ok(PathBuf::from(path));
        }

        match uri.split_once(':') {
            Some((scheme, rest)) if scheme.len() > 1 && !scheme.contains('/') => {
                let root = self.mounts.get(scheme).ok_or_else(|| {
                    SyncError::Probe(format!("No mount configured for scheme '{}'", scheme))
                })?;
                Ok(root.join(rest.trim_start_matches('/')))
            }
            _ => Ok(PathBuf::from(uri)),
        }
    }
}

#[async_trait]
impl FileProbe for LocalFsProbe {
    #[instrument(skip(self), level = "debug")]
    async fn length(&self, uri: &str) -> Result<u64, SyncError> {
        let path = self.resolve(uri)?;
        let metadata = fs::metadata(&path).await.map_err(|e| {
            SyncError::Probe(format!("Failed to stat {}: {}", path.display(), e))
        })?;
        if !metadata.is_file() {
            return Err(SyncError::Probe(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        debug!("Replica {} is {} bytes", path.display(), metadata.len());
        Ok(metadata.len())
    }
}
