use async_trait::async_trait;

use crate::error::SyncError;

/// Reads the current length of a replica file.
#[async_trait]
pub trait FileProbe: Send + Sync {
    /// Length in bytes of the file at `uri`.
    ///
    /// Unreachable targets, missing files and I/O errors are all reported as
    /// `SyncError::Probe`.
    async fn length(&self, uri: &str) -> Result<u64, SyncError>;
}
