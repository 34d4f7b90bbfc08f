use thiserror::Error;

/// Errors that can occur while maintaining a sync rule's backup state.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Probe error: {0}")]
    Probe(String),

    #[error("Invalid rule: {0}")]
    InvalidRule(String),
}
