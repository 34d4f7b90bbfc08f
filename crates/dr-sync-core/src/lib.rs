//! Core of the sync rule plugin.
//!
//! When a rule carries a `sync` action, the plugin turns it into a
//! continuously maintained backup from the rule's directories to a replica:
//! - `DiffComputer`: compares primary files with replica lengths and emits append diffs
//! - `DiffJournal`: persists diffs and backup relationships through the `MetadataStore`
//! - `BackupRegistry`: concurrency-safe in-memory index of active relationships
//! - `query`: rewrites the rule's selection so queued files are not reselected
//! - `SyncPlugin`: the `RuleExecutorPlugin` composing all of the above

mod diff;
mod error;
mod journal;
mod model;
pub mod path;
mod plugin;
mod probe;
pub mod query;
mod registry;
mod rule;
mod store;

#[cfg(test)]
mod testing;

pub use diff::{append_diff, DiffComputer};
pub use error::SyncError;
pub use journal::DiffJournal;
pub use model::{
    BackupInfo, FileDiff, FileDiffState, FileDiffType, FileInfo, PARAM_LENGTH, PARAM_OFFSET,
    UNOWNED_RULE_ID,
};
pub use plugin::{Activation, SkipReason, SyncPlugin};
pub use probe::FileProbe;
pub use registry::{BackupRegistry, Deregistration, LockedBackupRegistry};
pub use rule::{
    ActionSpec, CmdletDescriptor, RuleExecutorPlugin, RuleInfo, ScheduleInfo, TranslateResult,
    SYNC_ACTION, SYNC_ARG_DEST, SYNC_ARG_SRC,
};
pub use store::MetadataStore;
