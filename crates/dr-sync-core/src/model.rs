use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Rule id recorded on diffs produced by reconciliation rather than by a rule.
pub const UNOWNED_RULE_ID: i64 = -1;

/// Parameter key holding the byte offset of an append diff.
pub const PARAM_OFFSET: &str = "-offset";

/// Parameter key holding the byte count of an append diff.
pub const PARAM_LENGTH: &str = "-length";

/// Metadata about a file on the primary, as listed by the metadata store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,
    pub length: u64,
    #[serde(default)]
    pub is_dir: bool,
}

impl FileInfo {
    pub fn file(path: impl Into<String>, length: u64) -> Self {
        Self {
            path: path.into(),
            length,
            is_dir: false,
        }
    }

    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            length: 0,
            is_dir: true,
        }
    }
}

/// One active continuous-sync relationship owned by a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupInfo {
    pub rule_id: i64,
    /// Resolved source directories, comma separated.
    pub src: String,
    /// Replica destination, always ending with `/`.
    pub dest: String,
    /// Schedule interval of the owning rule, in seconds.
    pub period: u64,
}

impl BackupInfo {
    pub fn new(rule_id: i64, src: impl Into<String>, dest: &str, period: u64) -> Self {
        Self {
            rule_id,
            src: src.into(),
            dest: crate::path::normalize_dest(dest),
            period,
        }
    }

    /// Iterate over the individual source directories.
    pub fn source_dirs(&self) -> impl Iterator<Item = &str> {
        self.src.split(',').filter(|s| !s.is_empty())
    }
}

/// Kind of change a diff replays on the replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileDiffType {
    Append,
    Concat,
    Rename,
    Delete,
    Metadata,
}

impl FileDiffType {
    /// Numeric code used by the diff journal table.
    pub fn code(self) -> u8 {
        match self {
            FileDiffType::Append => 1,
            FileDiffType::Concat => 2,
            FileDiffType::Rename => 3,
            FileDiffType::Delete => 4,
            FileDiffType::Metadata => 5,
        }
    }

    /// Whether applying the diff adds bytes to an existing replica file.
    pub fn is_append_like(self) -> bool {
        matches!(self, FileDiffType::Append | FileDiffType::Concat)
    }

    pub fn append_like() -> [FileDiffType; 2] {
        [FileDiffType::Append, FileDiffType::Concat]
    }
}

/// Lifecycle of a diff. Only the external applier moves a diff out of `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileDiffState {
    Pending,
    Applied,
    Failed,
}

impl FileDiffState {
    pub fn code(self) -> u8 {
        match self {
            FileDiffState::Pending => 1,
            FileDiffState::Applied => 2,
            FileDiffState::Failed => 3,
        }
    }
}

/// A unit of replay work recorded in the diff journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    /// Journal id, assigned by the store on insert.
    #[serde(default)]
    pub id: Option<u64>,
    pub rule_id: i64,
    pub src: String,
    pub diff_type: FileDiffType,
    pub state: FileDiffState,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl FileDiff {
    /// A pending append of `length` bytes at `offset`, not owned by any rule.
    pub fn append(src: impl Into<String>, offset: u64, length: u64) -> Self {
        let mut parameters = BTreeMap::new();
        parameters.insert(PARAM_OFFSET.to_string(), offset.to_string());
        parameters.insert(PARAM_LENGTH.to_string(), length.to_string());
        Self {
            id: None,
            rule_id: UNOWNED_RULE_ID,
            src: src.into(),
            diff_type: FileDiffType::Append,
            state: FileDiffState::Pending,
            parameters,
            created_at: chrono::Utc::now(),
        }
    }

    pub fn offset(&self) -> Option<u64> {
        self.parameter(PARAM_OFFSET)
    }

    pub fn length(&self) -> Option<u64> {
        self.parameter(PARAM_LENGTH)
    }

    fn parameter(&self, key: &str) -> Option<u64> {
        self.parameters.get(key).and_then(|v| v.parse().ok())
    }
}
