use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Name of the action that turns a rule into a backup relationship.
pub const SYNC_ACTION: &str = "sync";

/// Sync action argument carrying the resolved source directories.
pub const SYNC_ARG_SRC: &str = "-src";

/// Sync action argument carrying the replica destination.
pub const SYNC_ARG_DEST: &str = "-dest";

/// A rule as seen by executor plugins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleInfo {
    pub id: i64,
    /// Original rule text (for logging only)
    #[serde(default)]
    pub text: String,
}

/// One action of a cmdlet, with its `-key value` arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub name: String,
    #[serde(default)]
    pub args: BTreeMap<String, String>,
}

impl ActionSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: BTreeMap::new(),
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }
}

/// The ordered actions a rule submits for each selected object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmdletDescriptor {
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
}

impl CmdletDescriptor {
    /// Index of the first action named `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.actions.iter().position(|a| a.name == name)
    }

    pub fn add_action_arg(&mut self, index: usize, key: &str, value: &str) {
        if let Some(action) = self.actions.get_mut(index) {
            action.args.insert(key.to_string(), value.to_string());
        }
    }
}

/// When a rule is evaluated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleInfo {
    /// Evaluation interval in seconds
    pub every: u64,
}

/// Output of rule translation: what the rule checks, selects and runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranslateResult {
    /// Path globs the rule's file predicate is restricted to
    #[serde(default)]
    pub glob_path_check: Vec<String>,
    /// Generated selection statements; the last one yields the objects
    #[serde(default)]
    pub sql_statements: Vec<String>,
    #[serde(default)]
    pub cmd_descriptor: CmdletDescriptor,
    #[serde(default)]
    pub schedule: ScheduleInfo,
}

/// Hooks the rule executor invokes on every plugin during a rule's lifetime.
///
/// Hooks for the same rule are never invoked concurrently; hooks for
/// different rules may be. None of them report errors to the executor.
#[async_trait]
pub trait RuleExecutorPlugin: Send + Sync {
    /// A rule executor was created for `rule`. The plugin may patch `result`.
    async fn on_activate(&self, rule: &RuleInfo, result: &mut TranslateResult);

    /// Called before each evaluation; returning `false` skips it.
    async fn on_pre_execution(&self, rule: &RuleInfo, result: &TranslateResult) -> bool;

    /// Called with the selected objects before cmdlets are submitted.
    async fn on_pre_submit_objects(&self, rule: &RuleInfo, objects: Vec<String>) -> Vec<String>;

    /// Called with each cmdlet descriptor before it is submitted.
    async fn on_pre_submit_descriptor(
        &self,
        rule: &RuleInfo,
        result: &TranslateResult,
        descriptor: CmdletDescriptor,
    ) -> CmdletDescriptor;

    /// The rule executor for `rule` exited.
    async fn on_deactivate(&self, rule: &RuleInfo);
}
