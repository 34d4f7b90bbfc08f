use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, instrument, warn};

use crate::diff::DiffComputer;
use crate::error::SyncError;
use crate::journal::DiffJournal;
use crate::model::BackupInfo;
use crate::path::base_dir;
use crate::probe::FileProbe;
use crate::query::{exclusion_clause, rewrite_last};
use crate::registry::{BackupRegistry, Deregistration, LockedBackupRegistry};
use crate::rule::{
    CmdletDescriptor, RuleExecutorPlugin, RuleInfo, TranslateResult, SYNC_ACTION, SYNC_ARG_DEST,
    SYNC_ARG_SRC,
};
use crate::store::MetadataStore;

/// Glob checked when a rule does not restrict its paths.
const ROOT_GLOB: &str = "/*";

/// Why an activation left a rule alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The rule has no `sync` action; the plugin does not apply.
    NoSyncAction,
    /// None of the rule's globs resolve to a directory.
    NoSourceDirs,
}

/// Outcome of activating a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    Skipped(SkipReason),
    Activated {
        info: BackupInfo,
        /// Number of catch-up diffs journaled
        diffs: usize,
    },
}

/// Rule executor plugin that keeps a sync rule's replica incrementally up to date.
///
/// On activation it patches the rule so queued files are not reselected,
/// journals append diffs for any drift between primary and replica, persists
/// the backup relationship and only then tracks it in memory. Deactivation
/// drops the in-memory activation and, with the last one, the persisted state.
pub struct SyncPlugin {
    journal: DiffJournal,
    store: Arc<dyn MetadataStore>,
    differ: DiffComputer,
    registry: Arc<dyn BackupRegistry>,
}

impl std::fmt::Debug for SyncPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncPlugin")
            .field("journal", &self.journal)
            .field("differ", &self.differ)
            .finish_non_exhaustive()
    }
}

impl SyncPlugin {
    pub fn new(store: Arc<dyn MetadataStore>, probe: Arc<dyn FileProbe>) -> Self {
        Self::with_registry(store, probe, Arc::new(LockedBackupRegistry::new()))
    }

    pub fn with_registry(
        store: Arc<dyn MetadataStore>,
        probe: Arc<dyn FileProbe>,
        registry: Arc<dyn BackupRegistry>,
    ) -> Self {
        Self {
            journal: DiffJournal::new(store.clone()),
            store,
            differ: DiffComputer::new(probe),
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<dyn BackupRegistry> {
        &self.registry
    }

    /// Load every persisted backup relationship into the registry.
    ///
    /// Meant for startup. A restored entry stands in for the rule until the
    /// scheduler activates it again, which supersedes it.
    pub async fn restore(&self) -> Result<usize, SyncError> {
        let infos = self.store.list_backup_infos().await?;
        let count = infos.len();
        for info in infos {
            self.registry.restore(info.rule_id, info);
        }
        info!("Restored {} backup relationships", count);
        Ok(count)
    }

    /// Turn `rule` into an active backup relationship, if it has a sync action.
    ///
    /// Nothing is registered in memory unless the catch-up diffs and the
    /// backup relationship were persisted.
    #[instrument(skip(self, rule, result), fields(rule_id = rule.id), level = "debug")]
    pub async fn activate(
        &self,
        rule: &RuleInfo,
        result: &mut TranslateResult,
    ) -> Result<Activation, SyncError> {
        let globs = if result.glob_path_check.is_empty() {
            vec![ROOT_GLOB.to_string()]
        } else {
            result.glob_path_check.clone()
        };
        let mut dirs: Vec<String> = Vec::new();
        for dir in globs.iter().filter_map(|g| base_dir(g)) {
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }

        let Some(index) = result.cmd_descriptor.position(SYNC_ACTION) else {
            return Ok(Activation::Skipped(SkipReason::NoSyncAction));
        };
        let Some(predicate) = exclusion_clause(dirs.iter().cloned()) else {
            return Ok(Activation::Skipped(SkipReason::NoSourceDirs));
        };
        let dest = result.cmd_descriptor.actions[index]
            .args
            .get(SYNC_ARG_DEST)
            .cloned()
            .ok_or_else(|| {
                SyncError::InvalidRule(format!(
                    "sync action of rule {} has no {} argument",
                    rule.id, SYNC_ARG_DEST
                ))
            })?;

        if !rewrite_last(&mut result.sql_statements, &predicate) {
            warn!("Rule {} has no selection statement to rewrite", rule.id);
        }

        let src = dirs.join(",");
        let info = BackupInfo::new(rule.id, src.as_str(), &dest, result.schedule.every);
        result.cmd_descriptor.add_action_arg(index, SYNC_ARG_SRC, &src);

        debug!(
            "Sync rule {} src={} dest={} period={}",
            rule.id, info.src, info.dest, info.period
        );

        let diffs = self.force_sync(&info).await?;
        self.journal.replace_backup(&info).await?;
        self.registry.register(rule.id, info.clone());

        Ok(Activation::Activated { info, diffs })
    }

    /// Drop the oldest activation of a rule, and its persisted state with the last one.
    #[instrument(skip(self), level = "debug")]
    pub async fn deactivate(&self, rule_id: i64) -> Result<Deregistration, SyncError> {
        let outcome = self.registry.deregister(rule_id);
        if outcome.emptied() {
            self.journal.delete_backup(rule_id).await?;
        }
        Ok(outcome)
    }

    /// Journal append diffs for every file whose replica lags behind.
    async fn force_sync(&self, info: &BackupInfo) -> Result<usize, SyncError> {
        let mut count = 0;
        for dir in info.source_dirs() {
            let files = self.store.list_files_by_prefix(dir).await?;
            for diff in self.differ.reconcile(dir, &info.dest, &files).await {
                self.journal.append_diff(&diff).await?;
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl RuleExecutorPlugin for SyncPlugin {
    async fn on_activate(&self, rule: &RuleInfo, result: &mut TranslateResult) {
        match self.activate(rule, result).await {
            Ok(Activation::Activated { info, diffs }) => info!(
                "Activated sync rule {}: {} -> {} ({} catch-up diffs)",
                rule.id, info.src, info.dest, diffs
            ),
            Ok(Activation::Skipped(reason)) => {
                debug!("Rule {} not handled by sync plugin: {:?}", rule.id, reason)
            }
            Err(e) => error!("Activation of sync rule {} aborted: {}", rule.id, e),
        }
    }

    async fn on_pre_execution(&self, _rule: &RuleInfo, _result: &TranslateResult) -> bool {
        true
    }

    async fn on_pre_submit_objects(&self, _rule: &RuleInfo, objects: Vec<String>) -> Vec<String> {
        objects
    }

    async fn on_pre_submit_descriptor(
        &self,
        _rule: &RuleInfo,
        _result: &TranslateResult,
        descriptor: CmdletDescriptor,
    ) -> CmdletDescriptor {
        descriptor
    }

    async fn on_deactivate(&self, rule: &RuleInfo) {
        if let Err(e) = self.deactivate(rule.id).await {
            error!("Remove backup info of rule {} failed: {}", rule.id, e);
        }
    }
}
