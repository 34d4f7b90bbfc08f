use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::model::BackupInfo;

/// What a deregistration did to a rule's entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deregistration {
    /// The rule was never registered (or is already gone).
    Untracked,
    /// An activation was removed; this many remain.
    Remaining(usize),
    /// The last activation was removed; persisted state should go too.
    Emptied,
}

impl Deregistration {
    pub fn emptied(self) -> bool {
        self == Deregistration::Emptied
    }
}

/// In-memory index of active backup relationships, keyed by rule id.
///
/// Each rule maps to its activations in registration order. A rule is present
/// exactly while it has at least one activation.
pub trait BackupRegistry: Send + Sync {
    fn register(&self, rule_id: i64, info: BackupInfo);

    /// Track a persisted relationship whose activation has not been replayed yet.
    ///
    /// The next `register` for the rule supersedes it instead of stacking on
    /// top. Rules that already have activations are left alone.
    fn restore(&self, rule_id: i64, info: BackupInfo);

    /// Remove the oldest activation of `rule_id`. Unknown rules are a no-op.
    fn deregister(&self, rule_id: i64) -> Deregistration;

    fn active_count(&self, rule_id: i64) -> usize;

    fn is_active(&self, rule_id: i64) -> bool {
        self.active_count(rule_id) > 0
    }

    /// Current activations of a rule, oldest first.
    fn backups(&self, rule_id: i64) -> Vec<BackupInfo>;
}

#[derive(Debug, Default)]
struct RuleBackups {
    infos: VecDeque<BackupInfo>,
    /// The only entry came from persisted state, not from an activation.
    restored: bool,
    /// Set once the entry has been unlinked from the map.
    retired: bool,
}

/// Registry with a map lock for structural changes and a lock per rule.
///
/// Lock order is always map then rule, so operations on different rules only
/// contend on the short structural section.
#[derive(Debug, Default)]
pub struct LockedBackupRegistry {
    rules: Mutex<HashMap<i64, Arc<Mutex<RuleBackups>>>>,
}

impl LockedBackupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rules with at least one activation.
    pub fn len(&self) -> usize {
        lock(&self.rules).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, rule_id: i64) -> Option<Arc<Mutex<RuleBackups>>> {
        lock(&self.rules).get(&rule_id).cloned()
    }
}

impl BackupRegistry for LockedBackupRegistry {
    fn register(&self, rule_id: i64, info: BackupInfo) {
        loop {
            let entry = lock(&self.rules).entry(rule_id).or_default().clone();

            let mut backups = lock(&entry);
            if backups.retired {
                // Unlinked between the two locks; start over with a fresh entry.
                continue;
            }
            if backups.restored {
                backups.infos.clear();
                backups.restored = false;
            }
            backups.infos.push_back(info);
            debug!(
                "Registered backup for rule {} ({} active)",
                rule_id,
                backups.infos.len()
            );
            return;
        }
    }

    fn restore(&self, rule_id: i64, info: BackupInfo) {
        loop {
            let entry = lock(&self.rules).entry(rule_id).or_default().clone();

            let mut backups = lock(&entry);
            if backups.retired {
                continue;
            }
            if backups.infos.is_empty() {
                backups.infos.push_back(info);
                backups.restored = true;
                debug!("Restored backup for rule {}", rule_id);
            }
            return;
        }
    }

    fn deregister(&self, rule_id: i64) -> Deregistration {
        let mut rules = lock(&self.rules);
        let Some(entry) = rules.get(&rule_id).cloned() else {
            return Deregistration::Untracked;
        };

        let mut backups = lock(&entry);
        backups.infos.pop_front();
        backups.restored = false;
        if !backups.infos.is_empty() {
            return Deregistration::Remaining(backups.infos.len());
        }

        backups.retired = true;
        rules.remove(&rule_id);
        debug!("Deregistered last backup for rule {}", rule_id);
        Deregistration::Emptied
    }

    fn active_count(&self, rule_id: i64) -> usize {
        self.entry(rule_id)
            .map(|entry| lock(&entry).infos.len())
            .unwrap_or(0)
    }

    fn backups(&self, rule_id: i64) -> Vec<BackupInfo> {
        self.entry(rule_id)
            .map(|entry| lock(&entry).infos.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Lock, recovering the data if a previous holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
