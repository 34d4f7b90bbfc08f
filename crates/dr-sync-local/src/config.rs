use std::collections::HashMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use thiserror::Error;

/// Configuration for the dr-sync-local driver.
#[derive(Parser, Debug, Clone)]
#[command(name = "dr-sync-local")]
#[command(about = "Drive sync rule activations against the local filesystem")]
pub struct Config {
    /// Directory holding persisted backup relationships and the diff journal
    #[arg(long, env = "DR_SYNC_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Replica mount as NAME=PATH; `NAME:/x` URIs resolve to `PATH/x`
    #[arg(
        long = "mount",
        env = "DR_SYNC_MOUNTS",
        value_delimiter = ',',
        value_parser = parse_mount
    )]
    pub mounts: Vec<(String, PathBuf)>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Activate a rule from a JSON file holding `rule` and `translate`
    Activate { rule_file: PathBuf },
    /// Deactivate a rule by id
    Deactivate { rule_id: i64 },
    /// List persisted backup relationships
    Backups,
    /// List diff journal entries
    Diffs {
        /// Only list diffs still waiting to be applied
        #[arg(long)]
        pending: bool,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid mount '{0}', expected NAME=PATH")]
    InvalidMount(String),
}

impl Config {
    /// Get the effective state directory.
    pub fn effective_state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("dr-sync")
                .join("state")
        })
    }

    pub fn mount_table(&self) -> HashMap<String, PathBuf> {
        self.mounts.iter().cloned().collect()
    }
}

fn parse_mount(value: &str) -> Result<(String, PathBuf), ConfigError> {
    match value.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => Err(ConfigError::InvalidMount(value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mounts() {
        let config = Config::try_parse_from([
            "dr-sync-local",
            "--state-dir",
            "/var/lib/dr-sync",
            "--mount",
            "backup=/mnt/backup",
            "--mount",
            "archive=/mnt/archive",
            "backups",
        ])
        .unwrap();

        assert_eq!(config.effective_state_dir(), PathBuf::from("/var/lib/dr-sync"));
        let mounts = config.mount_table();
        assert_eq!(mounts.get("backup"), Some(&PathBuf::from("/mnt/backup")));
        assert_eq!(mounts.get("archive"), Some(&PathBuf::from("/mnt/archive")));
        assert!(matches!(config.command, Command::Backups));
    }

    #[test]
    fn test_invalid_mount_rejected() {
        let result = Config::try_parse_from(["dr-sync-local", "--mount", "backup", "backups"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_subcommands() {
        let config = Config::try_parse_from(["dr-sync-local", "diffs", "--pending"]).unwrap();
        assert!(matches!(config.command, Command::Diffs { pending: true }));

        let config = Config::try_parse_from(["dr-sync-local", "deactivate", "7"]).unwrap();
        assert!(matches!(config.command, Command::Deactivate { rule_id: 7 }));
    }
}
