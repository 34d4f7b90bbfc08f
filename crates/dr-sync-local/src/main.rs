mod config;
mod probe;
mod storage;

use std::sync::Arc;

use clap::Parser;
use dr_sync_core::{
    Activation, FileDiffState, MetadataStore, RuleExecutorPlugin, RuleInfo, SyncPlugin,
    TranslateResult,
};
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::{Command, Config};
use probe::LocalFsProbe;
use storage::LocalMetaStore;

/// Rule file accepted by `activate`: the rule plus its translation.
#[derive(Debug, Deserialize)]
struct RuleFile {
    rule: RuleInfo,
    translate: TranslateResult,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();

    let state_dir = config.effective_state_dir();
    info!("Starting dr-sync-local");
    info!("  State dir: {}", state_dir.display());
    for (name, root) in &config.mounts {
        info!("  Mount: {} -> {}", name, root.display());
    }

    let store = Arc::new(LocalMetaStore::new(&state_dir));
    let probe = Arc::new(LocalFsProbe::new(config.mount_table()));
    let plugin = SyncPlugin::new(store.clone(), probe);
    plugin.restore().await?;

    match config.command {
        Command::Activate { rule_file } => {
            let json = tokio::fs::read_to_string(&rule_file).await?;
            let RuleFile {
                rule,
                mut translate,
            } = serde_json::from_str(&json)?;

            match plugin.activate(&rule, &mut translate).await? {
                Activation::Activated { info, diffs } => info!(
                    "Rule {} syncs {} -> {} every {}s ({} catch-up diffs)",
                    rule.id, info.src, info.dest, info.period, diffs
                ),
                Activation::Skipped(reason) => {
                    info!("Rule {} is not a sync rule: {:?}", rule.id, reason)
                }
            }
            println!("{}", serde_json::to_string_pretty(&translate)?);
        }
        Command::Deactivate { rule_id } => {
            let rule = RuleInfo {
                id: rule_id,
                text: String::new(),
            };
            plugin.on_deactivate(&rule).await;
        }
        Command::Backups => {
            for backup in store.list_backup_infos().await? {
                println!("{}", serde_json::to_string(&backup)?);
            }
        }
        Command::Diffs { pending } => {
            let state = pending.then_some(FileDiffState::Pending);
            for diff in store.list_file_diffs(state).await? {
                println!("{}", serde_json::to_string(&diff)?);
            }
        }
    }

    Ok(())
}
