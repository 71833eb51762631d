//! ruleward - operator tool for CRD-backed alerting rules
//!
//! Computes rule identities, inspects rule-group snapshots through the same
//! manager a service embeds, and validates manager configuration.

mod snapshot;

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use clap::{Parser, Subcommand};
use ruleward::{
    IdentityHasher, ListRulesOptions, ManagerConfig, MemoryStore, Rule, RuleIdentity,
    RuleManager, RuleSource,
};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::snapshot::Snapshot;

/// How long to wait for the watch consumers to index a snapshot.
const SYNC_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "ruleward")]
#[command(about = "Inspect and identify CRD-backed alerting rules")]
#[command(version)]
struct Cli {
    /// Path to a TOML manager config
    #[arg(long, global = true, env = "RULEWARD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the identity of a rule read from a JSON file
    Id {
        /// Path to the rule JSON
        #[arg(long)]
        rule: PathBuf,
    },

    /// List alerting rules in a snapshot
    List {
        /// Path to the snapshot JSON
        #[arg(long)]
        snapshot: PathBuf,

        /// Only rules in this namespace
        #[arg(long)]
        namespace: Option<String>,

        /// Only rules in this resource (requires --namespace)
        #[arg(long)]
        name: Option<String>,

        /// Only rules in this group
        #[arg(long)]
        group: Option<String>,

        /// Only rules with this alert name
        #[arg(long)]
        alert: Option<String>,

        /// Only platform or user-defined rules
        #[arg(long)]
        source: Option<RuleSource>,

        /// Only rules carrying this label, as key=value (repeatable)
        #[arg(long = "label", value_parser = parse_label)]
        labels: Vec<(String, String)>,
    },

    /// Print the effective rule for an ID in a snapshot
    Get {
        /// Path to the snapshot JSON
        #[arg(long)]
        snapshot: PathBuf,

        /// Rule ID
        #[arg(long)]
        id: RuleIdentity,
    },

    /// Load and validate the file given with --config
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::from_default_env().add_directive("ruleward=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Id { rule } => {
            identify(&rule)?;
        }

        Commands::List {
            snapshot,
            namespace,
            name,
            group,
            alert,
            source,
            labels,
        } => {
            let options = ListRulesOptions {
                namespace,
                name,
                group_name: group,
                alert_name: alert,
                source,
                labels: labels.into_iter().collect::<HashMap<_, _>>(),
            };
            list(cli.config.as_deref(), &snapshot, &options).await?;
        }

        Commands::Get { snapshot, id } => {
            get(cli.config.as_deref(), &snapshot, &id).await?;
        }

        Commands::CheckConfig => {
            let path = cli
                .config
                .ok_or_else(|| anyhow!("check-config requires --config <file>"))?;
            check_config(&path)?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ManagerConfig> {
    match path {
        Some(path) => {
            debug!(config = %path.display(), "loading config");
            Ok(ManagerConfig::from_file(path)?)
        }
        None => Ok(ManagerConfig::default()),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn identify(path: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read rule '{}'", path.display()))?;
    let rule: Rule = serde_json::from_str(&content)
        .with_context(|| format!("invalid rule '{}'", path.display()))?;

    rule.validate()?;
    let id = IdentityHasher::identify(&rule)?;
    println!("{id}");
    Ok(())
}

async fn start_manager(
    config: Option<&Path>,
    snapshot: &Path,
) -> anyhow::Result<RuleManager<MemoryStore>> {
    let config = load_config(config)?;
    let snapshot = Snapshot::from_file(snapshot)?;
    let rule_groups = snapshot.rule_group_count();
    let relabel_configs = snapshot.relabel_config_count();

    let manager = RuleManager::start(Arc::new(snapshot.into_store()), config).await?;

    tokio::time::timeout(SYNC_TIMEOUT, async {
        while manager.rule_index().resource_count() < rule_groups
            || manager.overlay_index().resource_count() < relabel_configs
        {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .map_err(|_| anyhow!("timed out waiting for snapshot to be indexed"))?;

    info!(
        rules = manager.rule_index().len(),
        directives = manager.overlay_index().len(),
        "snapshot indexed"
    );
    Ok(manager)
}

async fn list(
    config: Option<&Path>,
    snapshot: &Path,
    options: &ListRulesOptions,
) -> anyhow::Result<()> {
    let manager = start_manager(config, snapshot).await?;
    let result = manager.mutator().list_rules(options).await;
    manager.shutdown().await;

    print_json(&result?)
}

async fn get(config: Option<&Path>, snapshot: &Path, id: &RuleIdentity) -> anyhow::Result<()> {
    let manager = start_manager(config, snapshot).await?;
    let result = manager.mutator().get_rule_by_id(id).await;
    manager.shutdown().await;

    print_json(&result?)
}

fn check_config(path: &Path) -> anyhow::Result<()> {
    let config = ManagerConfig::from_file(path)?;
    println!("config OK: {}", path.display());
    println!("  platform_prefix:    {}", config.platform_prefix);
    println!("  default_group_name: {}", config.default_group_name);
    println!("  call_timeout_secs:  {}", config.call_timeout_secs);
    println!("  stamp_rule_id:      {}", config.stamp_rule_id);
    Ok(())
}

fn parse_label(raw: &str) -> anyhow::Result<(String, String)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("expected key=value, got '{raw}'");
    };
    if key.is_empty() {
        bail!("label key cannot be empty in '{raw}'");
    }
    Ok((key.to_string(), value.to_string()))
}
