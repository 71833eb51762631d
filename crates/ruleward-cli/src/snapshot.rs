//! Offline snapshots of rule-group and relabel resources.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Context;
use ruleward::{MemoryStore, RelabelConfigResource, RuleGroupResource};
use serde::Deserialize;

/// Resources loaded from a JSON snapshot file.
///
/// ```json
/// { "ruleGroups": [ ... ], "relabelConfigs": [ ... ] }
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub rule_groups: Vec<RuleGroupResource>,
    #[serde(default)]
    pub relabel_configs: Vec<RelabelConfigResource>,
}

impl Snapshot {
    /// Reads a snapshot from `path`.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read snapshot '{}'", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("invalid snapshot '{}'", path.display()))
    }

    /// Parses a snapshot from a JSON string; missing lists default to empty.
    pub fn from_json(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }

    /// Number of distinct rule-group resources; later duplicates replace earlier ones.
    pub fn rule_group_count(&self) -> usize {
        self.rule_groups
            .iter()
            .map(RuleGroupResource::reference)
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Number of distinct relabel resources; later duplicates replace earlier ones.
    pub fn relabel_config_count(&self) -> usize {
        self.relabel_configs
            .iter()
            .map(RelabelConfigResource::reference)
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Seeds a [`MemoryStore`] with every resource in the snapshot.
    pub fn into_store(self) -> MemoryStore {
        MemoryStore::with_resources(self.rule_groups, self.relabel_configs)
    }
}
