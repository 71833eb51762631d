//! Relabel overlay for platform-managed rules.
//!
//! Platform rules are read-only, so label changes are expressed as relabel
//! directives stored in separate relabel resources. [`RelabelOverlayIndex`]
//! caches the directives that target a specific alert name, fed by the relabel
//! watch with the same replace-as-batch strategy as [`RuleIndex`](crate::RuleIndex).
//!
//! Only literal directives are kept: `sourceLabels` must include `alertname`
//! and the regex must split on the separator into exactly one token per source
//! label. Tokens are compared literally; `.*` matches any value. No other
//! regex syntax is interpreted.

use std::collections::{BTreeSet, HashMap};

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::types::{RelabelAction, RelabelConfigResource, RelabelDirective, ResourceRef, Rule};

/// Source label holding the alert name.
pub const ALERTNAME_LABEL: &str = "alertname";

/// Token matching any value.
pub const WILDCARD_TOKEN: &str = ".*";

static INVALID_NAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9-]").unwrap_or_else(|_| unreachable!()));

/// A directive that targets one alert name, with its literal match tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelabelIndexEntry {
    /// The relabel resource the directive came from.
    pub source: ResourceRef,
    /// Alert name the directive is scoped to.
    pub alert_name: String,
    /// `(source label, token)` pairs that must all match.
    pub matchers: Vec<(String, String)>,
    /// The directive as stored.
    pub directive: RelabelDirective,
}

impl RelabelIndexEntry {
    /// Parses a directive. Returns `None` for directives the overlay cannot represent.
    #[must_use]
    pub fn parse(source: &ResourceRef, directive: &RelabelDirective) -> Option<Self> {
        if !directive.source_labels.iter().any(|l| l == ALERTNAME_LABEL) {
            return None;
        }
        if directive.regex.is_empty() {
            return None;
        }

        let tokens: Vec<&str> = directive
            .regex
            .split(directive.effective_separator())
            .collect();
        if tokens.len() != directive.source_labels.len() {
            return None;
        }

        let matchers: Vec<(String, String)> = directive
            .source_labels
            .iter()
            .zip(tokens)
            .map(|(label, token)| (label.clone(), token.to_string()))
            .collect();

        let alert_name = matchers
            .iter()
            .find(|(label, _)| label == ALERTNAME_LABEL)
            .map(|(_, token)| token.clone())
            .filter(|token| token != WILDCARD_TOKEN)?;

        Some(Self {
            source: source.clone(),
            alert_name,
            matchers,
            directive: directive.clone(),
        })
    }

    /// Returns true if every matcher accepts the rule's current values.
    #[must_use]
    pub fn matches(&self, rule: &Rule) -> bool {
        self.matchers.iter().all(|(label, token)| {
            if token == WILDCARD_TOKEN {
                return true;
            }
            let value = if label == ALERTNAME_LABEL {
                rule.alert_name().unwrap_or_default()
            } else {
                rule.labels.get(label).map_or("", String::as_str)
            };
            value == token
        })
    }
}

#[derive(Debug, Default)]
struct OverlayState {
    by_resource: HashMap<ResourceRef, Vec<RelabelIndexEntry>>,
    by_alert: HashMap<String, BTreeSet<ResourceRef>>,
}

impl OverlayState {
    fn purge(&mut self, resource: &ResourceRef) -> usize {
        let Some(entries) = self.by_resource.remove(resource) else {
            return 0;
        };
        for entry in &entries {
            if let Some(owners) = self.by_alert.get_mut(&entry.alert_name) {
                owners.remove(resource);
                if owners.is_empty() {
                    self.by_alert.remove(&entry.alert_name);
                }
            }
        }
        entries.len()
    }
}

/// Alert name -> relabel directives index.
#[derive(Debug, Default)]
pub struct RelabelOverlayIndex {
    state: RwLock<OverlayState>,
}

impl RelabelOverlayIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-parses `resource` and atomically replaces its previous entries.
    ///
    /// Returns the number of directives retained.
    pub(crate) fn upsert_resource(&self, resource: &RelabelConfigResource) -> usize {
        let reference = resource.reference();
        let mut state = self.state.write();

        let entries: Vec<RelabelIndexEntry> = resource
            .configs
            .iter()
            .filter_map(|d| RelabelIndexEntry::parse(&reference, d))
            .collect();
        let dropped = resource.configs.len() - entries.len();

        let purged = state.purge(&reference);
        for entry in &entries {
            state
                .by_alert
                .entry(entry.alert_name.clone())
                .or_default()
                .insert(reference.clone());
        }
        let count = entries.len();
        state.by_resource.insert(reference.clone(), entries);

        debug!(resource = %reference, purged, retained = count, dropped, "replaced relabel overlay entries");
        count
    }

    /// Removes every entry from `resource`.
    pub(crate) fn remove_resource(&self, resource: &ResourceRef) -> usize {
        let purged = self.state.write().purge(resource);
        debug!(resource = %resource, purged, "removed relabel overlay entries");
        purged
    }

    /// Returns the directives scoped to `alert_name`, ordered by relabel
    /// resource then by position within it.
    #[must_use]
    pub fn find_directives_for_alert_name(&self, alert_name: &str) -> Vec<RelabelIndexEntry> {
        let state = self.state.read();
        let Some(owners) = state.by_alert.get(alert_name) else {
            return Vec::new();
        };
        owners
            .iter()
            .filter_map(|owner| state.by_resource.get(owner))
            .flat_map(|entries| entries.iter().filter(|e| e.alert_name == alert_name))
            .cloned()
            .collect()
    }

    /// Returns the number of retained directives.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().by_resource.values().map(Vec::len).sum()
    }

    /// Returns the number of relabel resources tracked.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.state.read().by_resource.len()
    }

    /// Returns true if no directives are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Replays `entries` onto the labels of `rule`, in order.
///
/// `Replace` writes the replacement into the target label and removes the
/// label when the replacement is empty. `LabelDrop` removes the target label.
/// Other actions are not replayed.
///
/// Returns the number of directives applied.
pub fn apply_overlay(rule: &mut Rule, entries: &[RelabelIndexEntry]) -> usize {
    let mut applied = 0;
    for entry in entries {
        let directive = &entry.directive;
        if !directive.action.is_replayable() {
            debug!(action = %directive.action, source = %entry.source, "relabel action not replayed");
            continue;
        }
        if directive.target_label.is_empty() || !entry.matches(rule) {
            continue;
        }

        match directive.action {
            RelabelAction::Replace if !directive.replacement.is_empty() => {
                rule.labels
                    .insert(directive.target_label.clone(), directive.replacement.clone());
            }
            _ => {
                rule.labels.remove(&directive.target_label);
            }
        }
        applied += 1;
    }
    applied
}

/// Builds the directives that turn `original` labels into `desired` labels
/// for the alert `alert_name`.
///
/// Changed and added keys become `Replace` directives, removed keys become
/// `LabelDrop` directives. Each set is sorted by label key.
#[must_use]
pub fn label_change_directives(
    alert_name: &str,
    original: &HashMap<String, String>,
    desired: &HashMap<String, String>,
) -> Vec<RelabelDirective> {
    let mut replaced: Vec<(&String, &String)> = desired
        .iter()
        .filter(|(key, value)| original.get(*key) != Some(*value))
        .collect();
    replaced.sort();

    let mut dropped: Vec<&String> = original
        .keys()
        .filter(|key| !desired.contains_key(*key))
        .collect();
    dropped.sort();

    let replaces = replaced.into_iter().map(|(key, value)| RelabelDirective {
        source_labels: vec![ALERTNAME_LABEL.to_string(), key.clone()],
        regex: format!("{alert_name};{WILDCARD_TOKEN}"),
        target_label: key.clone(),
        replacement: value.clone(),
        action: RelabelAction::Replace,
        ..RelabelDirective::default()
    });

    let drops = dropped.into_iter().map(|key| RelabelDirective {
        source_labels: vec![ALERTNAME_LABEL.to_string()],
        regex: alert_name.to_string(),
        target_label: key.clone(),
        action: RelabelAction::LabelDrop,
        ..RelabelDirective::default()
    });

    replaces.chain(drops).collect()
}

/// Hex characters of the `(resource, alert)` digest kept in relabel resource names.
const NAME_DIGEST_LEN: usize = 8;

/// Returns the relabel resource name for an alert in a rule-group resource.
///
/// The readable part is lowercased and sanitized, which can fold distinct
/// pairs together, so it is followed by a digest of the exact pair.
#[must_use]
pub fn relabel_resource_name(resource_name: &str, alert_name: &str) -> String {
    let readable = format!("{resource_name}-{alert_name}").to_lowercase();
    let readable = INVALID_NAME_CHARS.replace_all(&readable, "-");
    let digest = hex::encode(Sha256::digest(format!("{resource_name}/{alert_name}").as_bytes()));
    format!("{readable}-{}-relabel", &digest[..NAME_DIGEST_LEN])
}
