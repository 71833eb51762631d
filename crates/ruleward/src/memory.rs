//! In-process store implementing both storage traits.
//!
//! Behaves like the remote API for the calls the mutator makes: updates and
//! deletes of missing objects fail with `NotFound`, creates of existing ones
//! fail with `AlreadyExists`, and every successful mutation is fanned out to
//! the active watch streams. Mutating calls are counted so tests can assert
//! which calls were issued.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::StoreError;
use crate::store::{
    RELABEL_CONFIG_KIND, RULE_GROUP_KIND, RelabelConfigStore, RuleGroupStore, StoreResult,
    WatchEvent, WatchStream,
};
use crate::types::{RelabelConfigResource, ResourceRef, Rule, RuleGroupResource};

/// Number of calls issued against a [`MemoryStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// `list_rule_groups` and `get_rule_group` calls.
    pub rule_group_reads: usize,
    /// Successful `update_rule_group` calls.
    pub rule_group_updates: usize,
    /// Successful `delete_rule_group` calls.
    pub rule_group_deletes: usize,
    /// Successful `add_rule` calls.
    pub rules_added: usize,
    /// Successful `create_relabel_config` calls.
    pub relabel_creates: usize,
    /// Successful `update_relabel_config` calls.
    pub relabel_updates: usize,
}

impl CallCounts {
    /// Returns the number of calls that changed stored state.
    #[must_use]
    pub const fn mutations(&self) -> usize {
        self.rule_group_updates
            + self.rule_group_deletes
            + self.rules_added
            + self.relabel_creates
            + self.relabel_updates
    }
}

type Watchers<T> = Vec<mpsc::UnboundedSender<WatchEvent<T>>>;

#[derive(Debug, Default)]
struct MemoryState {
    rule_groups: BTreeMap<ResourceRef, RuleGroupResource>,
    relabel_configs: BTreeMap<ResourceRef, RelabelConfigResource>,
    rule_group_watchers: Watchers<RuleGroupResource>,
    relabel_watchers: Watchers<RelabelConfigResource>,
    unavailable: Option<String>,
    calls: CallCounts,
}

impl MemoryState {
    fn check_available(&self) -> StoreResult<()> {
        match &self.unavailable {
            Some(reason) => Err(StoreError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }
}

fn broadcast<T: Clone>(watchers: &mut Watchers<T>, event: &WatchEvent<T>) {
    watchers.retain(|tx| tx.send(event.clone()).is_ok());
}

fn not_found(kind: &'static str, resource: &ResourceRef) -> StoreError {
    StoreError::NotFound {
        kind,
        namespace: resource.namespace.clone(),
        name: resource.name.clone(),
    }
}

/// Store keeping all resources in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding the given resources.
    #[must_use]
    pub fn with_resources(
        rule_groups: impl IntoIterator<Item = RuleGroupResource>,
        relabel_configs: impl IntoIterator<Item = RelabelConfigResource>,
    ) -> Self {
        let store = Self::new();
        for resource in rule_groups {
            store.put_rule_group(resource);
        }
        for resource in relabel_configs {
            store.put_relabel_config(resource);
        }
        store
    }

    /// Inserts or replaces a rule-group resource without counting a call.
    pub fn put_rule_group(&self, resource: RuleGroupResource) {
        let mut state = self.state.write();
        let event = if state.rule_groups.contains_key(&resource.reference()) {
            WatchEvent::Modified(resource.clone())
        } else {
            WatchEvent::Added(resource.clone())
        };
        state.rule_groups.insert(resource.reference(), resource);
        broadcast(&mut state.rule_group_watchers, &event);
    }

    /// Inserts or replaces a relabel resource without counting a call.
    pub fn put_relabel_config(&self, resource: RelabelConfigResource) {
        let mut state = self.state.write();
        let event = if state.relabel_configs.contains_key(&resource.reference()) {
            WatchEvent::Modified(resource.clone())
        } else {
            WatchEvent::Added(resource.clone())
        };
        state.relabel_configs.insert(resource.reference(), resource);
        broadcast(&mut state.relabel_watchers, &event);
    }

    /// Returns a stored rule-group resource.
    #[must_use]
    pub fn rule_group(&self, resource: &ResourceRef) -> Option<RuleGroupResource> {
        self.state.read().rule_groups.get(resource).cloned()
    }

    /// Returns a stored relabel resource.
    #[must_use]
    pub fn relabel_config(&self, resource: &ResourceRef) -> Option<RelabelConfigResource> {
        self.state.read().relabel_configs.get(resource).cloned()
    }

    /// Returns the call counters.
    #[must_use]
    pub fn calls(&self) -> CallCounts {
        self.state.read().calls
    }

    /// Makes every subsequent call fail with `Unavailable` until cleared with `None`.
    pub fn set_unavailable(&self, reason: Option<String>) {
        self.state.write().unavailable = reason;
    }

    /// Sends an `Error` event on every rule-group watch.
    pub fn inject_watch_error(&self, message: &str) {
        let mut state = self.state.write();
        broadcast(
            &mut state.rule_group_watchers,
            &WatchEvent::Error(message.to_string()),
        );
    }

    /// Closes every open watch stream.
    pub fn close_watches(&self) {
        let mut state = self.state.write();
        state.rule_group_watchers.clear();
        state.relabel_watchers.clear();
        debug!("closed all watch streams");
    }
}

impl RuleGroupStore for MemoryStore {
    async fn list_rule_groups(&self, namespace: Option<&str>) -> StoreResult<Vec<RuleGroupResource>> {
        let mut state = self.state.write();
        state.check_available()?;
        state.calls.rule_group_reads += 1;
        Ok(state
            .rule_groups
            .values()
            .filter(|r| namespace.is_none_or(|ns| r.namespace == ns))
            .cloned()
            .collect())
    }

    async fn get_rule_group(&self, resource: &ResourceRef) -> StoreResult<RuleGroupResource> {
        let mut state = self.state.write();
        state.check_available()?;
        state.calls.rule_group_reads += 1;
        state
            .rule_groups
            .get(resource)
            .cloned()
            .ok_or_else(|| not_found(RULE_GROUP_KIND, resource))
    }

    async fn update_rule_group(&self, resource: RuleGroupResource) -> StoreResult<()> {
        let mut state = self.state.write();
        state.check_available()?;
        let reference = resource.reference();
        if !state.rule_groups.contains_key(&reference) {
            return Err(not_found(RULE_GROUP_KIND, &reference));
        }
        state.rule_groups.insert(reference, resource.clone());
        state.calls.rule_group_updates += 1;
        broadcast(&mut state.rule_group_watchers, &WatchEvent::Modified(resource));
        Ok(())
    }

    async fn delete_rule_group(&self, resource: &ResourceRef) -> StoreResult<()> {
        let mut state = self.state.write();
        state.check_available()?;
        let removed = state
            .rule_groups
            .remove(resource)
            .ok_or_else(|| not_found(RULE_GROUP_KIND, resource))?;
        state.calls.rule_group_deletes += 1;
        broadcast(&mut state.rule_group_watchers, &WatchEvent::Deleted(removed));
        Ok(())
    }

    async fn add_rule(&self, resource: &ResourceRef, group_name: &str, rule: Rule) -> StoreResult<()> {
        let mut state = self.state.write();
        state.check_available()?;

        let existed = state.rule_groups.contains_key(resource);
        let stored = state
            .rule_groups
            .entry(resource.clone())
            .or_insert_with(|| RuleGroupResource::new(&resource.namespace, &resource.name));
        stored.append_rule(group_name, rule);
        let snapshot = stored.clone();

        state.calls.rules_added += 1;
        let event = if existed {
            WatchEvent::Modified(snapshot)
        } else {
            WatchEvent::Added(snapshot)
        };
        broadcast(&mut state.rule_group_watchers, &event);
        Ok(())
    }

    async fn watch_rule_groups(&self) -> StoreResult<WatchStream<RuleGroupResource>> {
        let mut state = self.state.write();
        state.check_available()?;
        let (tx, rx) = mpsc::unbounded_channel();
        for resource in state.rule_groups.values() {
            // The receiver is still in scope, so the send cannot fail.
            let _ = tx.send(WatchEvent::Added(resource.clone()));
        }
        state.rule_group_watchers.push(tx);
        Ok(rx)
    }
}

impl RelabelConfigStore for MemoryStore {
    async fn get_relabel_config(&self, resource: &ResourceRef) -> StoreResult<RelabelConfigResource> {
        let state = self.state.read();
        state.check_available()?;
        state
            .relabel_configs
            .get(resource)
            .cloned()
            .ok_or_else(|| not_found(RELABEL_CONFIG_KIND, resource))
    }

    async fn update_relabel_config(&self, resource: RelabelConfigResource) -> StoreResult<()> {
        let mut state = self.state.write();
        state.check_available()?;
        let reference = resource.reference();
        if !state.relabel_configs.contains_key(&reference) {
            return Err(not_found(RELABEL_CONFIG_KIND, &reference));
        }
        state.relabel_configs.insert(reference, resource.clone());
        state.calls.relabel_updates += 1;
        broadcast(&mut state.relabel_watchers, &WatchEvent::Modified(resource));
        Ok(())
    }

    async fn create_relabel_config(&self, resource: RelabelConfigResource) -> StoreResult<()> {
        let mut state = self.state.write();
        state.check_available()?;
        let reference = resource.reference();
        if state.relabel_configs.contains_key(&reference) {
            return Err(StoreError::AlreadyExists {
                kind: RELABEL_CONFIG_KIND,
                namespace: reference.namespace,
                name: reference.name,
            });
        }
        state.relabel_configs.insert(reference, resource.clone());
        state.calls.relabel_creates += 1;
        broadcast(&mut state.relabel_watchers, &WatchEvent::Added(resource));
        Ok(())
    }

    async fn watch_relabel_configs(&self) -> StoreResult<WatchStream<RelabelConfigResource>> {
        let mut state = self.state.write();
        state.check_available()?;
        let (tx, rx) = mpsc::unbounded_channel();
        for resource in state.relabel_configs.values() {
            let _ = tx.send(WatchEvent::Added(resource.clone()));
        }
        state.relabel_watchers.push(tx);
        Ok(rx)
    }
}
