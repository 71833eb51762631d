//! Reverse index from rule identity to the owning rule-group resource.
//!
//! The index is a pure cache of the remote store, fed by the rule-group watch.
//! Entries for a resource are always replaced as a whole batch on every
//! `Added`/`Modified` event and removed as a whole batch on `Deleted`, so
//! renames, removals and resync redelivery need no special handling.

use std::collections::{BTreeSet, HashMap};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{Result, RuleError};
use crate::identity::{IdentityHasher, RuleIdentity};
use crate::types::{ResourceRef, RuleGroupResource};

#[derive(Debug, Default)]
struct IndexState {
    /// Identity -> every resource currently holding a rule with that content.
    by_id: HashMap<RuleIdentity, BTreeSet<ResourceRef>>,
    /// Resource -> identities it contributed on its last upsert.
    by_resource: HashMap<ResourceRef, Vec<RuleIdentity>>,
}

impl IndexState {
    fn purge(&mut self, resource: &ResourceRef) -> usize {
        let Some(ids) = self.by_resource.remove(resource) else {
            return 0;
        };
        for id in &ids {
            if let Some(owners) = self.by_id.get_mut(id) {
                owners.remove(resource);
                if owners.is_empty() {
                    self.by_id.remove(id);
                }
            }
        }
        ids.len()
    }
}

/// Identity -> resource index of alerting rules.
#[derive(Debug, Default)]
pub struct RuleIndex {
    state: RwLock<IndexState>,
}

impl RuleIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recomputes the identities of every alerting rule in `resource` and
    /// atomically replaces the entries previously stored for it.
    ///
    /// Returns the number of identities now attributed to the resource.
    pub(crate) fn upsert_resource(&self, resource: &RuleGroupResource) -> usize {
        let reference = resource.reference();
        let mut state = self.state.write();

        let mut ids = Vec::new();
        for (group, rule) in resource.rules() {
            if !rule.is_alerting() {
                continue;
            }
            match IdentityHasher::identify(rule) {
                Ok(id) => ids.push(id),
                Err(e) => {
                    warn!(resource = %reference, group = %group, error = %e, "skipping unidentifiable rule");
                }
            }
        }
        ids.sort();
        ids.dedup();

        let purged = state.purge(&reference);
        for id in &ids {
            state
                .by_id
                .entry(id.clone())
                .or_default()
                .insert(reference.clone());
        }
        let count = ids.len();
        state.by_resource.insert(reference.clone(), ids);

        debug!(resource = %reference, purged, indexed = count, "replaced rule index entries");
        count
    }

    /// Removes every entry pointing at `resource`.
    ///
    /// Returns the number of identities removed.
    pub(crate) fn remove_resource(&self, resource: &ResourceRef) -> usize {
        let purged = self.state.write().purge(resource);
        debug!(resource = %resource, purged, "removed rule index entries");
        purged
    }

    /// Returns the resource holding the rule with identity `id`.
    ///
    /// If identical rules live in several resources the lowest reference is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns `RuleError::NotFound` if the identity is not indexed.
    pub fn lookup(&self, id: &RuleIdentity) -> Result<ResourceRef> {
        let state = self.state.read();
        state
            .by_id
            .get(id)
            .and_then(|owners| owners.first().cloned())
            .ok_or_else(|| RuleError::NotFound {
                resource: "alert rule",
                id: id.to_string(),
            })
    }

    /// Returns true if `id` is indexed.
    #[must_use]
    pub fn contains(&self, id: &RuleIdentity) -> bool {
        self.state.read().by_id.contains_key(id)
    }

    /// Returns the identities indexed for `resource`.
    #[must_use]
    pub fn resource_ids(&self, resource: &ResourceRef) -> Vec<RuleIdentity> {
        self.state
            .read()
            .by_resource
            .get(resource)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the number of distinct identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().by_id.len()
    }

    /// Returns true if nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().by_id.is_empty()
    }

    /// Returns the number of resources tracked.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.state.read().by_resource.len()
    }
}
