//! Rule mutations against the remote store.
//!
//! [`RuleMutator`] resolves external rule IDs through the [`RuleIndex`], reads
//! and writes rule-group resources through the storage collaborator, and
//! expresses label changes to platform rules as relabel directives.
//!
//! Every operation is one-shot. The indexes are only read here; they are kept
//! current by the watch consumers.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::ManagerConfig;
use crate::error::{Result, RuleError};
use crate::identity::{IdentityHasher, RULE_ID_ANNOTATION, RuleIdentity};
use crate::index::RuleIndex;
use crate::platform::PlatformClassifier;
use crate::relabel::{
    RelabelOverlayIndex, apply_overlay, label_change_directives, relabel_resource_name,
};
use crate::store::{RelabelConfigStore, RuleGroupStore, StoreResult};
use crate::types::{
    DEFAULT_SEPARATOR, RelabelConfigResource, ResourceRef, Rule, RuleGroupResource, RuleSource,
};

/// A rule together with where it lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleEntry {
    /// Identity of the rule.
    pub id: RuleIdentity,
    /// Owning rule-group resource.
    pub resource: ResourceRef,
    /// Group within the resource.
    pub group: String,
    /// Platform-managed or user-defined.
    pub source: RuleSource,
    /// The rule as stored.
    pub rule: Rule,
}

/// Filters for [`RuleMutator::list_rules`]. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRulesOptions {
    /// Restrict to one namespace.
    pub namespace: Option<String>,
    /// Restrict to one resource; requires `namespace`.
    pub name: Option<String>,
    /// Restrict to one group.
    pub group_name: Option<String>,
    /// Restrict to one alert name.
    pub alert_name: Option<String>,
    /// Restrict to platform or user-defined resources.
    pub source: Option<RuleSource>,
    /// Every pair must be present on the rule's labels.
    pub labels: HashMap<String, String>,
}

/// Outcome of deleting one ID in a bulk delete.
#[derive(Debug)]
pub struct DeleteOutcome {
    /// The ID as supplied by the caller.
    pub id: String,
    /// What happened.
    pub result: Result<()>,
}

/// Orchestrates rule mutations.
#[derive(Debug)]
pub struct RuleMutator<S> {
    store: Arc<S>,
    rules: Arc<RuleIndex>,
    overlays: Arc<RelabelOverlayIndex>,
    classifier: PlatformClassifier,
    config: ManagerConfig,
}

impl<S> RuleMutator<S>
where
    S: RuleGroupStore + RelabelConfigStore,
{
    /// Creates a mutator over the given store and indexes.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        rules: Arc<RuleIndex>,
        overlays: Arc<RelabelOverlayIndex>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            store,
            rules,
            overlays,
            classifier: PlatformClassifier::new(&config.platform_prefix),
            config,
        }
    }

    /// Returns the rule index this mutator reads.
    #[must_use]
    pub fn rule_index(&self) -> &RuleIndex {
        &self.rules
    }

    /// Returns the relabel overlay index this mutator reads.
    #[must_use]
    pub fn overlay_index(&self) -> &RelabelOverlayIndex {
        &self.overlays
    }

    /// Returns the platform classifier in use.
    #[must_use]
    pub const fn classifier(&self) -> &PlatformClassifier {
        &self.classifier
    }

    /// Runs a storage call under the configured deadline.
    async fn call<T>(
        &self,
        operation: String,
        fut: impl Future<Output = StoreResult<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.config.call_timeout(), fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(RuleError::store(format!("failed to {operation}"), source)),
            Err(_) => Err(RuleError::Timeout { operation }),
        }
    }

    // ============ Create ============

    /// Adds a user-defined alerting rule to `group_name` in `target`.
    ///
    /// Returns the rule's identity, which serves as its external ID.
    ///
    /// # Errors
    ///
    /// - `Validation` if the target is incomplete or the rule is malformed
    /// - `NotAllowed` if the target is platform-managed
    /// - `Conflict` if a rule with identical content is already indexed
    pub async fn create_user_defined_alert_rule(
        &self,
        mut rule: Rule,
        target: &ResourceRef,
        group_name: &str,
    ) -> Result<RuleIdentity> {
        if !target.is_complete() {
            return Err(RuleError::validation(
                "rule group name and namespace must be specified",
            ));
        }

        if self.classifier.is_platform(target) {
            return Err(RuleError::not_allowed(format!(
                "cannot add alert rule to platform-managed rule group {target}"
            )));
        }

        rule.validate()?;
        if !rule.is_alerting() {
            return Err(RuleError::validation(
                "only alerting rules can be created",
            ));
        }

        let id = IdentityHasher::identify(&rule)?;
        if self.rules.contains(&id) {
            return Err(RuleError::Conflict {
                reason: "alert rule with exact config already exists".to_string(),
            });
        }

        let group_name = if group_name.trim().is_empty() {
            self.config.default_group_name.as_str()
        } else {
            group_name
        };

        if self.config.stamp_rule_id {
            IdentityHasher::stamp(&mut rule)?;
        }

        self.call(
            format!("add rule to rule group {target}"),
            self.store.add_rule(target, group_name, rule),
        )
        .await?;

        info!(rule_id = %id, resource = %target, group = %group_name, "created alert rule");
        Ok(id)
    }

    /// Copies the effective rule `source_id` under a new alert name into `target`.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Self::get_rule_by_id`] and
    /// [`Self::create_user_defined_alert_rule`], and `Validation` for an empty name.
    pub async fn duplicate_rule(
        &self,
        source_id: &RuleIdentity,
        new_alert_name: &str,
        target: &ResourceRef,
        group_name: &str,
    ) -> Result<RuleIdentity> {
        let new_alert_name = new_alert_name.trim();
        if new_alert_name.is_empty() {
            return Err(RuleError::validation("new alert name cannot be empty"));
        }

        let mut rule = self.get_rule_by_id(source_id).await?;
        rule.alert = Some(new_alert_name.to_string());
        rule.record = None;
        rule.annotations.remove(RULE_ID_ANNOTATION);

        self.create_user_defined_alert_rule(rule, target, group_name)
            .await
    }

    // ============ Delete ============

    /// Deletes every rule whose content hashes to `id` from its owning resource.
    ///
    /// Groups left empty are dropped; a resource left without groups is deleted.
    /// If the rule is already gone the call succeeds without writing.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `id` is not indexed, or a wrapped store error.
    pub async fn delete_rule_by_id(&self, id: &RuleIdentity) -> Result<()> {
        let reference = self.rules.lookup(id)?;

        let resource = match self
            .call(
                format!("get rule group {reference}"),
                self.store.get_rule_group(&reference),
            )
            .await
        {
            Ok(resource) => resource,
            Err(e) if e.is_not_found() => {
                debug!(rule_id = %id, resource = %reference, "owning rule group already gone");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let (remaining, removed) = without_rule(resource, id);
        if removed == 0 {
            debug!(rule_id = %id, resource = %reference, "rule already absent");
            return Ok(());
        }

        if remaining.groups.is_empty() {
            self.call(
                format!("delete rule group {reference}"),
                self.store.delete_rule_group(&reference),
            )
            .await?;
            info!(rule_id = %id, resource = %reference, "deleted last rule, removed rule group");
        } else {
            self.call(
                format!("update rule group {reference}"),
                self.store.update_rule_group(remaining),
            )
            .await?;
            info!(rule_id = %id, resource = %reference, removed, "deleted alert rule");
        }

        Ok(())
    }

    /// Deletes a rule unless it belongs to a platform-managed resource.
    ///
    /// # Errors
    ///
    /// Returns `NotAllowed` for platform rules, otherwise as [`Self::delete_rule_by_id`].
    pub async fn delete_user_defined_rule_by_id(&self, id: &RuleIdentity) -> Result<()> {
        let reference = self.rules.lookup(id)?;
        if self.classifier.is_platform(&reference) {
            return Err(RuleError::not_allowed(
                "cannot delete alert rule from a platform-managed rule group",
            ));
        }
        self.delete_rule_by_id(id).await
    }

    /// Deletes several user-defined rules, reporting each outcome separately.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if `ids` is empty.
    pub async fn bulk_delete_user_defined_rules(
        &self,
        ids: &[String],
    ) -> Result<Vec<DeleteOutcome>> {
        if ids.is_empty() {
            return Err(RuleError::validation("at least one rule id is required"));
        }

        let mut outcomes = Vec::with_capacity(ids.len());
        for raw in ids {
            let result = match raw.parse::<RuleIdentity>() {
                Ok(id) => self.delete_user_defined_rule_by_id(&id).await,
                Err(e) => Err(e),
            };
            outcomes.push(DeleteOutcome {
                id: raw.clone(),
                result,
            });
        }
        Ok(outcomes)
    }

    // ============ Read ============

    /// Returns the rule with identity `id` and where it lives, as stored.
    async fn find_raw(&self, id: &RuleIdentity) -> Result<RuleEntry> {
        let reference = self.rules.lookup(id)?;
        let resource = self
            .call(
                format!("get rule group {reference}"),
                self.store.get_rule_group(&reference),
            )
            .await?;

        let source = self.classifier.classify(&reference);
        resource
            .groups
            .into_iter()
            .find_map(|group| {
                let name = group.name;
                group
                    .rules
                    .into_iter()
                    .find(|rule| IdentityHasher::matches(rule, id))
                    .map(|rule| (name, rule))
            })
            .map(|(group, rule)| RuleEntry {
                id: id.clone(),
                resource: reference.clone(),
                group,
                source,
                rule,
            })
            .ok_or_else(|| RuleError::NotFound {
                resource: "alert rule",
                id: format!("{id} in rule group {reference}"),
            })
    }

    /// Returns the effective rule with identity `id`.
    ///
    /// For platform rules, the relabel overlay for the alert is replayed onto
    /// the labels, so callers see what the monitoring stack will emit.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `id` is unknown or no longer in its resource.
    pub async fn get_rule_by_id(&self, id: &RuleIdentity) -> Result<Rule> {
        let entry = self.find_raw(id).await?;
        let mut rule = entry.rule;

        if entry.source == RuleSource::Platform {
            if let Some(alert_name) = rule.alert_name() {
                let directives = self.overlays.find_directives_for_alert_name(alert_name);
                let applied = apply_overlay(&mut rule, &directives);
                debug!(rule_id = %id, applied, "replayed relabel overlay");
            }
        }

        Ok(rule)
    }

    // ============ Update ============

    /// Changes the labels of a platform rule through a relabel resource.
    ///
    /// Only labels are compared; the relabel resource for the alert is
    /// created or has its directive list replaced wholesale.
    ///
    /// # Errors
    ///
    /// - `NotFound` if `id` is unknown
    /// - `NotAllowed` if the rule is not platform-managed
    /// - `Validation` if the labels are unchanged or the alert name contains
    ///   the relabel separator
    pub async fn update_platform_alert_rule(&self, id: &RuleIdentity, desired: &Rule) -> Result<()> {
        let reference = self.rules.lookup(id)?;
        if !self.classifier.is_platform(&reference) {
            return Err(RuleError::not_allowed("cannot update non-platform alert rule"));
        }

        let original = self.find_raw(id).await?.rule;
        let alert_name = original.alert_name().ok_or_else(|| RuleError::NotFound {
            resource: "alert rule",
            id: id.to_string(),
        })?;
        if alert_name.contains(DEFAULT_SEPARATOR) {
            return Err(RuleError::validation(format!(
                "alert name '{alert_name}' contains the relabel separator '{DEFAULT_SEPARATOR}'"
            )));
        }

        let directives = label_change_directives(alert_name, &original.labels, &desired.labels);
        if directives.is_empty() {
            return Err(RuleError::validation(
                "no label changes detected; platform alert rules only support label updates",
            ));
        }

        let relabel_ref = ResourceRef::new(
            &reference.namespace,
            relabel_resource_name(&reference.name, alert_name),
        );
        let count = directives.len();

        match self
            .call(
                format!("get relabel config {relabel_ref}"),
                self.store.get_relabel_config(&relabel_ref),
            )
            .await
        {
            Ok(mut existing) => {
                existing.configs = directives;
                self.call(
                    format!("update relabel config {relabel_ref}"),
                    self.store.update_relabel_config(existing),
                )
                .await?;
            }
            Err(e) if e.is_not_found() => {
                let created = RelabelConfigResource::new(
                    &relabel_ref.namespace,
                    &relabel_ref.name,
                    directives,
                );
                self.call(
                    format!("create relabel config {relabel_ref}"),
                    self.store.create_relabel_config(created),
                )
                .await?;
            }
            Err(e) => return Err(e),
        }

        info!(rule_id = %id, relabel = %relabel_ref, directives = count, "updated platform alert rule");
        Ok(())
    }

    // ============ List ============

    /// Lists alerting rules matching `options`, straight from storage.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if a name is given without a namespace, or a
    /// wrapped store error.
    pub async fn list_rules(&self, options: &ListRulesOptions) -> Result<Vec<RuleEntry>> {
        let resources = match (&options.namespace, &options.name) {
            (None, Some(_)) => {
                return Err(RuleError::validation(
                    "namespace must be specified when name is provided",
                ));
            }
            (Some(namespace), Some(name)) => {
                let reference = ResourceRef::new(namespace, name);
                vec![
                    self.call(
                        format!("get rule group {reference}"),
                        self.store.get_rule_group(&reference),
                    )
                    .await?,
                ]
            }
            (namespace, None) => {
                self.call(
                    "list rule groups".to_string(),
                    self.store.list_rule_groups(namespace.as_deref()),
                )
                .await?
            }
        };

        let mut entries = Vec::new();
        for resource in &resources {
            self.collect_matching(resource, options, &mut entries);
        }
        Ok(entries)
    }

    fn collect_matching(
        &self,
        resource: &RuleGroupResource,
        options: &ListRulesOptions,
        out: &mut Vec<RuleEntry>,
    ) {
        let reference = resource.reference();
        let source = self.classifier.classify(&reference);
        if options.source.is_some_and(|wanted| wanted != source) {
            return;
        }

        for (group, rule) in resource.rules() {
            if options
                .group_name
                .as_deref()
                .is_some_and(|wanted| wanted != group)
            {
                continue;
            }
            let Some(alert_name) = rule.alert_name() else {
                continue;
            };
            if options
                .alert_name
                .as_deref()
                .is_some_and(|wanted| wanted != alert_name)
            {
                continue;
            }
            if !options
                .labels
                .iter()
                .all(|(k, v)| rule.labels.get(k) == Some(v))
            {
                continue;
            }
            let Ok(id) = IdentityHasher::identify(rule) else {
                continue;
            };
            out.push(RuleEntry {
                id,
                resource: reference.clone(),
                group: group.to_string(),
                source,
                rule: rule.clone(),
            });
        }
    }
}

/// Removes every rule hashing to `id`, dropping groups left empty.
///
/// Returns the filtered resource and the number of rules removed.
fn without_rule(mut resource: RuleGroupResource, id: &RuleIdentity) -> (RuleGroupResource, usize) {
    let mut removed = 0;
    for group in &mut resource.groups {
        let before = group.rules.len();
        group.rules.retain(|rule| !IdentityHasher::matches(rule, id));
        removed += before - group.rules.len();
    }
    if removed > 0 {
        resource.groups.retain(|group| !group.rules.is_empty());
    }
    (resource, removed)
}
