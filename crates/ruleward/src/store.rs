//! Storage collaborator interfaces.
//!
//! The authoritative state lives in a remote store. These traits describe the
//! calls the mutator issues against it and the watch streams that feed the
//! in-process indexes. [`MemoryStore`](crate::memory::MemoryStore) implements
//! both traits in-process.

use std::future::Future;

use tokio::sync::mpsc;

use crate::error::StoreError;
use crate::types::{RelabelConfigResource, ResourceRef, Rule, RuleGroupResource};

/// Kind name of rule-group resources, used in errors and logs.
pub const RULE_GROUP_KIND: &str = "PrometheusRule";

/// Kind name of relabel resources, used in errors and logs.
pub const RELABEL_CONFIG_KIND: &str = "AlertRelabelConfig";

/// Result of a storage call.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A change observed on a watched resource kind. Every event carries the full object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent<T> {
    /// The object appeared, or was redelivered by a resync.
    Added(T),
    /// The object changed.
    Modified(T),
    /// The object was removed; carries its last known state.
    Deleted(T),
    /// The watch reported an error; the stream continues.
    Error(String),
}

/// A stream of watch events. Closing the stream ends the watch.
pub type WatchStream<T> = mpsc::UnboundedReceiver<WatchEvent<T>>;

/// Operations on rule-group resources.
pub trait RuleGroupStore: Send + Sync + 'static {
    /// Lists resources, across all namespaces when `namespace` is `None`.
    fn list_rule_groups(
        &self,
        namespace: Option<&str>,
    ) -> impl Future<Output = StoreResult<Vec<RuleGroupResource>>> + Send;

    /// Gets one resource.
    fn get_rule_group(
        &self,
        resource: &ResourceRef,
    ) -> impl Future<Output = StoreResult<RuleGroupResource>> + Send;

    /// Replaces a resource's content.
    fn update_rule_group(
        &self,
        resource: RuleGroupResource,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Deletes a resource.
    fn delete_rule_group(
        &self,
        resource: &ResourceRef,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Appends a rule to the named group, creating the resource and group as needed.
    fn add_rule(
        &self,
        resource: &ResourceRef,
        group_name: &str,
        rule: Rule,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Subscribes to rule-group changes. Existing objects are delivered as `Added` first.
    fn watch_rule_groups(
        &self,
    ) -> impl Future<Output = StoreResult<WatchStream<RuleGroupResource>>> + Send;
}

/// Operations on relabel resources.
pub trait RelabelConfigStore: Send + Sync + 'static {
    /// Gets one relabel resource.
    fn get_relabel_config(
        &self,
        resource: &ResourceRef,
    ) -> impl Future<Output = StoreResult<RelabelConfigResource>> + Send;

    /// Replaces a relabel resource's content.
    fn update_relabel_config(
        &self,
        resource: RelabelConfigResource,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Creates a relabel resource.
    fn create_relabel_config(
        &self,
        resource: RelabelConfigResource,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Subscribes to relabel changes. Existing objects are delivered as `Added` first.
    fn watch_relabel_configs(
        &self,
    ) -> impl Future<Output = StoreResult<WatchStream<RelabelConfigResource>>> + Send;
}
