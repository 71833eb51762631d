//! Watch consumers feeding the indexes.
//!
//! Each watched kind has exactly one consumer task, and that task is the only
//! writer of its index. Events for one object arrive in order; events for
//! different objects may interleave, which is harmless because every update is
//! a batch replacement keyed by the object's reference.
//!
//! A closed stream ends the consumer with [`RuleError::WatchTerminated`]: the
//! index would silently go stale otherwise, so the host should treat it as fatal.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::error::{Result, RuleError};
use crate::index::RuleIndex;
use crate::relabel::RelabelOverlayIndex;
use crate::store::{RELABEL_CONFIG_KIND, RULE_GROUP_KIND, WatchEvent, WatchStream};
use crate::types::{RelabelConfigResource, RuleGroupResource};

/// An index that can be driven by watch events of `T`.
pub(crate) trait WatchSink<T>: Send + Sync + 'static {
    /// Kind name for logs and errors.
    const KIND: &'static str;

    fn upsert(&self, object: &T);

    fn remove(&self, object: &T);
}

impl WatchSink<RuleGroupResource> for RuleIndex {
    const KIND: &'static str = RULE_GROUP_KIND;

    fn upsert(&self, object: &RuleGroupResource) {
        self.upsert_resource(object);
    }

    fn remove(&self, object: &RuleGroupResource) {
        self.remove_resource(&object.reference());
    }
}

impl WatchSink<RelabelConfigResource> for RelabelOverlayIndex {
    const KIND: &'static str = RELABEL_CONFIG_KIND;

    fn upsert(&self, object: &RelabelConfigResource) {
        self.upsert_resource(object);
    }

    fn remove(&self, object: &RelabelConfigResource) {
        self.remove_resource(&object.reference());
    }
}

/// Applies one event to `sink`.
pub(crate) fn apply_event<T, S: WatchSink<T>>(sink: &S, event: WatchEvent<T>) {
    match event {
        WatchEvent::Added(object) | WatchEvent::Modified(object) => sink.upsert(&object),
        WatchEvent::Deleted(object) => sink.remove(&object),
        WatchEvent::Error(message) => {
            warn!(kind = S::KIND, error = %message, "watch reported an error");
        }
    }
}

/// Consumes `events` into `sink` until the stream closes.
///
/// # Errors
///
/// Always returns `RuleError::WatchTerminated` once the stream ends.
pub(crate) async fn run_watch<T, S>(sink: Arc<S>, mut events: WatchStream<T>) -> Result<()>
where
    T: Send + 'static,
    S: WatchSink<T>,
{
    info!(kind = S::KIND, "watch consumer started");
    while let Some(event) = events.recv().await {
        apply_event(sink.as_ref(), event);
    }
    error!(kind = S::KIND, "watch stream closed unexpectedly");
    Err(RuleError::WatchTerminated { kind: S::KIND })
}

/// Consumes rule-group events into `index`.
///
/// # Errors
///
/// Returns `RuleError::WatchTerminated` once the stream ends.
pub async fn run_rule_group_watch(
    index: Arc<RuleIndex>,
    events: WatchStream<RuleGroupResource>,
) -> Result<()> {
    run_watch(index, events).await
}

/// Consumes relabel events into `index`.
///
/// # Errors
///
/// Returns `RuleError::WatchTerminated` once the stream ends.
pub async fn run_relabel_watch(
    index: Arc<RelabelOverlayIndex>,
    events: WatchStream<RelabelConfigResource>,
) -> Result<()> {
    run_watch(index, events).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityHasher;
    use crate::types::{Rule, RuleGroup};
    use tokio::sync::mpsc;

    fn resource(rules: Vec<Rule>) -> RuleGroupResource {
        RuleGroupResource::new("ns", "rules").with_group(RuleGroup::new("g", rules))
    }

    #[test]
    fn apply_event_sequence() {
        let index = RuleIndex::new();
        let a = Rule::alerting("A", "1");
        let b = Rule::alerting("B", "1");
        let id_a = IdentityHasher::identify(&a).unwrap();
        let id_b = IdentityHasher::identify(&b).unwrap();

        apply_event(&index, WatchEvent::Added(resource(vec![a.clone()])));
        assert!(index.contains(&id_a));

        apply_event(&index, WatchEvent::Modified(resource(vec![b.clone()])));
        assert!(!index.contains(&id_a));
        assert!(index.contains(&id_b));

        apply_event(&index, WatchEvent::<RuleGroupResource>::Error("gone".to_string()));
        assert!(index.contains(&id_b));

        apply_event(&index, WatchEvent::Deleted(resource(vec![b])));
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn consumer_fails_when_stream_closes() {
        let index = Arc::new(RuleIndex::new());
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(WatchEvent::Added(resource(vec![Rule::alerting("A", "1")])))
            .unwrap();
        drop(tx);

        let err = run_rule_group_watch(index.clone(), rx).await.unwrap_err();
        assert!(matches!(err, RuleError::WatchTerminated { kind: "PrometheusRule" }));
        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn relabel_consumer_feeds_overlay() {
        use crate::types::{RelabelConfigResource, RelabelDirective};

        let index = Arc::new(RelabelOverlayIndex::new());
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(WatchEvent::Added(RelabelConfigResource::new(
            "ns",
            "arc",
            vec![RelabelDirective {
                source_labels: vec!["alertname".to_string()],
                regex: "X".to_string(),
                target_label: "team".to_string(),
                ..RelabelDirective::default()
            }],
        )))
        .unwrap();
        drop(tx);

        assert!(run_relabel_watch(index.clone(), rx).await.is_err());
        assert_eq!(index.find_directives_for_alert_name("X").len(), 1);
    }
}
