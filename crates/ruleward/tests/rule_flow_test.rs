//! End-to-end flow tests for ruleward.
//!
//! These tests run a [`RuleManager`] over a [`MemoryStore`] with live watch
//! consumers:
//! 1. Existing resources are indexed from the initial watch replay
//! 2. Mutations land in the store and flow back through the watches
//! 3. Platform label changes surface through effective reads

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ruleward::{
    IdentityHasher, ListRulesOptions, ManagerConfig, MemoryStore, ResourceRef, Rule, RuleError,
    RuleGroup, RuleGroupResource, RuleIdentity, RuleManager, RuleSource,
};
use tokio::time::{sleep, timeout};

// ============================================================================
// Helpers
// ============================================================================

/// Polls `check` until it holds, failing the test after two seconds.
async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let polled = timeout(Duration::from_secs(2), async {
        while !check() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(polled.is_ok(), "timed out waiting for {what}");
}

fn platform_rule() -> Rule {
    Rule::alerting("KubeNodeDown", "up{job=\"kubelet\"} == 0")
        .with_for("15m")
        .with_label("severity", "warning")
        .with_annotation("summary", "node is down")
}

fn platform_ref() -> ResourceRef {
    ResourceRef::new("openshift-monitoring", "openshift-kubernetes-rules")
}

fn seeded_store() -> Arc<MemoryStore> {
    let platform = RuleGroupResource::new("openshift-monitoring", "openshift-kubernetes-rules")
        .with_group(RuleGroup::new("kubernetes-system", vec![platform_rule()]));
    Arc::new(MemoryStore::with_resources(vec![platform], vec![]))
}

async fn start(store: &Arc<MemoryStore>) -> RuleManager<MemoryStore> {
    RuleManager::start(Arc::clone(store), ManagerConfig::default())
        .await
        .expect("manager should start")
}

fn id_of(rule: &Rule) -> RuleIdentity {
    IdentityHasher::identify(rule).expect("rule should be identifiable")
}

// ============================================================================
// Flows
// ============================================================================

#[tokio::test]
async fn test_existing_rules_are_indexed_on_start() {
    let store = seeded_store();
    let manager = start(&store).await;
    let id = id_of(&platform_rule());

    eventually("platform rule indexed", || manager.rule_index().contains(&id)).await;
    assert_eq!(manager.rule_index().lookup(&id).unwrap(), platform_ref());
}

#[tokio::test]
async fn test_user_rule_lifecycle() {
    let store = seeded_store();
    let manager = start(&store).await;
    let target = ResourceRef::new("team-a", "alerts");
    let rule = Rule::alerting("HighLatency", "histogram_quantile(0.99, rate(req[5m])) > 1")
        .with_for("10m")
        .with_label("severity", "critical");

    let id = manager
        .mutator()
        .create_user_defined_alert_rule(rule.clone(), &target, "latency")
        .await
        .unwrap();
    eventually("created rule indexed", || manager.rule_index().contains(&id)).await;

    // Same content again is a conflict once indexed.
    let err = manager
        .mutator()
        .create_user_defined_alert_rule(rule, &target, "latency")
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    let fetched = manager.mutator().get_rule_by_id(&id).await.unwrap();
    assert_eq!(fetched.alert_name(), Some("HighLatency"));
    assert_eq!(id_of(&fetched), id);

    manager.mutator().delete_user_defined_rule_by_id(&id).await.unwrap();
    eventually("deleted rule unindexed", || !manager.rule_index().contains(&id)).await;
    assert!(store.rule_group(&target).is_none());

    let err = manager.mutator().get_rule_by_id(&id).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_platform_label_update_through_relabel() {
    let store = seeded_store();
    let manager = start(&store).await;
    let id = id_of(&platform_rule());
    eventually("platform rule indexed", || manager.rule_index().contains(&id)).await;

    let desired = platform_rule()
        .with_label("severity", "critical")
        .with_label("team", "node");
    manager
        .mutator()
        .update_platform_alert_rule(&id, &desired)
        .await
        .unwrap();

    eventually("overlay indexed", || {
        manager
            .overlay_index()
            .find_directives_for_alert_name("KubeNodeDown")
            .len()
            == 2
    })
    .await;

    let effective = manager.mutator().get_rule_by_id(&id).await.unwrap();
    assert_eq!(
        effective.labels,
        HashMap::from([
            ("severity".to_string(), "critical".to_string()),
            ("team".to_string(), "node".to_string()),
        ])
    );

    // The stored rule is untouched, so its ID still resolves.
    assert_eq!(manager.rule_index().lookup(&id).unwrap(), platform_ref());
    assert_eq!(
        store.rule_group(&platform_ref()).unwrap().groups[0].rules[0],
        platform_rule()
    );
}

#[tokio::test]
async fn test_platform_rules_are_protected() {
    let store = seeded_store();
    let manager = start(&store).await;
    let id = id_of(&platform_rule());
    eventually("platform rule indexed", || manager.rule_index().contains(&id)).await;

    let err = manager
        .mutator()
        .delete_user_defined_rule_by_id(&id)
        .await
        .unwrap_err();
    assert!(err.is_not_allowed());

    let err = manager
        .mutator()
        .create_user_defined_alert_rule(Rule::alerting("Mine", "up == 0"), &platform_ref(), "g")
        .await
        .unwrap_err();
    assert!(err.is_not_allowed());

    assert_eq!(store.calls().mutations(), 0);
}

#[tokio::test]
async fn test_duplicate_platform_rule_into_user_resource() {
    let store = seeded_store();
    let manager = start(&store).await;
    let id = id_of(&platform_rule());
    eventually("platform rule indexed", || manager.rule_index().contains(&id)).await;

    let copy_id = manager
        .mutator()
        .duplicate_rule(&id, "KubeNodeDownCopy", &ResourceRef::new("team-a", "copies"), "")
        .await
        .unwrap();
    eventually("copy indexed", || manager.rule_index().contains(&copy_id)).await;

    let user_rules = manager
        .mutator()
        .list_rules(&ListRulesOptions {
            source: Some(RuleSource::UserDefined),
            ..ListRulesOptions::default()
        })
        .await
        .unwrap();
    assert_eq!(user_rules.len(), 1);
    assert_eq!(user_rules[0].id, copy_id);
    assert_eq!(user_rules[0].group, "user-defined-rules");
}

#[tokio::test]
async fn test_out_of_band_edit_changes_identity() {
    let store = seeded_store();
    let manager = start(&store).await;
    let old_id = id_of(&platform_rule());
    eventually("platform rule indexed", || manager.rule_index().contains(&old_id)).await;

    let edited = platform_rule().with_for("30m");
    store.put_rule_group(
        RuleGroupResource::new("openshift-monitoring", "openshift-kubernetes-rules")
            .with_group(RuleGroup::new("kubernetes-system", vec![edited.clone()])),
    );

    let new_id = id_of(&edited);
    eventually("edit reindexed", || {
        manager.rule_index().contains(&new_id) && !manager.rule_index().contains(&old_id)
    })
    .await;
}

#[tokio::test]
async fn test_watch_errors_do_not_stop_consumers() {
    let store = seeded_store();
    let manager = start(&store).await;

    store.inject_watch_error("resource version too old");

    let rule = Rule::alerting("AfterError", "up == 0");
    let id = manager
        .mutator()
        .create_user_defined_alert_rule(rule, &ResourceRef::new("team-a", "alerts"), "g")
        .await
        .unwrap();
    eventually("rule indexed after error", || manager.rule_index().contains(&id)).await;
}

#[tokio::test]
async fn test_closed_watch_is_fatal() {
    let store = seeded_store();
    let mut manager = start(&store).await;

    store.close_watches();

    let err = timeout(Duration::from_secs(2), manager.watch_failure())
        .await
        .expect("consumer should stop")
        .expect("a consumer should report");
    assert!(matches!(err, RuleError::WatchTerminated { .. }));
}
