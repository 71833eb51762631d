//! Rule manager wiring the store, the watch consumers and the mutator.
//!
//! [`RuleManager::start`] subscribes to both watched kinds, spawns one consumer
//! task per kind and hands out a [`RuleMutator`] reading the indexes those
//! tasks maintain.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{error, info};

use crate::config::ManagerConfig;
use crate::error::{Result, RuleError};
use crate::index::RuleIndex;
use crate::mutator::RuleMutator;
use crate::relabel::RelabelOverlayIndex;
use crate::store::{RELABEL_CONFIG_KIND, RULE_GROUP_KIND, RelabelConfigStore, RuleGroupStore};
use crate::watch::{run_relabel_watch, run_rule_group_watch};

/// Kind reported when a consumer task ends without reporting its own.
const CONSUMER_KIND: &str = "watch consumer";

/// Owns the watch consumers and the mutator built on their indexes.
#[derive(Debug)]
pub struct RuleManager<S> {
    mutator: RuleMutator<S>,
    rules: Arc<RuleIndex>,
    overlays: Arc<RelabelOverlayIndex>,
    consumers: JoinSet<RuleError>,
}

impl<S> RuleManager<S>
where
    S: RuleGroupStore + RelabelConfigStore,
{
    /// Validates `config`, subscribes to both watches and starts consuming them.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `Config` for an invalid configuration, or a wrapped store error
    /// if a watch cannot be opened.
    pub async fn start(store: Arc<S>, config: ManagerConfig) -> Result<Self> {
        config.validate()?;
        let deadline = config.call_timeout();

        let rule_events = tokio::time::timeout(deadline, store.watch_rule_groups())
            .await
            .map_err(|_| RuleError::Timeout {
                operation: format!("watch {RULE_GROUP_KIND}"),
            })?
            .map_err(|e| RuleError::store(format!("failed to watch {RULE_GROUP_KIND}"), e))?;

        let relabel_events = tokio::time::timeout(deadline, store.watch_relabel_configs())
            .await
            .map_err(|_| RuleError::Timeout {
                operation: format!("watch {RELABEL_CONFIG_KIND}"),
            })?
            .map_err(|e| RuleError::store(format!("failed to watch {RELABEL_CONFIG_KIND}"), e))?;

        let rules = Arc::new(RuleIndex::new());
        let overlays = Arc::new(RelabelOverlayIndex::new());

        let mut consumers = JoinSet::new();
        {
            let rules = Arc::clone(&rules);
            consumers.spawn(async move {
                run_rule_group_watch(rules, rule_events)
                    .await
                    .err()
                    .unwrap_or(RuleError::WatchTerminated {
                        kind: RULE_GROUP_KIND,
                    })
            });
        }
        {
            let overlays = Arc::clone(&overlays);
            consumers.spawn(async move {
                run_relabel_watch(overlays, relabel_events)
                    .await
                    .err()
                    .unwrap_or(RuleError::WatchTerminated {
                        kind: RELABEL_CONFIG_KIND,
                    })
            });
        }

        let timeout_secs = config.call_timeout_secs;
        let mutator = RuleMutator::new(store, Arc::clone(&rules), Arc::clone(&overlays), config);
        info!(
            platform_prefix = %mutator.classifier().prefix(),
            timeout_secs,
            "rule manager started"
        );

        Ok(Self {
            mutator,
            rules,
            overlays,
            consumers,
        })
    }

    /// Returns the mutator.
    #[must_use]
    pub fn mutator(&self) -> &RuleMutator<S> {
        &self.mutator
    }

    /// Returns the rule index maintained by the rule-group consumer.
    #[must_use]
    pub fn rule_index(&self) -> &RuleIndex {
        &self.rules
    }

    /// Returns the overlay index maintained by the relabel consumer.
    #[must_use]
    pub fn overlay_index(&self) -> &RelabelOverlayIndex {
        &self.overlays
    }

    /// Waits until a watch consumer stops and returns why.
    ///
    /// Returns `None` once every consumer has been reaped, e.g. after
    /// [`Self::shutdown`]. A host should treat `Some` as fatal: the indexes no
    /// longer follow the store.
    pub async fn watch_failure(&mut self) -> Option<RuleError> {
        match self.consumers.join_next().await? {
            Ok(err) => Some(err),
            Err(join_err) => {
                error!(error = %join_err, "watch consumer task failed");
                Some(RuleError::WatchTerminated {
                    kind: CONSUMER_KIND,
                })
            }
        }
    }

    /// Stops the watch consumers.
    pub async fn shutdown(mut self) {
        self.consumers.abort_all();
        while self.consumers.join_next().await.is_some() {}
        info!("rule manager stopped");
    }
}
