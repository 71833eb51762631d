//! Identity, indexing and mutation of CRD-backed Prometheus alerting rules.
//!
//! `ruleward` manages alerting rules that live inside rule-group resources in
//! a remote store, alongside relabel resources that rewrite alert labels at
//! evaluation time.
//!
//! # Features
//!
//! - **Content-addressed IDs**: A rule's ID is a SHA-256 digest of its semantic
//!   content, so it is stable across restarts and needs no extra state
//! - **Watch-fed indexes**: ID -> resource and alert name -> relabel directives,
//!   each maintained by a single watch consumer
//! - **Platform protection**: Platform-managed rules are never edited in place;
//!   label changes become relabel directives instead
//! - **Effective reads**: Reading a platform rule replays its relabel overlay
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use ruleward::{ManagerConfig, MemoryStore, ResourceRef, Rule, RuleManager};
//!
//! # tokio_test();
//! # fn tokio_test() {
//! # let rt = tokio::runtime::Runtime::new().unwrap();
//! # rt.block_on(async {
//! let store = Arc::new(MemoryStore::new());
//! let manager = RuleManager::start(store, ManagerConfig::default()).await.unwrap();
//!
//! let rule = Rule::alerting("InstanceDown", "up == 0")
//!     .with_for("5m")
//!     .with_label("severity", "warning");
//!
//! let id = manager
//!     .mutator()
//!     .create_user_defined_alert_rule(rule, &ResourceRef::new("default", "my-rules"), "")
//!     .await
//!     .unwrap();
//! assert_eq!(id.as_str().len(), 64);
//! # });
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod error;
pub mod identity;
pub mod index;
pub mod manager;
pub mod memory;
pub mod mutator;
pub mod platform;
pub mod relabel;
pub mod store;
pub mod types;
pub mod watch;

// Re-export main types at crate root
pub use config::{DEFAULT_GROUP_NAME, ManagerConfig};
pub use error::{Result, RuleError, StoreError};
pub use identity::{IdentityHasher, RULE_ID_ANNOTATION, RuleIdentity};
pub use index::RuleIndex;
pub use manager::RuleManager;
pub use memory::{CallCounts, MemoryStore};
pub use mutator::{DeleteOutcome, ListRulesOptions, RuleEntry, RuleMutator};
pub use platform::{DEFAULT_PLATFORM_PREFIX, PlatformClassifier};
pub use relabel::{RelabelIndexEntry, RelabelOverlayIndex};
pub use store::{RelabelConfigStore, RuleGroupStore, StoreResult, WatchEvent, WatchStream};
pub use types::{
    RelabelAction, RelabelConfigResource, RelabelDirective, ResourceRef, Rule, RuleExpr,
    RuleGroup, RuleGroupResource, RuleKind, RuleSource,
};
