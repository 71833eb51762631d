//! Content-addressed rule identity.
//!
//! Rules stored inside a rule-group resource have no identifier of their own.
//! [`IdentityHasher`] derives one from the rule's semantic content: a SHA-256
//! digest over a canonical, newline-joined serialization of the rule kind,
//! name, expression, `for` duration, sorted labels and sorted annotations.
//!
//! The annotation [`RULE_ID_ANNOTATION`] is excluded from the digest so the
//! identity can be stamped back onto the rule without changing it.
//!
//! The digest is handed out as an opaque external ID and must stay stable.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, RuleError};
use crate::types::Rule;

/// Annotation key used to stamp a rule with its own identity.
pub const RULE_ID_ANNOTATION: &str = "ruleward_id";

/// Annotation keys that never contribute to the identity.
const VOLATILE_ANNOTATIONS: &[&str] = &[RULE_ID_ANNOTATION];

/// Length of an identity in hex characters.
pub const IDENTITY_LEN: usize = 64;

/// A 64-character lowercase hex SHA-256 digest identifying a rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RuleIdentity(String);

impl RuleIdentity {
    /// Returns the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RuleIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for RuleIdentity {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self> {
        let well_formed = s.len() == IDENTITY_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !well_formed {
            return Err(RuleError::validation(format!(
                "rule id must be {IDENTITY_LEN} lowercase hex characters"
            )));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for RuleIdentity {
    type Error = RuleError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<RuleIdentity> for String {
    fn from(id: RuleIdentity) -> Self {
        id.0
    }
}

/// Computes rule identities.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityHasher;

impl IdentityHasher {
    /// Returns the identity of `rule`.
    ///
    /// # Errors
    ///
    /// Returns `RuleError::Validation` if neither an alert nor a record name is set.
    pub fn identify(rule: &Rule) -> Result<RuleIdentity> {
        let canonical = Self::canonical_form(rule)?;
        let digest = Sha256::digest(canonical.as_bytes());
        Ok(RuleIdentity(hex::encode(digest)))
    }

    /// Returns the string that gets hashed.
    ///
    /// # Errors
    ///
    /// Returns `RuleError::Validation` if neither an alert nor a record name is set.
    pub fn canonical_form(rule: &Rule) -> Result<String> {
        let (kind, name) = rule.kind_and_name().ok_or_else(|| {
            RuleError::validation("rule must have either 'alert' or 'record' set")
        })?;

        let expr = rule.expr.to_string();
        let labels = sorted_pairs(&rule.labels, |_| true);
        let annotations = sorted_pairs(&rule.annotations, |k| !VOLATILE_ANNOTATIONS.contains(&k));

        Ok([
            kind.as_str(),
            name,
            expr.as_str(),
            rule.for_duration.as_deref().unwrap_or_default(),
            labels.as_str(),
            annotations.as_str(),
        ]
        .join("\n"))
    }

    /// Writes the identity of `rule` into its [`RULE_ID_ANNOTATION`].
    ///
    /// # Errors
    ///
    /// Returns `RuleError::Validation` if neither an alert nor a record name is set.
    pub fn stamp(rule: &mut Rule) -> Result<RuleIdentity> {
        let id = Self::identify(rule)?;
        rule.annotations
            .insert(RULE_ID_ANNOTATION.to_string(), id.to_string());
        Ok(id)
    }

    /// Returns true if `rule` hashes to `id`. Nameless rules never match.
    #[must_use]
    pub fn matches(rule: &Rule, id: &RuleIdentity) -> bool {
        Self::identify(rule).is_ok_and(|computed| &computed == id)
    }
}

fn sorted_pairs(map: &HashMap<String, String>, keep: impl Fn(&str) -> bool) -> String {
    let mut pairs: Vec<String> = map
        .iter()
        .filter(|(k, _)| keep(k.as_str()))
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    pairs.sort();
    pairs.join(",")
}
