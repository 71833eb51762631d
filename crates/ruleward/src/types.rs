//! Core types for rule-group and relabel resources.
//!
//! This module provides the data model shared by every other module:
//! - [`ResourceRef`]: namespace/name of a stored resource
//! - [`Rule`]: a single alerting or recording rule
//! - [`RuleGroup`] and [`RuleGroupResource`]: the persisted rule containers
//! - [`RelabelDirective`] and [`RelabelConfigResource`]: relabel overlays
//! - [`RuleSource`]: platform-managed vs. user-defined

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RuleError};

static LABEL_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap_or_else(|_| unreachable!()));

/// Namespace and name of a stored resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceRef {
    /// Namespace the resource lives in.
    pub namespace: String,
    /// Name of the resource within its namespace.
    pub name: String,
}

impl ResourceRef {
    /// Creates a new resource reference.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Returns true if both namespace and name are set.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.namespace.is_empty() && !self.name.is_empty()
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A rule expression. The remote schema accepts either a string or an integer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleExpr {
    /// Integer expression, e.g. `1`.
    Int(i64),
    /// PromQL text.
    Str(String),
}

impl RuleExpr {
    /// Returns true for an empty string expression.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Str(s) if s.trim().is_empty())
    }
}

impl Default for RuleExpr {
    fn default() -> Self {
        Self::Str(String::new())
    }
}

impl fmt::Display for RuleExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for RuleExpr {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for RuleExpr {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for RuleExpr {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

/// Whether a rule raises alerts or records a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// Alerting rule.
    Alert,
    /// Recording rule.
    Record,
}

impl RuleKind {
    /// Returns the kind as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Alert => "alert",
            Self::Record => "record",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single alerting or recording rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Alert name, for alerting rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,
    /// Series name, for recording rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<String>,
    /// The rule expression.
    #[serde(default)]
    pub expr: RuleExpr,
    /// How long the expression must hold before firing, e.g. `5m`.
    #[serde(rename = "for", default, skip_serializing_if = "Option::is_none")]
    pub for_duration: Option<String>,
    /// Labels attached to produced alerts or series.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
    /// Free-form annotations.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub annotations: HashMap<String, String>,
}

impl Rule {
    /// Creates an alerting rule.
    #[must_use]
    pub fn alerting(name: impl Into<String>, expr: impl Into<RuleExpr>) -> Self {
        Self {
            alert: Some(name.into()),
            expr: expr.into(),
            ..Self::default()
        }
    }

    /// Creates a recording rule.
    #[must_use]
    pub fn recording(name: impl Into<String>, expr: impl Into<RuleExpr>) -> Self {
        Self {
            record: Some(name.into()),
            expr: expr.into(),
            ..Self::default()
        }
    }

    /// Sets the `for` duration.
    #[must_use]
    pub fn with_for(mut self, duration: impl Into<String>) -> Self {
        self.for_duration = Some(duration.into());
        self
    }

    /// Adds a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Adds an annotation.
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Returns the alert name if this is an alerting rule.
    #[must_use]
    pub fn alert_name(&self) -> Option<&str> {
        self.alert.as_deref().filter(|s| !s.is_empty())
    }

    /// Returns the record name if set.
    #[must_use]
    pub fn record_name(&self) -> Option<&str> {
        self.record.as_deref().filter(|s| !s.is_empty())
    }

    /// Returns the rule kind and its name. The alert name wins if both are set.
    #[must_use]
    pub fn kind_and_name(&self) -> Option<(RuleKind, &str)> {
        self.alert_name()
            .map(|name| (RuleKind::Alert, name))
            .or_else(|| self.record_name().map(|name| (RuleKind::Record, name)))
    }

    /// Returns true if this is an alerting rule.
    #[must_use]
    pub fn is_alerting(&self) -> bool {
        self.alert_name().is_some()
    }

    /// Validates the rule.
    ///
    /// # Errors
    ///
    /// Returns `RuleError::Validation` if neither or both names are set, the
    /// expression is empty, or a label name is malformed.
    pub fn validate(&self) -> Result<()> {
        match (self.alert_name(), self.record_name()) {
            (None, None) => {
                return Err(RuleError::validation(
                    "rule must have either 'alert' or 'record' set",
                ));
            }
            (Some(_), Some(_)) => {
                return Err(RuleError::validation(
                    "rule cannot have both 'alert' and 'record' set",
                ));
            }
            _ => {}
        }

        if self.expr.is_empty() {
            return Err(RuleError::validation("rule expression cannot be empty"));
        }

        if let Some(bad) = self.labels.keys().find(|k| !LABEL_NAME_REGEX.is_match(k)) {
            return Err(RuleError::validation(format!("invalid label name '{bad}'")));
        }

        Ok(())
    }
}

/// A named, ordered list of rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleGroup {
    /// Group name, unique within its resource.
    pub name: String,
    /// Rules in evaluation order.
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl RuleGroup {
    /// Creates a group.
    #[must_use]
    pub fn new(name: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self {
            name: name.into(),
            rules,
        }
    }
}

/// The persisted object holding rule groups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleGroupResource {
    /// Namespace of the resource.
    pub namespace: String,
    /// Name of the resource.
    pub name: String,
    /// Groups in declaration order.
    #[serde(default)]
    pub groups: Vec<RuleGroup>,
}

impl RuleGroupResource {
    /// Creates an empty resource.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            groups: Vec::new(),
        }
    }

    /// Adds a group.
    #[must_use]
    pub fn with_group(mut self, group: RuleGroup) -> Self {
        self.groups.push(group);
        self
    }

    /// Returns this resource's reference.
    #[must_use]
    pub fn reference(&self) -> ResourceRef {
        ResourceRef::new(&self.namespace, &self.name)
    }

    /// Iterates every rule with the name of its group.
    pub fn rules(&self) -> impl Iterator<Item = (&str, &Rule)> {
        self.groups
            .iter()
            .flat_map(|g| g.rules.iter().map(move |r| (g.name.as_str(), r)))
    }

    /// Appends `rule` to the named group, creating the group if absent.
    pub fn append_rule(&mut self, group_name: &str, rule: Rule) {
        match self.groups.iter_mut().find(|g| g.name == group_name) {
            Some(group) => group.rules.push(rule),
            None => self.groups.push(RuleGroup::new(group_name, vec![rule])),
        }
    }
}

/// Relabel actions understood by the relabel resource schema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelabelAction {
    /// Overwrite the target label.
    #[default]
    Replace,
    /// Keep only matching alerts.
    Keep,
    /// Drop matching alerts.
    Drop,
    /// Hash source labels into the target label.
    HashMod,
    /// Copy labels by name pattern.
    LabelMap,
    /// Remove labels.
    LabelDrop,
    /// Keep only listed labels.
    LabelKeep,
}

impl RelabelAction {
    /// Returns the action as it appears on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Replace => "Replace",
            Self::Keep => "Keep",
            Self::Drop => "Drop",
            Self::HashMod => "HashMod",
            Self::LabelMap => "LabelMap",
            Self::LabelDrop => "LabelDrop",
            Self::LabelKeep => "LabelKeep",
        }
    }

    /// Returns true if the overlay replays this action onto rule labels.
    #[must_use]
    pub const fn is_replayable(&self) -> bool {
        matches!(self, Self::Replace | Self::LabelDrop)
    }
}

impl fmt::Display for RelabelAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default separator joining source label values.
pub const DEFAULT_SEPARATOR: &str = ";";

/// A single relabel directive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelabelDirective {
    /// Labels whose values are joined and matched against `regex`.
    #[serde(default)]
    pub source_labels: Vec<String>,
    /// Separator for joining source values; empty means [`DEFAULT_SEPARATOR`].
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub separator: String,
    /// Pattern matched against the joined source values.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub regex: String,
    /// Label written by `Replace` or removed by `LabelDrop`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_label: String,
    /// Value written by `Replace`.
    #[serde(default)]
    pub replacement: String,
    /// What to do on match.
    #[serde(default)]
    pub action: RelabelAction,
}

impl RelabelDirective {
    /// Returns the separator in effect.
    #[must_use]
    pub fn effective_separator(&self) -> &str {
        if self.separator.is_empty() {
            DEFAULT_SEPARATOR
        } else {
            &self.separator
        }
    }
}

/// A persisted list of relabel directives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelabelConfigResource {
    /// Namespace of the resource.
    pub namespace: String,
    /// Name of the resource.
    pub name: String,
    /// Directives in application order.
    #[serde(default)]
    pub configs: Vec<RelabelDirective>,
}

impl RelabelConfigResource {
    /// Creates a relabel resource.
    #[must_use]
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        configs: Vec<RelabelDirective>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            configs,
        }
    }

    /// Returns this resource's reference.
    #[must_use]
    pub fn reference(&self) -> ResourceRef {
        ResourceRef::new(&self.namespace, &self.name)
    }
}

/// Who owns a rule-group resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleSource {
    /// Shipped by the base monitoring stack; read-only to users.
    Platform,
    /// Created by users.
    UserDefined,
}

impl RuleSource {
    /// Returns the source as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Platform => "platform",
            Self::UserDefined => "user-defined",
        }
    }
}

impl fmt::Display for RuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleSource {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "platform" => Ok(Self::Platform),
            "user-defined" => Ok(Self::UserDefined),
            other => Err(RuleError::validation(format!(
                "unknown rule source '{other}', expected 'platform' or 'user-defined'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    mod rule_tests {
        use super::*;
        use test_case::test_case;

        #[test]
        fn alerting_rule_kind_and_name() {
            let rule = Rule::alerting("HighCPU", "cpu > 80");
            assert_eq!(rule.kind_and_name(), Some((RuleKind::Alert, "HighCPU")));
            assert!(rule.is_alerting());
        }

        #[test]
        fn recording_rule_kind_and_name() {
            let rule = Rule::recording("job:up:sum", "sum(up) by (job)");
            assert_eq!(rule.kind_and_name(), Some((RuleKind::Record, "job:up:sum")));
            assert!(!rule.is_alerting());
        }

        #[test]
        fn empty_alert_name_is_treated_as_absent() {
            let rule = Rule {
                alert: Some(String::new()),
                expr: "up == 0".into(),
                ..Rule::default()
            };
            assert_eq!(rule.kind_and_name(), None);
            assert!(rule.validate().is_err());
        }

        #[test]
        fn validate_accepts_well_formed_rule() {
            let rule = Rule::alerting("X", "up == 0")
                .with_for("5m")
                .with_label("severity", "warning");
            assert!(rule.validate().is_ok());
        }

        #[test]
        fn validate_rejects_both_names() {
            let mut rule = Rule::alerting("X", "up == 0");
            rule.record = Some("x:rate".to_string());
            let err = rule.validate().unwrap_err();
            assert!(err.is_validation());
        }

        #[test]
        fn validate_rejects_empty_expression() {
            let rule = Rule::alerting("X", "  ");
            assert!(rule.validate().is_err());
        }

        #[test_case("severity", true ; "plain")]
        #[test_case("_private", true ; "leading underscore")]
        #[test_case("team_2", true ; "digits")]
        #[test_case("2team", false ; "leading digit")]
        #[test_case("team-name", false ; "dash")]
        #[test_case("", false ; "empty")]
        fn validate_label_names(name: &str, ok: bool) {
            let rule = Rule::alerting("X", "up == 0").with_label(name, "v");
            assert_eq!(rule.validate().is_ok(), ok);
        }

        #[test]
        fn integer_expression_displays_as_number() {
            let rule = Rule::alerting("AlwaysOn", 1_i64);
            assert_eq!(rule.expr.to_string(), "1");
        }

        #[test]
        fn deserializes_wire_format() {
            let json = r#"{"alert":"X","expr":"up == 0","for":"5m","labels":{"severity":"critical"}}"#;
            let rule: Rule = serde_json::from_str(json).unwrap();
            assert_eq!(rule.alert_name(), Some("X"));
            assert_eq!(rule.for_duration.as_deref(), Some("5m"));
            assert_eq!(rule.labels.get("severity").map(String::as_str), Some("critical"));
        }

        #[test]
        fn deserializes_integer_expression() {
            let rule: Rule = serde_json::from_str(r#"{"record":"one","expr":1}"#).unwrap();
            assert_eq!(rule.expr, RuleExpr::Int(1));
        }
    }

    mod resource_tests {
        use super::*;

        #[test]
        fn append_rule_creates_missing_group() {
            let mut resource = RuleGroupResource::new("ns", "rules");
            resource.append_rule("g1", Rule::alerting("A", "up == 0"));
            resource.append_rule("g1", Rule::alerting("B", "up == 0"));
            resource.append_rule("g2", Rule::alerting("C", "up == 0"));

            assert_eq!(resource.groups.len(), 2);
            assert_eq!(resource.groups[0].rules.len(), 2);
            assert_eq!(resource.groups[1].name, "g2");
        }

        #[test]
        fn rules_iterates_with_group_names() {
            let resource = RuleGroupResource::new("ns", "rules")
                .with_group(RuleGroup::new("a", vec![Rule::alerting("A", "1")]))
                .with_group(RuleGroup::new("b", vec![Rule::alerting("B", "1")]));
            let names: Vec<_> = resource
                .rules()
                .map(|(g, r)| (g.to_string(), r.alert_name().unwrap_or_default().to_string()))
                .collect();
            assert_eq!(
                names,
                vec![
                    ("a".to_string(), "A".to_string()),
                    ("b".to_string(), "B".to_string())
                ]
            );
        }

        #[test]
        fn resource_ref_display() {
            assert_eq!(ResourceRef::new("ns", "rules").to_string(), "ns/rules");
            assert!(!ResourceRef::new("", "rules").is_complete());
        }
    }

    mod relabel_tests {
        use super::*;

        #[test]
        fn default_separator() {
            let directive = RelabelDirective::default();
            assert_eq!(directive.effective_separator(), ";");
        }

        #[test]
        fn action_wire_names() {
            let json = serde_json::to_string(&RelabelAction::LabelDrop).unwrap();
            assert_eq!(json, "\"LabelDrop\"");
            assert!(RelabelAction::Replace.is_replayable());
            assert!(!RelabelAction::HashMod.is_replayable());
        }

        #[test]
        fn directive_deserializes_camel_case() {
            let json = r#"{"sourceLabels":["alertname","severity"],"regex":"X;.*","targetLabel":"severity","replacement":"critical","action":"Replace"}"#;
            let directive: RelabelDirective = serde_json::from_str(json).unwrap();
            assert_eq!(directive.source_labels.len(), 2);
            assert_eq!(directive.target_label, "severity");
        }
    }

    #[test_case("platform", RuleSource::Platform)]
    #[test_case("user-defined", RuleSource::UserDefined)]
    #[test_case("Platform", RuleSource::Platform ; "case insensitive")]
    fn rule_source_parse(input: &str, expected: RuleSource) {
        assert_eq!(input.parse::<RuleSource>().ok(), Some(expected));
    }

    #[test]
    fn rule_source_parse_unknown() {
        assert!("system".parse::<RuleSource>().is_err());
    }
}
