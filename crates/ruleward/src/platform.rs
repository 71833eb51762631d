//! Platform vs. user-defined classification of rule-group resources.

use crate::types::{ResourceRef, RuleSource};

/// Default reserved name prefix for platform-managed resources.
pub const DEFAULT_PLATFORM_PREFIX: &str = "openshift-";

/// Classifies resources by a reserved name prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformClassifier {
    prefix: String,
}

impl PlatformClassifier {
    /// Creates a classifier for the given prefix.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Returns the reserved prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns true if the resource is owned by the platform.
    #[must_use]
    pub fn is_platform(&self, resource: &ResourceRef) -> bool {
        resource.name.starts_with(&self.prefix)
    }

    /// Returns the owner of the resource.
    #[must_use]
    pub fn classify(&self, resource: &ResourceRef) -> RuleSource {
        if self.is_platform(resource) {
            RuleSource::Platform
        } else {
            RuleSource::UserDefined
        }
    }
}

impl Default for PlatformClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_PLATFORM_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("openshift-kube-apiserver", RuleSource::Platform ; "prefixed")]
    #[test_case("openshift-", RuleSource::Platform ; "bare prefix")]
    #[test_case("my-rules", RuleSource::UserDefined ; "plain")]
    #[test_case("my-openshift-rules", RuleSource::UserDefined ; "prefix not at start")]
    #[test_case("OpenShift-rules", RuleSource::UserDefined ; "case sensitive")]
    fn classify_by_name(name: &str, expected: RuleSource) {
        let classifier = PlatformClassifier::default();
        assert_eq!(classifier.classify(&ResourceRef::new("any", name)), expected);
    }

    #[test]
    fn namespace_does_not_matter() {
        let classifier = PlatformClassifier::default();
        assert!(!classifier.is_platform(&ResourceRef::new("openshift-monitoring", "user-rules")));
    }

    #[test]
    fn custom_prefix() {
        let classifier = PlatformClassifier::new("system-");
        assert!(classifier.is_platform(&ResourceRef::new("ns", "system-rules")));
        assert!(!classifier.is_platform(&ResourceRef::new("ns", "openshift-rules")));
    }
}
