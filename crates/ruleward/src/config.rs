//! Manager configuration.
//!
//! Loaded from TOML; every field has a default so an empty file is valid.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RuleError};
use crate::platform::DEFAULT_PLATFORM_PREFIX;

/// Group that receives user-defined rules when the caller names none.
pub const DEFAULT_GROUP_NAME: &str = "user-defined-rules";

/// Configuration for [`RuleManager`](crate::RuleManager) and [`RuleMutator`](crate::RuleMutator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Name prefix marking platform-managed rule-group resources.
    pub platform_prefix: String,
    /// Group used when a create request names none.
    pub default_group_name: String,
    /// Deadline for each storage call, in seconds.
    pub call_timeout_secs: u64,
    /// Whether created rules are stamped with their identity annotation.
    pub stamp_rule_id: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            platform_prefix: DEFAULT_PLATFORM_PREFIX.to_string(),
            default_group_name: DEFAULT_GROUP_NAME.to_string(),
            call_timeout_secs: 30,
            stamp_rule_id: true,
        }
    }
}

impl ManagerConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            RuleError::Config(format!(
                "failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| RuleError::Config(format!("invalid TOML: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.platform_prefix.is_empty() {
            return Err(RuleError::Config(
                "platform_prefix cannot be empty".to_string(),
            ));
        }

        if self.default_group_name.trim().is_empty() {
            return Err(RuleError::Config(
                "default_group_name cannot be empty".to_string(),
            ));
        }

        if self.call_timeout_secs == 0 {
            return Err(RuleError::Config(
                "call_timeout_secs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Returns the storage call deadline.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ManagerConfig::default();
        assert_eq!(config.platform_prefix, "openshift-");
        assert_eq!(config.default_group_name, "user-defined-rules");
        assert_eq!(config.call_timeout(), Duration::from_secs(30));
        assert!(config.stamp_rule_id);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let config = ManagerConfig::from_toml("").unwrap();
        assert_eq!(config, ManagerConfig::default());
    }

    #[test]
    fn parse_overrides() {
        let toml = r#"
            platform_prefix = "system-"
            default_group_name = "custom"
            call_timeout_secs = 5
            stamp_rule_id = false
        "#;
        let config = ManagerConfig::from_toml(toml).unwrap();
        assert_eq!(config.platform_prefix, "system-");
        assert_eq!(config.default_group_name, "custom");
        assert_eq!(config.call_timeout_secs, 5);
        assert!(!config.stamp_rule_id);
    }

    #[test]
    fn rejects_zero_timeout() {
        let err = ManagerConfig::from_toml("call_timeout_secs = 0").unwrap_err();
        assert!(err.to_string().contains("call_timeout_secs"));
    }

    #[test]
    fn rejects_empty_prefix() {
        assert!(ManagerConfig::from_toml(r#"platform_prefix = """#).is_err());
    }

    #[test]
    fn rejects_invalid_toml() {
        let err = ManagerConfig::from_toml("call_timeout_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, RuleError::Config(_)));
    }

    #[test]
    fn missing_file() {
        let err = ManagerConfig::from_file("/nonexistent/ruleward.toml").unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
