//! # Resource Configuration
//!
//! ```toml
//! [resources]
//! memory_budget = 268435456
//! default_group = "General"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ResourceError, ResourceResult};

/// Group assigned when none is given.
pub const DEFAULT_GROUP: &str = "General";

/// Resource manager settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Bytes loaded resources may hold before older ones are unloaded.
    /// `None` means unbounded.
    pub memory_budget: Option<usize>,
    /// Group for resources created without one.
    pub default_group: String,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            memory_budget: None,
            default_group: DEFAULT_GROUP.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    resources: ResourceConfig,
}

impl ResourceConfig {
    /// Returns a config with a memory budget.
    #[must_use]
    pub fn with_budget(mut self, bytes: usize) -> Self {
        self.memory_budget = Some(bytes);
        self
    }

    /// Parses the `[resources]` table of a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::ConfigParse`] on malformed TOML, or
    /// [`ResourceError::InvalidConfig`] for out-of-range values.
    pub fn from_toml_str(source: &str) -> ResourceResult<Self> {
        let file: ConfigFile =
            toml::from_str(source).map_err(|e| ResourceError::ConfigParse(e.to_string()))?;
        file.resources.validate()?;
        Ok(file.resources)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::ConfigIo`] if the file cannot be read,
    /// otherwise the errors of [`ResourceConfig::from_toml_str`].
    pub fn from_toml_file(path: impl AsRef<Path>) -> ResourceResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| ResourceError::ConfigIo {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&source)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::InvalidConfig`] for a zero budget or an
    /// empty default group.
    pub fn validate(&self) -> ResourceResult<()> {
        if self.memory_budget == Some(0) {
            return Err(ResourceError::InvalidConfig(
                "resources.memory_budget must be greater than zero".to_string(),
            ));
        }
        if self.default_group.is_empty() {
            return Err(ResourceError::InvalidConfig(
                "resources.default_group must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_budget() {
        let config = ResourceConfig::from_toml_str(
            r"
            [resources]
            memory_budget = 4096
            ",
        )
        .unwrap();
        assert_eq!(config.memory_budget, Some(4096));
        assert_eq!(config.default_group, DEFAULT_GROUP);
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(
            ResourceConfig::from_toml_str("").unwrap(),
            ResourceConfig::default()
        );
    }

    #[test]
    fn test_rejects_zero_budget() {
        let err = ResourceConfig::from_toml_str("[resources]\nmemory_budget = 0").unwrap_err();
        assert!(matches!(err, ResourceError::InvalidConfig(_)));
    }
}
