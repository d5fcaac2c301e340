//! # Core Configuration
//!
//! Pool and scratch settings, loaded once at startup from TOML.
//!
//! ```toml
//! [memory]
//! budget_bytes = 67108864
//! max_recycled_per_pool = 256
//!
//! [scratch]
//! capacity = 1048576
//! alignment = 32
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::scratch::HEADER_SIZE;

/// Default scratch arena capacity (1 MiB).
pub const DEFAULT_SCRATCH_CAPACITY: usize = 1024 * 1024;

/// Default physical alignment of the scratch arena.
pub const DEFAULT_SCRATCH_ALIGNMENT: usize = 32;

/// Default number of released blocks a pool keeps for reuse.
pub const DEFAULT_MAX_RECYCLED_PER_POOL: usize = 1024;

/// Largest arena the 31-bit block header can describe.
const MAX_SCRATCH_CAPACITY: usize = (1 << 31) - 1 + HEADER_SIZE;

/// Pool allocator settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Upper bound on bytes the registry may hold (live + recycled).
    /// `None` means unbounded.
    pub budget_bytes: Option<usize>,
    /// Released blocks kept per pool before storage is returned to the heap.
    pub max_recycled_per_pool: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            budget_bytes: None,
            max_recycled_per_pool: DEFAULT_MAX_RECYCLED_PER_POOL,
        }
    }
}

impl MemoryConfig {
    /// Returns a config with a byte budget.
    #[must_use]
    pub const fn with_budget(mut self, bytes: usize) -> Self {
        self.budget_bytes = Some(bytes);
        self
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if the budget is zero.
    pub fn validate(&self) -> CoreResult<()> {
        if self.budget_bytes == Some(0) {
            return Err(CoreError::InvalidConfig(
                "memory.budget_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Scratch arena settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScratchConfig {
    /// Total arena size in bytes, headers included.
    pub capacity: usize,
    /// Physical alignment of the arena start.
    pub alignment: usize,
}

impl Default for ScratchConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_SCRATCH_CAPACITY,
            alignment: DEFAULT_SCRATCH_ALIGNMENT,
        }
    }
}

impl ScratchConfig {
    /// Creates a scratch config with the given capacity and default alignment.
    #[must_use]
    pub const fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            alignment: DEFAULT_SCRATCH_ALIGNMENT,
        }
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns an error if the alignment is not a power of two, or the
    /// capacity is too small, too large, or not a multiple of four.
    pub fn validate(&self) -> CoreResult<()> {
        if !self.alignment.is_power_of_two() {
            return Err(CoreError::InvalidAlignment(self.alignment));
        }
        if self.capacity < 2 * HEADER_SIZE {
            return Err(CoreError::InvalidConfig(format!(
                "scratch.capacity {} is smaller than two block headers",
                self.capacity
            )));
        }
        if self.capacity % 4 != 0 {
            return Err(CoreError::InvalidConfig(format!(
                "scratch.capacity {} must be a multiple of 4",
                self.capacity
            )));
        }
        if self.capacity > MAX_SCRATCH_CAPACITY {
            return Err(CoreError::InvalidConfig(format!(
                "scratch.capacity {} exceeds the header limit of {MAX_SCRATCH_CAPACITY}",
                self.capacity
            )));
        }
        Ok(())
    }
}

/// Combined core configuration file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// `[memory]` section.
    pub memory: MemoryConfig,
    /// `[scratch]` section.
    pub scratch: ScratchConfig,
}

impl CoreConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigParse`] on malformed TOML, or a validation
    /// error if a value is out of range.
    pub fn from_toml_str(source: &str) -> CoreResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| CoreError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigIo`] if the file cannot be read, otherwise
    /// the same errors as [`CoreConfig::from_toml_str`].
    pub fn from_toml_file(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| CoreError::ConfigIo {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&source)
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns the first validation error found.
    pub fn validate(&self) -> CoreResult<()> {
        self.memory.validate()?;
        self.scratch.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(CoreConfig::default().validate().is_ok());
    }

    #[test]
    fn test_parse_partial_document() {
        let config = CoreConfig::from_toml_str(
            r"
            [scratch]
            capacity = 4096
            ",
        )
        .unwrap();
        assert_eq!(config.scratch.capacity, 4096);
        assert_eq!(config.scratch.alignment, DEFAULT_SCRATCH_ALIGNMENT);
        assert_eq!(config.memory, MemoryConfig::default());
    }

    #[test]
    fn test_rejects_bad_alignment() {
        let err = CoreConfig::from_toml_str(
            r"
            [scratch]
            alignment = 24
            ",
        )
        .unwrap_err();
        assert_eq!(err, CoreError::InvalidAlignment(24));
    }

    #[test]
    fn test_rejects_unaligned_capacity() {
        let config = ScratchConfig::with_capacity(1026);
        assert!(matches!(config.validate(), Err(CoreError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_zero_budget() {
        let config = MemoryConfig::default().with_budget(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_toml() {
        let err = CoreConfig::from_toml_str("[scratch\ncapacity = ").unwrap_err();
        assert!(matches!(err, CoreError::ConfigParse(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = CoreConfig::from_toml_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, CoreError::ConfigIo { .. }));
    }
}
