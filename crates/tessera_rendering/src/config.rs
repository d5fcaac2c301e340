//! # Rendering Configuration
//!
//! Buffer staging and lease settings, loaded once at startup from TOML.
//!
//! ```toml
//! [buffers]
//! map_buffer_threshold = 32768
//!
//! [lease]
//! expired_delay_frames = 5
//! under_used_frame_threshold = 30000
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BufferError, BufferResult};

/// Locks shorter than this stage through the scratch arena (32 KiB).
pub const DEFAULT_MAP_BUFFER_THRESHOLD: usize = 32 * 1024;

/// Frames an untouched automatic license survives.
pub const EXPIRED_DELAY_FRAMES: u32 = 5;

/// Consecutive under-used frames before spare copies are reclaimed.
pub const UNDER_USED_FRAME_THRESHOLD: u32 = 30_000;

/// Buffer staging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Locks of fewer bytes than this stage through scratch.
    pub map_buffer_threshold: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            map_buffer_threshold: DEFAULT_MAP_BUFFER_THRESHOLD,
        }
    }
}

/// Temporary copy lease settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    /// Frames an automatic license lives without a touch.
    pub expired_delay_frames: u32,
    /// Under-used frames in a row before unused copies are reclaimed.
    pub under_used_frame_threshold: u32,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            expired_delay_frames: EXPIRED_DELAY_FRAMES,
            under_used_frame_threshold: UNDER_USED_FRAME_THRESHOLD,
        }
    }
}

impl LeaseConfig {
    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::InvalidConfig`] if either threshold is zero.
    pub fn validate(&self) -> BufferResult<()> {
        if self.expired_delay_frames == 0 {
            return Err(BufferError::InvalidConfig(
                "lease.expired_delay_frames must be greater than zero".to_string(),
            ));
        }
        if self.under_used_frame_threshold == 0 {
            return Err(BufferError::InvalidConfig(
                "lease.under_used_frame_threshold must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Combined rendering configuration file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderingConfig {
    /// `[buffers]` section.
    pub buffers: BufferConfig,
    /// `[lease]` section.
    pub lease: LeaseConfig,
}

impl RenderingConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::ConfigParse`] on malformed TOML, or
    /// [`BufferError::InvalidConfig`] for out-of-range values.
    pub fn from_toml_str(source: &str) -> BufferResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| BufferError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::ConfigIo`] if the file cannot be read,
    /// otherwise the errors of [`RenderingConfig::from_toml_str`].
    pub fn from_toml_file(path: impl AsRef<Path>) -> BufferResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| BufferError::ConfigIo {
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
    pub fn validate(&self) -> BufferResult<()> {
        self.lease.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RenderingConfig::default();
        assert_eq!(config.buffers.map_buffer_threshold, 32 * 1024);
        assert_eq!(config.lease.expired_delay_frames, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_lease_section() {
        let config = RenderingConfig::from_toml_str(
            r"
            [lease]
            under_used_frame_threshold = 3
            ",
        )
        .unwrap();
        assert_eq!(config.lease.under_used_frame_threshold, 3);
        assert_eq!(config.lease.expired_delay_frames, EXPIRED_DELAY_FRAMES);
        assert_eq!(config.buffers, BufferConfig::default());
    }

    #[test]
    fn test_rejects_zero_delay() {
        let err = RenderingConfig::from_toml_str("[lease]\nexpired_delay_frames = 0").unwrap_err();
        assert!(matches!(err, BufferError::InvalidConfig(_)));
    }

    #[test]
    fn test_malformed_toml() {
        let err = RenderingConfig::from_toml_str("[lease\n").unwrap_err();
        assert!(matches!(err, BufferError::ConfigParse(_)));
    }
}
