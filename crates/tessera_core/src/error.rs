//! # Core Error Types
//!
//! Recoverable failures of the core crate. Exhaustion is not an error here:
//! allocators report it with `None` so callers can take a slower path.

use thiserror::Error;

/// Errors that can occur while configuring or constructing core allocators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Alignment is zero or not a power of two.
    #[error("invalid alignment {0}: must be a non-zero power of two")]
    InvalidAlignment(usize),

    /// The configuration file could not be read.
    #[error("failed to read config {path}: {reason}")]
    ConfigIo {
        /// Path that was read.
        path: String,
        /// Underlying I/O error message.
        reason: String,
    },

    /// The configuration file is not valid TOML for the expected schema.
    #[error("failed to parse config: {0}")]
    ConfigParse(String),

    /// The registry could not provide backing memory for a scratch arena.
    #[error("scratch arena of {capacity} bytes could not be acquired")]
    ArenaUnavailable {
        /// Requested arena capacity in bytes.
        capacity: usize,
    },
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
