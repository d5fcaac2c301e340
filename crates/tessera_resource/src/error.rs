//! # Resource Error Types
//!
//! Loading-state contract violations panic; everything here is a
//! recoverable failure of a hook, a lookup, or configuration.

use thiserror::Error;

use crate::state::LoadingState;

/// Errors that can occur while driving resources.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// A prepare or load hook failed.
    #[error("resource payload failed: {0}")]
    Payload(String),

    /// This caller waited on another thread's load, which did not end loaded.
    #[error("concurrent load of '{name}' ended in state {state}")]
    ConcurrentLoadFailed {
        /// Resource name.
        name: String,
        /// State the resource was left in.
        state: LoadingState,
    },

    /// A resource with this name is already registered.
    #[error("resource '{0}' already exists")]
    DuplicateName(String),

    /// No resource is registered under this name.
    #[error("resource '{0}' not found")]
    NotFound(String),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

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
}

impl ResourceError {
    /// Wraps a hook failure message.
    pub fn payload(reason: impl Into<String>) -> Self {
        Self::Payload(reason.into())
    }
}

/// Result type for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
