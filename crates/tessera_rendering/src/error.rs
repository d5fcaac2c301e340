//! # Rendering Error Types
//!
//! Buffer and lease failures. Scratch exhaustion never surfaces here: locks
//! fall back to pooled or heap staging.

use thiserror::Error;

use tessera_core::CoreError;

/// Errors that can occur in buffer operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// A byte range does not fit the buffer.
    #[error("range {offset}..{offset}+{len} outside buffer of {size} bytes")]
    OutOfRange {
        /// Start of the range.
        offset: usize,
        /// Length of the range.
        len: usize,
        /// Buffer size.
        size: usize,
    },

    /// Source and destination sizes differ.
    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Size required.
        expected: usize,
        /// Size provided.
        actual: usize,
    },

    /// The buffer is already locked.
    #[error("buffer {0} is already locked")]
    AlreadyLocked(u64),

    /// A buffer offered as a spare copy is leased or already registered.
    #[error("buffer {0} is already leased or registered as a copy")]
    CopyInUse(u64),

    /// Backing memory could not be obtained.
    #[error("out of buffer memory ({requested} bytes requested)")]
    OutOfMemory {
        /// Bytes requested.
        requested: usize,
    },

    /// Vertex size times count overflows.
    #[error("invalid buffer shape: {vertex_size} bytes x {vertex_count} vertices")]
    InvalidShape {
        /// Bytes per vertex.
        vertex_size: usize,
        /// Number of vertices.
        vertex_count: usize,
    },

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

    /// Error from the core allocators.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for buffer operations.
pub type BufferResult<T> = Result<T, BufferError>;
