//! # TESSERA Core
//!
//! Memory management underneath the buffer subsystem:
//! - Category-tagged, size-class segregated pools
//! - Aligned pools for arena acquisition
//! - A fixed scratch arena with an in-place coalescing free list
//!
//! ## Architecture Rules
//!
//! 1. **Explicit ownership** - One [`MemoryRegistry`] per process, shared via `Arc`
//! 2. **Fat handles** - Every block carries its origin; frees never inspect memory
//! 3. **Exhaustion is `None`** - Callers fall back, nothing retries internally
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tessera_core::{MemoryConfig, MemoryRegistry, ScratchArena, ScratchConfig};
//!
//! let registry = Arc::new(MemoryRegistry::new(MemoryConfig::default()));
//! let scratch = ScratchArena::new(Arc::clone(&registry), &ScratchConfig::default())?;
//! if let Some(block) = scratch.allocate(256) {
//!     scratch.with_bytes_mut(&block, |bytes| bytes.fill(0));
//!     scratch.deallocate(block);
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod memory;
pub mod scratch;

pub use config::{CoreConfig, MemoryConfig, ScratchConfig};
pub use error::{CoreError, CoreResult};
pub use memory::{
    tags, AlignedBlock, BlockOrigin, CategoryTag, MemoryCategory, MemoryRegistry, PoolBlock,
    PoolId, PoolKey, PoolStats, RegistryId, RegistryStats, ShutdownReport,
};
pub use scratch::{BlockHeader, ScratchArena, ScratchBlock, ScratchStats, HEADER_SIZE};
