//! # Pool Allocator
//!
//! Category-tagged allocations served from lazily created size-class pools,
//! plus a second set of pools keyed by alignment.
//!
//! Every block is a fat handle ([`PoolBlock`] / [`AlignedBlock`]) carrying
//! the registry, category and pool that produced it. Frees are routed by
//! that tag in O(1).

mod block;
mod category;
mod pool;
mod registry;
mod size_class;

pub use block::{AlignedBlock, BlockOrigin, PoolBlock, PoolKey, RegistryId};
pub use category::{tags, CategoryTag, MemoryCategory};
pub use pool::PoolStats;
pub use registry::{MemoryRegistry, RegistryStats, ShutdownReport};
pub use size_class::{PoolId, MAX_POOL_ID, OVERFLOW_CUTOFF, POOL_COUNT, SMALL_CLASS_LIMIT};
