//! # Memory Registry
//!
//! Owns every size-class and aligned pool. One registry is created at
//! startup, shared through `Arc`, and shut down explicitly.
//!
//! ## Routing
//!
//! ```text
//! allocate(category, size) ──► PoolId::for_size(size) ──► pools[id]
//!                                                          │ recycled slot?
//!                                                          ├─ yes: reuse
//!                                                          └─ no:  heap (budget checked)
//!
//! deallocate(category, block) ──► block.origin ──► same registry + pool?
//!                                                   ├─ yes: recycle into that pool
//!                                                   └─ no:  default path (drop, settle
//!                                                           with the origin registry)
//! ```
//!
//! Pools are created on first use and are never destroyed or moved until
//! [`MemoryRegistry::shutdown`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::block::{AlignedBlock, BlockOrigin, Ledger, PoolBlock, PoolKey, RegistryId};
use super::category::{CategoryTag, MemoryCategory};
use super::pool::{AlignedPool, PoolStats, SizeClassPool};
use super::size_class::{PoolId, POOL_COUNT};
use crate::config::MemoryConfig;

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Snapshot of registry counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Stats of every pool created so far.
    pub pools: Vec<(PoolKey, PoolStats)>,
    /// Storage bytes held by the registry, live and recycled.
    pub reserved_bytes: usize,
    /// Configured budget.
    pub budget_bytes: Option<usize>,
    /// Requested bytes currently live, per category index.
    pub live_bytes: [usize; MemoryCategory::COUNT],
    /// Blocks currently live, per category index.
    pub live_blocks: [usize; MemoryCategory::COUNT],
    /// Frees that went through the default path.
    pub foreign_frees: u64,
}

impl RegistryStats {
    /// Live bytes under one category.
    #[inline]
    #[must_use]
    pub fn live_bytes_in(&self, category: MemoryCategory) -> usize {
        self.live_bytes[category.index()]
    }

    /// Live blocks under one category.
    #[inline]
    #[must_use]
    pub fn live_blocks_in(&self, category: MemoryCategory) -> usize {
        self.live_blocks[category.index()]
    }

    /// Live blocks across all categories.
    #[must_use]
    pub fn total_live_blocks(&self) -> usize {
        self.live_blocks.iter().sum()
    }
}

/// Outcome of [`MemoryRegistry::shutdown`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Blocks still handed out at shutdown.
    pub live_blocks: usize,
    /// Recycled bytes returned to the heap.
    pub released_bytes: usize,
}

/// Category-tagged, size-segregated pool allocator.
///
/// # Example
///
/// ```rust,ignore
/// let registry = Arc::new(MemoryRegistry::new(MemoryConfig::default()));
/// let mut block = registry.allocate(MemoryCategory::Geometry, 48)?;
/// block.fill(0);
/// registry.deallocate(MemoryCategory::Geometry, block);
/// ```
#[derive(Debug)]
pub struct MemoryRegistry {
    id: RegistryId,
    config: MemoryConfig,
    pools: [Mutex<Option<SizeClassPool>>; POOL_COUNT],
    aligned: Mutex<BTreeMap<usize, AlignedPool>>,
    ledger: Arc<Ledger>,
    foreign_frees: AtomicU64,
    shut_down: AtomicBool,
}

impl MemoryRegistry {
    /// Creates an empty registry. No pool exists until first use.
    #[must_use]
    pub fn new(config: MemoryConfig) -> Self {
        let id = RegistryId(NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!("Memory registry {} created (budget: {:?})", id.0, config.budget_bytes);
        Self {
            id,
            config,
            pools: std::array::from_fn(|_| Mutex::new(None)),
            aligned: Mutex::new(BTreeMap::new()),
            ledger: Arc::new(Ledger::default()),
            foreign_frees: AtomicU64::new(0),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Identity stamped into every block this registry hands out.
    #[inline]
    #[must_use]
    pub fn id(&self) -> RegistryId {
        self.id
    }

    /// Configuration in effect.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    #[inline]
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Allocates `size` bytes under `category`.
    ///
    /// Size zero is allowed and yields a distinct block that must be freed
    /// like any other. Returns `None` on exhaustion: the budget would be
    /// exceeded, the heap refused, or the registry is shut down.
    #[must_use]
    pub fn allocate(&self, category: MemoryCategory, size: usize) -> Option<PoolBlock> {
        if self.is_shut_down() {
            return None;
        }
        let id = PoolId::for_size(size);
        let mut slot = self.pools[id.index()].lock();
        let pool = slot.get_or_insert_with(|| {
            tracing::debug!("Registry {}: created {}", self.id.0, id);
            SizeClassPool::new(id, self.config.max_recycled_per_pool)
        });

        let (storage, reused) = match pool.take_recycled(size) {
            Some(storage) => (storage, true),
            None => {
                let capacity = pool.fresh_capacity(size);
                (self.fresh_storage(capacity)?, false)
            }
        };
        pool.record_allocation(reused);
        drop(slot);

        self.ledger.track_live(category, size);
        Some(PoolBlock {
            storage,
            len: size,
            ledger: Arc::clone(&self.ledger),
            origin: BlockOrigin {
                registry: self.id,
                category,
                pool: PoolKey::Sized(id),
            },
        })
    }

    /// Frees a block from [`allocate`](Self::allocate).
    ///
    /// The block's origin tag selects the pool. Blocks from another registry
    /// go through the default path and are simply dropped.
    ///
    /// # Panics
    ///
    /// Panics if `category` is not the category the block was allocated
    /// under.
    pub fn deallocate(&self, category: MemoryCategory, block: PoolBlock) {
        assert_eq!(
            block.origin.category, category,
            "block allocated as {} freed as {}",
            block.origin.category, category
        );
        let PoolBlock {
            storage,
            len,
            origin,
            ledger,
        } = block;

        let PoolKey::Sized(id) = origin.pool else {
            self.default_free(origin, &ledger, len, storage.len());
            return;
        };
        if origin.registry != self.id {
            self.default_free(origin, &ledger, len, storage.len());
            return;
        }

        self.untrack_live(category, len);
        if self.is_shut_down() {
            self.release_reserved(storage.len());
            return;
        }
        let mut slot = self.pools[id.index()].lock();
        match slot.as_mut() {
            Some(pool) => {
                let released = pool.recycle(storage);
                self.release_reserved(released);
            }
            None => self.release_reserved(storage.len()),
        }
    }

    /// Allocates `size` bytes whose first byte sits on `alignment`.
    ///
    /// Returns `None` if `alignment` is not a power of two, or on
    /// exhaustion as for [`allocate`](Self::allocate).
    #[must_use]
    pub fn allocate_aligned(
        &self,
        category: MemoryCategory,
        alignment: usize,
        size: usize,
    ) -> Option<AlignedBlock> {
        if !alignment.is_power_of_two() || self.is_shut_down() {
            return None;
        }
        let mut pools = self.aligned.lock();
        let pool = pools.entry(alignment).or_insert_with(|| {
            tracing::debug!("Registry {}: created aligned pool ({} bytes)", self.id.0, alignment);
            AlignedPool::new(alignment, self.config.max_recycled_per_pool)
        });

        let ((storage, offset), reused) = match pool.take_recycled(size) {
            Some(entry) => (entry, true),
            None => {
                let capacity = (size + alignment - 1).max(1);
                let storage = self.fresh_storage(capacity)?;
                let offset = storage.as_ptr().align_offset(pool.alignment());
                if offset.saturating_add(size) > storage.len() {
                    self.release_reserved(storage.len());
                    return None;
                }
                ((storage, offset), false)
            }
        };
        pool.record_allocation(reused);
        drop(pools);

        self.ledger.track_live(category, size);
        Some(AlignedBlock {
            storage,
            offset,
            len: size,
            ledger: Arc::clone(&self.ledger),
            origin: BlockOrigin {
                registry: self.id,
                category,
                pool: PoolKey::Aligned(alignment),
            },
        })
    }

    /// Frees a block from [`allocate_aligned`](Self::allocate_aligned).
    ///
    /// # Panics
    ///
    /// Panics if `category` is not the category the block was allocated
    /// under.
    pub fn deallocate_aligned(&self, category: MemoryCategory, block: AlignedBlock) {
        assert_eq!(
            block.origin.category, category,
            "aligned block allocated as {} freed as {}",
            block.origin.category, category
        );
        let usable = block.usable();
        let AlignedBlock {
            storage,
            offset,
            len,
            origin,
            ledger,
        } = block;

        let PoolKey::Aligned(alignment) = origin.pool else {
            self.default_free(origin, &ledger, len, storage.len());
            return;
        };
        if origin.registry != self.id {
            self.default_free(origin, &ledger, len, storage.len());
            return;
        }

        self.untrack_live(category, len);
        if self.is_shut_down() {
            self.release_reserved(storage.len());
            return;
        }
        debug_assert!(usable >= len);
        let mut pools = self.aligned.lock();
        match pools.get_mut(&alignment) {
            Some(pool) => {
                let released = pool.recycle(storage, offset);
                self.release_reserved(released);
            }
            None => self.release_reserved(storage.len()),
        }
    }

    /// [`allocate`](Self::allocate) with the category fixed by a marker type.
    #[inline]
    #[must_use]
    pub fn allocate_in<T: CategoryTag>(&self, size: usize) -> Option<PoolBlock> {
        self.allocate(T::CATEGORY, size)
    }

    /// [`deallocate`](Self::deallocate) with the category fixed by a marker
    /// type.
    ///
    /// # Panics
    ///
    /// Panics if the block was not allocated under `T::CATEGORY`.
    #[inline]
    pub fn deallocate_in<T: CategoryTag>(&self, block: PoolBlock) {
        self.deallocate(T::CATEGORY, block);
    }

    /// Number of pools created so far, aligned pools included.
    #[must_use]
    pub fn pool_count(&self) -> usize {
        let sized = self.pools.iter().filter(|p| p.lock().is_some()).count();
        sized + self.aligned.lock().len()
    }

    /// Snapshot of all counters.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let mut pools = Vec::new();
        for slot in &self.pools {
            if let Some(pool) = slot.lock().as_ref() {
                pools.push((PoolKey::Sized(pool.id()), pool.stats()));
            }
        }
        for (alignment, pool) in self.aligned.lock().iter() {
            pools.push((PoolKey::Aligned(*alignment), pool.stats()));
        }
        RegistryStats {
            pools,
            reserved_bytes: self.ledger.reserved_bytes(),
            budget_bytes: self.config.budget_bytes,
            live_bytes: self.ledger.live_bytes(),
            live_blocks: self.ledger.live_blocks(),
            foreign_frees: self.foreign_frees.load(Ordering::Relaxed),
        }
    }

    /// Tears the registry down.
    ///
    /// Recycled storage returns to the heap and further allocations fail.
    /// Blocks still live stay valid; freeing them afterwards drops their
    /// storage directly. Calling this twice is harmless.
    pub fn shutdown(&self) -> ShutdownReport {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return ShutdownReport::default();
        }
        let mut released_bytes = 0;
        for slot in &self.pools {
            if let Some(pool) = slot.lock().as_mut() {
                released_bytes += pool.drain();
            }
        }
        for pool in self.aligned.lock().values_mut() {
            released_bytes += pool.drain();
        }
        self.release_reserved(released_bytes);

        let live_blocks = self.ledger.live_blocks().iter().sum();
        if live_blocks > 0 {
            tracing::warn!(
                "Registry {} shut down with {} live blocks",
                self.id.0,
                live_blocks
            );
        } else {
            tracing::debug!("Registry {} shut down, released {} bytes", self.id.0, released_bytes);
        }
        ShutdownReport {
            live_blocks,
            released_bytes,
        }
    }

    /// Reserves `capacity` bytes against the budget and allocates them.
    fn fresh_storage(&self, capacity: usize) -> Option<Box<[u8]>> {
        if !self.ledger.try_reserve(capacity, self.config.budget_bytes) {
            tracing::debug!(
                "Registry {}: budget exhausted ({} more bytes requested)",
                self.id.0,
                capacity
            );
            return None;
        }
        let mut storage = Vec::new();
        if storage.try_reserve_exact(capacity).is_err() {
            self.release_reserved(capacity);
            return None;
        }
        storage.resize(capacity, 0u8);
        Some(storage.into_boxed_slice())
    }

    fn release_reserved(&self, bytes: usize) {
        self.ledger.release_reserved(bytes);
    }

    fn untrack_live(&self, category: MemoryCategory, len: usize) {
        self.ledger.untrack_live(category, len);
    }

    /// Blocks without a matching pool in this registry are dropped. Their
    /// bytes are settled with the registry that handed them out.
    fn default_free(&self, origin: BlockOrigin, ledger: &Ledger, len: usize, bytes: usize) {
        self.foreign_frees.fetch_add(1, Ordering::Relaxed);
        ledger.untrack_live(origin.category, len);
        ledger.release_reserved(bytes);
        tracing::debug!(
            "Registry {}: default free of {} bytes from registry {} ({})",
            self.id.0,
            bytes,
            origin.registry.0,
            origin.pool
        );
    }
}
