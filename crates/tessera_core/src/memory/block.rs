//! Block handles returned by the registry.
//!
//! A block owns its storage and carries the tag of the pool that produced it,
//! so a free can be routed without inspecting memory around the block.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::category::MemoryCategory;
use super::size_class::PoolId;

/// Identity of a [`MemoryRegistry`](super::MemoryRegistry) instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RegistryId(pub(crate) u64);

impl RegistryId {
    /// Raw id value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Which pool inside a registry produced a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PoolKey {
    /// A size-class pool.
    Sized(PoolId),
    /// The aligned pool for this alignment.
    Aligned(usize),
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sized(id) => write!(f, "{id}"),
            Self::Aligned(align) => write!(f, "aligned#{align}"),
        }
    }
}

/// Origin tag carried by every block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockOrigin {
    /// Registry that handed out the block.
    pub registry: RegistryId,
    /// Category the block was allocated under.
    pub category: MemoryCategory,
    /// Pool that owns the storage.
    pub pool: PoolKey,
}

/// Byte and block counters of one registry.
///
/// Every block holds the ledger of the registry that produced it, so a
/// block freed into another registry still settles its bytes at home.
#[derive(Debug, Default)]
pub(crate) struct Ledger {
    reserved_bytes: AtomicUsize,
    live_bytes: [AtomicUsize; MemoryCategory::COUNT],
    live_blocks: [AtomicUsize; MemoryCategory::COUNT],
}

impl Ledger {
    /// Reserves `bytes` unless that would exceed `budget`.
    pub(crate) fn try_reserve(&self, bytes: usize, budget: Option<usize>) -> bool {
        let Some(budget) = budget else {
            self.reserved_bytes.fetch_add(bytes, Ordering::Relaxed);
            return true;
        };
        self.reserved_bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |held| {
                held.checked_add(bytes).filter(|next| *next <= budget)
            })
            .is_ok()
    }

    pub(crate) fn release_reserved(&self, bytes: usize) {
        if bytes > 0 {
            self.reserved_bytes.fetch_sub(bytes, Ordering::AcqRel);
        }
    }

    pub(crate) fn track_live(&self, category: MemoryCategory, len: usize) {
        self.live_bytes[category.index()].fetch_add(len, Ordering::Relaxed);
        self.live_blocks[category.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn untrack_live(&self, category: MemoryCategory, len: usize) {
        self.live_bytes[category.index()].fetch_sub(len, Ordering::Relaxed);
        self.live_blocks[category.index()].fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn reserved_bytes(&self) -> usize {
        self.reserved_bytes.load(Ordering::Relaxed)
    }

    pub(crate) fn live_bytes(&self) -> [usize; MemoryCategory::COUNT] {
        std::array::from_fn(|i| self.live_bytes[i].load(Ordering::Relaxed))
    }

    pub(crate) fn live_blocks(&self) -> [usize; MemoryCategory::COUNT] {
        std::array::from_fn(|i| self.live_blocks[i].load(Ordering::Relaxed))
    }
}

/// A block from a size-class pool.
///
/// Dereferences to exactly the requested number of bytes. Contents of a
/// recycled block are unspecified. Blocks are not `Clone`: each one is freed
/// exactly once by handing it back to
/// [`MemoryRegistry::deallocate`](super::MemoryRegistry::deallocate).
pub struct PoolBlock {
    pub(crate) storage: Box<[u8]>,
    pub(crate) len: usize,
    pub(crate) origin: BlockOrigin,
    pub(crate) ledger: Arc<Ledger>,
}

impl PoolBlock {
    /// Requested size in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the block was requested with size zero.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of the backing slot, at least [`len`](Self::len).
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Category the block was allocated under.
    #[inline]
    #[must_use]
    pub fn category(&self) -> MemoryCategory {
        self.origin.category
    }

    /// Origin tag.
    #[inline]
    #[must_use]
    pub fn origin(&self) -> BlockOrigin {
        self.origin
    }
}

impl Deref for PoolBlock {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        &self.storage[..self.len]
    }
}

impl DerefMut for PoolBlock {
    #[inline]
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.storage[..self.len]
    }
}

impl fmt::Debug for PoolBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolBlock")
            .field("len", &self.len)
            .field("capacity", &self.storage.len())
            .field("origin", &self.origin)
            .finish()
    }
}

/// A block whose first byte sits on a requested alignment.
///
/// The storage is over-allocated by `alignment - 1` bytes and the usable
/// window starts at the first aligned address.
pub struct AlignedBlock {
    pub(crate) storage: Box<[u8]>,
    pub(crate) offset: usize,
    pub(crate) len: usize,
    pub(crate) origin: BlockOrigin,
    pub(crate) ledger: Arc<Ledger>,
}

impl AlignedBlock {
    /// Requested size in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the block was requested with size zero.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Alignment the block was requested with.
    #[must_use]
    pub fn alignment(&self) -> usize {
        match self.origin.pool {
            PoolKey::Aligned(align) => align,
            PoolKey::Sized(_) => 1,
        }
    }

    /// Category the block was allocated under.
    #[inline]
    #[must_use]
    pub fn category(&self) -> MemoryCategory {
        self.origin.category
    }

    /// Origin tag.
    #[inline]
    #[must_use]
    pub fn origin(&self) -> BlockOrigin {
        self.origin
    }

    /// Usable bytes past the aligned start, at least [`len`](Self::len).
    #[inline]
    pub(crate) fn usable(&self) -> usize {
        self.storage.len() - self.offset
    }
}

impl Deref for AlignedBlock {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        &self.storage[self.offset..self.offset + self.len]
    }
}

impl DerefMut for AlignedBlock {
    #[inline]
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.storage[self.offset..self.offset + self.len]
    }
}

impl fmt::Debug for AlignedBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlignedBlock")
            .field("len", &self.len)
            .field("offset", &self.offset)
            .field("origin", &self.origin)
            .finish()
    }
}
