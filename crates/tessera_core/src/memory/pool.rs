//! # Backing Pools
//!
//! One pool per size class plus one per alignment. A pool recycles the
//! storage of released blocks; storage beyond `max_recycled` goes back to the
//! heap. Pools are created lazily by the registry and live until shutdown.

use std::collections::BTreeMap;

use super::size_class::PoolId;

/// Counters for a single pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Blocks handed out since creation.
    pub allocations: u64,
    /// Allocations served from recycled storage.
    pub reused: u64,
    /// Blocks currently handed out.
    pub live: usize,
    /// Released blocks held for reuse.
    pub recycled: usize,
    /// Bytes held by recycled blocks.
    pub recycled_bytes: usize,
}

/// Free list keyed by usable size, best fit within a 2x window.
#[derive(Debug)]
pub(crate) struct SizedFreeList<T> {
    entries: BTreeMap<usize, Vec<T>>,
    count: usize,
    bytes: usize,
}

impl<T> SizedFreeList<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            count: 0,
            bytes: 0,
        }
    }

    pub(crate) fn push(&mut self, usable: usize, item: T) {
        self.entries.entry(usable).or_default().push(item);
        self.count += 1;
        self.bytes += usable;
    }

    /// Smallest entry of at least `size` usable bytes and at most twice that.
    pub(crate) fn pop_fit(&mut self, size: usize) -> Option<T> {
        let upper = size.saturating_mul(2).max(size);
        let usable = *self.entries.range(size..=upper).next()?.0;
        let bucket = self.entries.get_mut(&usable)?;
        let item = bucket.pop()?;
        if bucket.is_empty() {
            self.entries.remove(&usable);
        }
        self.count -= 1;
        self.bytes -= usable;
        Some(item)
    }

    pub(crate) fn len(&self) -> usize {
        self.count
    }

    pub(crate) fn bytes(&self) -> usize {
        self.bytes
    }

    pub(crate) fn clear(&mut self) -> usize {
        let released = self.bytes;
        self.entries.clear();
        self.count = 0;
        self.bytes = 0;
        released
    }
}

#[derive(Debug)]
enum FreeList {
    /// Every slot has the class size.
    Fixed { slot: usize, free: Vec<Box<[u8]>> },
    /// Overflow pool: slots sized to the request.
    Variable(SizedFreeList<Box<[u8]>>),
}

/// Pool serving one size class.
#[derive(Debug)]
pub(crate) struct SizeClassPool {
    id: PoolId,
    free: FreeList,
    max_recycled: usize,
    stats: PoolStats,
}

impl SizeClassPool {
    pub(crate) fn new(id: PoolId, max_recycled: usize) -> Self {
        let free = match id.slot_size() {
            Some(slot) => FreeList::Fixed {
                slot,
                free: Vec::new(),
            },
            None => FreeList::Variable(SizedFreeList::new()),
        };
        Self {
            id,
            free,
            max_recycled,
            stats: PoolStats::default(),
        }
    }

    pub(crate) fn id(&self) -> PoolId {
        self.id
    }

    /// Storage size a fresh block for `size` bytes needs.
    pub(crate) fn fresh_capacity(&self, size: usize) -> usize {
        match &self.free {
            FreeList::Fixed { slot, .. } => *slot,
            FreeList::Variable(_) => size.max(1),
        }
    }

    /// Pops recycled storage that can hold `size` bytes.
    pub(crate) fn take_recycled(&mut self, size: usize) -> Option<Box<[u8]>> {
        let storage = match &mut self.free {
            FreeList::Fixed { free, .. } => free.pop(),
            FreeList::Variable(list) => list.pop_fit(size.max(1)),
        }?;
        self.sync_recycled();
        Some(storage)
    }

    pub(crate) fn record_allocation(&mut self, reused: bool) {
        self.stats.allocations += 1;
        self.stats.live += 1;
        if reused {
            self.stats.reused += 1;
        }
    }

    /// Takes storage back. Returns the bytes handed back to the heap, zero
    /// if the storage was kept for reuse.
    pub(crate) fn recycle(&mut self, storage: Box<[u8]>) -> usize {
        self.stats.live = self.stats.live.saturating_sub(1);
        if self.stats.recycled >= self.max_recycled {
            return storage.len();
        }
        match &mut self.free {
            FreeList::Fixed { slot, free } => {
                debug_assert_eq!(storage.len(), *slot);
                free.push(storage);
            }
            FreeList::Variable(list) => list.push(storage.len(), storage),
        }
        self.sync_recycled();
        0
    }

    /// Drops every recycled slot. Returns the bytes released.
    pub(crate) fn drain(&mut self) -> usize {
        let released = match &mut self.free {
            FreeList::Fixed { free, .. } => {
                let bytes = free.iter().map(|s| s.len()).sum();
                free.clear();
                bytes
            }
            FreeList::Variable(list) => list.clear(),
        };
        self.sync_recycled();
        released
    }

    pub(crate) fn stats(&self) -> PoolStats {
        self.stats
    }

    fn sync_recycled(&mut self) {
        let (count, bytes) = match &self.free {
            FreeList::Fixed { slot, free } => (free.len(), free.len() * slot),
            FreeList::Variable(list) => (list.len(), list.bytes()),
        };
        self.stats.recycled = count;
        self.stats.recycled_bytes = bytes;
    }
}

/// Pool serving one alignment. Entries are `(storage, aligned offset)`.
#[derive(Debug)]
pub(crate) struct AlignedPool {
    alignment: usize,
    free: SizedFreeList<(Box<[u8]>, usize)>,
    max_recycled: usize,
    stats: PoolStats,
}

impl AlignedPool {
    pub(crate) fn new(alignment: usize, max_recycled: usize) -> Self {
        Self {
            alignment,
            free: SizedFreeList::new(),
            max_recycled,
            stats: PoolStats::default(),
        }
    }

    pub(crate) fn alignment(&self) -> usize {
        self.alignment
    }

    pub(crate) fn take_recycled(&mut self, size: usize) -> Option<(Box<[u8]>, usize)> {
        let entry = self.free.pop_fit(size.max(1))?;
        self.sync_recycled();
        Some(entry)
    }

    pub(crate) fn record_allocation(&mut self, reused: bool) {
        self.stats.allocations += 1;
        self.stats.live += 1;
        if reused {
            self.stats.reused += 1;
        }
    }

    /// Takes storage back. Returns the bytes handed back to the heap.
    pub(crate) fn recycle(&mut self, storage: Box<[u8]>, offset: usize) -> usize {
        self.stats.live = self.stats.live.saturating_sub(1);
        if self.free.len() >= self.max_recycled {
            return storage.len();
        }
        // Keyed by bytes past the aligned start; padding is not reusable.
        let usable = storage.len() - offset;
        self.free.push(usable, (storage, offset));
        self.sync_recycled();
        0
    }

    pub(crate) fn drain(&mut self) -> usize {
        let released = self.free.clear();
        self.sync_recycled();
        released
    }

    pub(crate) fn stats(&self) -> PoolStats {
        self.stats
    }

    fn sync_recycled(&mut self) {
        self.stats.recycled = self.free.len();
        self.stats.recycled_bytes = self.free.bytes();
    }
}
