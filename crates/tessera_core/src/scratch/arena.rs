//! # Scratch Arena
//!
//! A fixed arena carved into blocks, each prefixed by a [`BlockHeader`].
//! The headers form an implicit list: the next header sits at
//! `offset + HEADER_SIZE + size`.
//!
//! ```text
//!  0                                                          capacity
//!  [H|  used 100  ][H|  used 200  ][H|       free          ]
//!    ^ data offset
//! ```
//!
//! Allocation is a first-fit scan from the start; a block larger than the
//! request by more than one header is split. Freeing merges with a free
//! predecessor and then a free successor, so no two adjacent blocks are
//! ever both free.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::header::{BlockHeader, HEADER_SIZE, MAX_BLOCK_SIZE};
use crate::config::ScratchConfig;
use crate::error::{CoreError, CoreResult};
use crate::memory::{AlignedBlock, MemoryCategory, MemoryRegistry};

static NEXT_ARENA_ID: AtomicU64 = AtomicU64::new(1);

/// Counters of one arena.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScratchStats {
    /// Arena size, headers included.
    pub capacity: usize,
    /// Successful allocations.
    pub allocations: u64,
    /// Frees.
    pub deallocations: u64,
    /// Requests that found no fitting block.
    pub misses: u64,
    /// Used blocks right now.
    pub live_blocks: usize,
    /// Data bytes in used blocks right now.
    pub live_bytes: usize,
    /// Highest `live_bytes` seen.
    pub peak_live_bytes: usize,
}

/// A block handed out by [`ScratchArena::allocate`].
///
/// Not `Clone`: it is freed exactly once through
/// [`ScratchArena::deallocate`]. Dropping it without freeing keeps the
/// space allocated until the arena itself is dropped.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "scratch blocks must be returned with ScratchArena::deallocate"]
pub struct ScratchBlock {
    arena: u64,
    offset: usize,
    len: usize,
}

impl ScratchBlock {
    /// Byte offset of the data inside the arena.
    #[inline]
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Requested size in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the request was for zero bytes.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Debug)]
struct ArenaInner {
    /// `None` only while the arena is being dropped.
    memory: Option<AlignedBlock>,
    stats: ScratchStats,
}

impl ArenaInner {
    fn bytes(&self) -> &[u8] {
        self.memory.as_deref().unwrap_or_default()
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        self.memory.as_deref_mut().unwrap_or_default()
    }
}

/// Fixed-capacity staging arena with an embedded coalescing free list.
///
/// All operations take one mutex.
#[derive(Debug)]
pub struct ScratchArena {
    id: u64,
    capacity: usize,
    alignment: usize,
    registry: Arc<MemoryRegistry>,
    inner: Mutex<ArenaInner>,
}

impl ScratchArena {
    /// Acquires the arena memory from `registry`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad config, or
    /// [`CoreError::ArenaUnavailable`] if the registry cannot supply the
    /// memory.
    pub fn new(registry: Arc<MemoryRegistry>, config: &ScratchConfig) -> CoreResult<Self> {
        config.validate()?;
        let mut memory = registry
            .allocate_aligned(MemoryCategory::Geometry, config.alignment, config.capacity)
            .ok_or(CoreError::ArenaUnavailable {
                capacity: config.capacity,
            })?;
        BlockHeader::free(config.capacity - HEADER_SIZE).write(&mut memory, 0);

        let id = NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            "Scratch arena {} created ({} bytes, {}-byte aligned)",
            id,
            config.capacity,
            config.alignment
        );
        Ok(Self {
            id,
            capacity: config.capacity,
            alignment: config.alignment,
            registry,
            inner: Mutex::new(ArenaInner {
                memory: Some(memory),
                stats: ScratchStats {
                    capacity: config.capacity,
                    ..ScratchStats::default()
                },
            }),
        })
    }

    /// Total size, headers included.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Physical alignment of the arena start.
    #[inline]
    #[must_use]
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Allocates `size` bytes, rounded up to a multiple of four.
    ///
    /// Returns `None` if no free block fits; callers fall back to a slower
    /// path.
    pub fn allocate(&self, size: usize) -> Option<ScratchBlock> {
        let rounded = round_up(size)?;
        let mut inner = self.inner.lock();
        let capacity = self.capacity;
        let bytes = inner.bytes_mut();

        let mut pos = 0;
        while pos < capacity {
            let header = BlockHeader::read(bytes, pos);
            let block_size = header.size();
            if header.is_free() && block_size >= rounded {
                if block_size > rounded + HEADER_SIZE {
                    let tail = pos + HEADER_SIZE + rounded;
                    BlockHeader::free(block_size - rounded - HEADER_SIZE).write(bytes, tail);
                    BlockHeader::used(rounded).write(bytes, pos);
                } else {
                    BlockHeader::used(block_size).write(bytes, pos);
                }
                let used = BlockHeader::read(bytes, pos).size();

                let stats = &mut inner.stats;
                stats.allocations += 1;
                stats.live_blocks += 1;
                stats.live_bytes += used;
                stats.peak_live_bytes = stats.peak_live_bytes.max(stats.live_bytes);
                return Some(ScratchBlock {
                    arena: self.id,
                    offset: pos + HEADER_SIZE,
                    len: size,
                });
            }
            pos += HEADER_SIZE + block_size;
        }

        inner.stats.misses += 1;
        tracing::debug!("Scratch arena {}: no block fits {} bytes", self.id, rounded);
        None
    }

    /// Frees a block and merges it with free neighbours.
    ///
    /// # Panics
    ///
    /// Panics if the block belongs to another arena or is not found here.
    /// Either indicates a lifetime bug in the caller.
    pub fn deallocate(&self, block: ScratchBlock) {
        assert_eq!(
            block.arena, self.id,
            "scratch block from arena {} freed into arena {}",
            block.arena, self.id
        );
        let target = block.offset - HEADER_SIZE;
        let mut inner = self.inner.lock();
        let capacity = self.capacity;
        let bytes = inner.bytes_mut();

        let mut prev: Option<usize> = None;
        let mut pos = 0;
        while pos < capacity {
            let header = BlockHeader::read(bytes, pos);
            if pos == target {
                assert!(
                    !header.is_free(),
                    "scratch block at offset {} is already free",
                    block.offset
                );
                let freed = header.size();
                let mut start = pos;
                let mut size = freed;

                if let Some(p) = prev {
                    let before = BlockHeader::read(bytes, p);
                    if before.is_free() {
                        start = p;
                        size += before.size() + HEADER_SIZE;
                    }
                }
                let next = pos + HEADER_SIZE + freed;
                if next < capacity {
                    let after = BlockHeader::read(bytes, next);
                    if after.is_free() {
                        size += after.size() + HEADER_SIZE;
                    }
                }
                BlockHeader::free(size).write(bytes, start);

                let stats = &mut inner.stats;
                stats.deallocations += 1;
                stats.live_blocks -= 1;
                stats.live_bytes -= freed;
                return;
            }
            prev = Some(pos);
            pos += HEADER_SIZE + header.size();
        }
        panic!(
            "scratch block at offset {} not found in arena {}",
            block.offset, self.id
        );
    }

    /// Runs `f` over the block's bytes.
    ///
    /// # Panics
    ///
    /// Panics if the block belongs to another arena.
    pub fn with_bytes<R>(&self, block: &ScratchBlock, f: impl FnOnce(&[u8]) -> R) -> R {
        self.check_owner(block);
        let inner = self.inner.lock();
        f(&inner.bytes()[block.offset..block.offset + block.len])
    }

    /// Runs `f` over the block's bytes, mutably.
    ///
    /// # Panics
    ///
    /// Panics if the block belongs to another arena.
    pub fn with_bytes_mut<R>(&self, block: &ScratchBlock, f: impl FnOnce(&mut [u8]) -> R) -> R {
        self.check_owner(block);
        let mut inner = self.inner.lock();
        f(&mut inner.bytes_mut()[block.offset..block.offset + block.len])
    }

    /// Every block as `(header offset, header)`, in arena order.
    #[must_use]
    pub fn layout(&self) -> Vec<(usize, BlockHeader)> {
        let inner = self.inner.lock();
        let bytes = inner.bytes();
        let mut blocks = Vec::new();
        let mut pos = 0;
        while pos < self.capacity {
            let header = BlockHeader::read(bytes, pos);
            blocks.push((pos, header));
            pos += HEADER_SIZE + header.size();
        }
        blocks
    }

    /// Data bytes in free blocks.
    #[must_use]
    pub fn free_bytes(&self) -> usize {
        self.layout()
            .iter()
            .filter(|(_, h)| h.is_free())
            .map(|(_, h)| h.size())
            .sum()
    }

    /// Size of the largest free block, zero if none.
    #[must_use]
    pub fn largest_free_block(&self) -> usize {
        self.layout()
            .iter()
            .filter(|(_, h)| h.is_free())
            .map(|(_, h)| h.size())
            .max()
            .unwrap_or(0)
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> ScratchStats {
        self.inner.lock().stats
    }

    fn check_owner(&self, block: &ScratchBlock) {
        assert_eq!(
            block.arena, self.id,
            "scratch block from arena {} accessed through arena {}",
            block.arena, self.id
        );
    }
}

impl Drop for ScratchArena {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if inner.stats.live_blocks > 0 {
            tracing::warn!(
                "Scratch arena {} dropped with {} live blocks",
                self.id,
                inner.stats.live_blocks
            );
        }
        if let Some(memory) = inner.memory.take() {
            self.registry
                .deallocate_aligned(MemoryCategory::Geometry, memory);
        }
    }
}

/// Rounds to a multiple of four, zero becoming four.
fn round_up(size: usize) -> Option<usize> {
    let rounded = size.max(1).checked_add(3)? & !3;
    (rounded <= MAX_BLOCK_SIZE).then_some(rounded)
}
