//! # Lock Staging
//!
//! A [`BufferLock`] stages a byte range of a buffer in system memory and
//! writes it back when dropped.
//!
//! ```text
//!  len < map_threshold ──► scratch arena ──miss──┐
//!  len >= map_threshold ─────────────────────────┴──► registry block ──none──► heap
//! ```

use std::fmt;

use tessera_core::ScratchBlock;

use super::backing::{BufferBacking, PooledBytes};
use super::hardware::{HardwareBuffer, StagingContext};
use super::usage::LockOption;

/// Where a lock's bytes are staged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StagingKind {
    /// A block of the scratch arena.
    Scratch,
    /// A geometry block from the memory registry.
    Pooled,
    /// A plain heap allocation.
    Heap,
}

/// Staged bytes of a lock or a buffer-to-buffer copy.
///
/// The buffer's backing lock is always taken before the arena mutex.
pub(crate) enum Staging {
    Scratch(ScratchBlock),
    Pooled(PooledBytes),
    Heap(Vec<u8>),
}

impl Staging {
    /// Picks where `len` bytes for `buffer` are staged.
    pub(crate) fn acquire(buffer: &HardwareBuffer, len: usize) -> Self {
        let Some(context) = buffer.staging() else {
            return Self::Heap(vec![0; len]);
        };
        if len < context.map_threshold {
            if let Some(block) = context.arena.allocate(len) {
                return Self::Scratch(block);
            }
            tracing::debug!(
                "{}: scratch miss for {} bytes, staging in pool",
                buffer.id(),
                len
            );
        }
        match PooledBytes::allocate(&context.registry, len) {
            Some(bytes) => Self::Pooled(bytes),
            None => {
                tracing::warn!("{}: registry exhausted, staging {} bytes on heap", buffer.id(), len);
                Self::Heap(vec![0; len])
            }
        }
    }

    fn kind(&self) -> StagingKind {
        match self {
            Self::Scratch(_) => StagingKind::Scratch,
            Self::Pooled(_) => StagingKind::Pooled,
            Self::Heap(_) => StagingKind::Heap,
        }
    }

    /// Fills the staged bytes from `backing` at `offset`.
    pub(crate) fn fill(
        &mut self,
        context: Option<&StagingContext>,
        backing: &BufferBacking,
        offset: usize,
    ) {
        match self {
            Self::Scratch(block) => {
                if let Some(context) = context {
                    context
                        .arena
                        .with_bytes_mut(block, |bytes| backing.read(offset, bytes));
                }
            }
            Self::Pooled(bytes) => backing.read(offset, bytes),
            Self::Heap(bytes) => backing.read(offset, bytes),
        }
    }

    /// Writes the staged bytes to `backing` at `offset`.
    pub(crate) fn write_to(
        &self,
        context: Option<&StagingContext>,
        backing: &mut BufferBacking,
        offset: usize,
        discard_whole: bool,
    ) {
        match self {
            Self::Scratch(block) => {
                if let Some(context) = context {
                    context
                        .arena
                        .with_bytes(block, |bytes| backing.write(offset, bytes, discard_whole));
                }
            }
            Self::Pooled(bytes) => backing.write(offset, bytes, discard_whole),
            Self::Heap(bytes) => backing.write(offset, bytes, discard_whole),
        }
    }

    /// Returns a scratch block to its arena. Other staging is dropped.
    pub(crate) fn release(self, context: Option<&StagingContext>) {
        if let (Self::Scratch(block), Some(context)) = (self, context) {
            context.arena.deallocate(block);
        }
    }
}

/// Outstanding lock on a byte range. Unlocks on drop.
pub struct BufferLock<'a> {
    buffer: &'a HardwareBuffer,
    offset: usize,
    len: usize,
    option: LockOption,
    /// `None` only while unlocking.
    staging: Option<Staging>,
}

impl<'a> BufferLock<'a> {
    /// Stages the range. The caller has already checked the range and won
    /// the lock flag.
    pub(crate) fn begin(
        buffer: &'a HardwareBuffer,
        offset: usize,
        len: usize,
        option: LockOption,
    ) -> Self {
        let mut staging = Staging::acquire(buffer, len);
        if option.reads_existing() {
            let context = buffer.staging_context();
            staging.fill(context, &buffer.backing().lock(), offset);
        }
        Self {
            buffer,
            offset,
            len,
            option,
            staging: Some(staging),
        }
    }

    /// Byte offset of the locked range.
    #[inline]
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Length of the locked range.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the locked range is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Option the lock was taken with.
    #[inline]
    #[must_use]
    pub fn option(&self) -> LockOption {
        self.option
    }

    /// Where the bytes are staged.
    #[must_use]
    pub fn staging_kind(&self) -> StagingKind {
        self.staging.as_ref().map_or(StagingKind::Heap, Staging::kind)
    }

    /// Runs `f` over the staged bytes.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        match &self.staging {
            Some(Staging::Scratch(block)) => match self.buffer.staging() {
                Some(context) => context.arena.with_bytes(block, f),
                None => f(&[]),
            },
            Some(Staging::Pooled(bytes)) => f(&bytes[..]),
            Some(Staging::Heap(bytes)) => f(&bytes[..]),
            None => f(&[]),
        }
    }

    /// Runs `f` over the staged bytes, mutably.
    pub fn with_bytes_mut<R>(&mut self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        match &mut self.staging {
            Some(Staging::Scratch(block)) => match self.buffer.staging() {
                Some(context) => context.arena.with_bytes_mut(block, f),
                None => f(&mut []),
            },
            Some(Staging::Pooled(bytes)) => f(&mut bytes[..]),
            Some(Staging::Heap(bytes)) => f(&mut bytes[..]),
            None => f(&mut []),
        }
    }

    /// Unlocks now. Same as dropping the guard.
    pub fn unlock(self) {}

    fn finish(&mut self) {
        let Some(staging) = self.staging.take() else {
            return;
        };
        let context = self.buffer.staging_context();
        if self.option.writes_back() {
            let discard = self.option == LockOption::Discard;
            staging.write_to(context, &mut self.buffer.backing().lock(), self.offset, discard);
        }
        staging.release(context);
        self.buffer.release_lock();
    }
}

impl Drop for BufferLock<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}

impl fmt::Debug for BufferLock<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferLock")
            .field("buffer", &self.buffer.id())
            .field("offset", &self.offset)
            .field("len", &self.len)
            .field("option", &self.option)
            .field("staging", &self.staging_kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tessera_core::{MemoryConfig, MemoryRegistry, ScratchArena, ScratchConfig};

    use super::*;
    use crate::buffer::backing::BufferBacking;
    use crate::buffer::device::HostDeviceMemory;
    use crate::buffer::hardware::StagingContext;
    use crate::buffer::usage::BufferUsage;
    use crate::error::BufferError;

    fn staging(scratch: usize, map_threshold: usize) -> Arc<StagingContext> {
        let registry = Arc::new(MemoryRegistry::new(MemoryConfig::default()));
        let arena = ScratchArena::new(Arc::clone(&registry), &ScratchConfig::with_capacity(scratch))
            .unwrap();
        Arc::new(StagingContext {
            arena: Arc::new(arena),
            registry,
            map_threshold,
        })
    }

    fn buffer(len: usize, context: Option<Arc<StagingContext>>) -> HardwareBuffer {
        let backing = BufferBacking::Device(Box::new(HostDeviceMemory::new(len)));
        HardwareBuffer::new(1, len, BufferUsage::DYNAMIC, backing, context).unwrap()
    }

    #[test]
    fn test_short_lock_stages_in_scratch() {
        let context = staging(1024, 256);
        let buffer = buffer(512, Some(Arc::clone(&context)));
        buffer.write(0, &[7; 512], true).unwrap();
        {
            let mut lock = buffer.lock(16, 32, LockOption::Normal).unwrap();
            assert_eq!(lock.staging_kind(), StagingKind::Scratch);
            lock.with_bytes(|bytes| assert!(bytes.iter().all(|&b| b == 7)));
            lock.with_bytes_mut(|bytes| bytes.fill(1));
            assert_eq!(context.arena.stats().live_blocks, 1);
        }
        assert_eq!(context.arena.stats().live_blocks, 0);
        assert!(!buffer.is_locked());

        let mut out = [0u8; 34];
        buffer.read(15, &mut out).unwrap();
        assert_eq!(out[0], 7);
        assert!(out[1..33].iter().all(|&b| b == 1));
        assert_eq!(out[33], 7);
    }

    #[test]
    fn test_long_lock_stages_in_pool() {
        let context = staging(1024, 64);
        let buffer = buffer(512, Some(context));
        let lock = buffer.lock_all(LockOption::Discard).unwrap();
        assert_eq!(lock.staging_kind(), StagingKind::Pooled);
    }

    #[test]
    fn test_scratch_miss_falls_back() {
        let context = staging(64, 4096);
        let buffer = buffer(512, Some(Arc::clone(&context)));
        let lock = buffer.lock(0, 200, LockOption::Normal).unwrap();
        assert_eq!(lock.staging_kind(), StagingKind::Pooled);
        assert_eq!(context.arena.stats().misses, 1);
    }

    #[test]
    fn test_no_context_uses_heap() {
        let buffer = buffer(16, None);
        let mut lock = buffer.lock_all(LockOption::WriteOnly).unwrap();
        assert_eq!(lock.staging_kind(), StagingKind::Heap);
        lock.with_bytes_mut(|bytes| bytes.copy_from_slice(&[3; 16]));
        lock.unlock();
        let mut out = [0u8; 16];
        buffer.read(0, &mut out).unwrap();
        assert_eq!(out, [3; 16]);
    }

    #[test]
    fn test_read_only_does_not_write_back() {
        let buffer = buffer(8, None);
        buffer.write(0, &[5; 8], false).unwrap();
        {
            let mut lock = buffer.lock_all(LockOption::ReadOnly).unwrap();
            lock.with_bytes_mut(|bytes| bytes.fill(0));
        }
        let mut out = [0u8; 8];
        buffer.read(0, &mut out).unwrap();
        assert_eq!(out, [5; 8]);
    }

    #[test]
    fn test_copy_stages_through_scratch() {
        let context = staging(1024, 256);
        let src = buffer(128, Some(Arc::clone(&context)));
        let dst = buffer(128, Some(Arc::clone(&context)));
        src.write(0, &[4; 128], true).unwrap();

        dst.copy_from(&src, 32, 0, 64, false).unwrap();
        let stats = context.arena.stats();
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.live_blocks, 0);

        let mut out = [0u8; 128];
        dst.read(0, &mut out).unwrap();
        assert!(out[..64].iter().all(|&b| b == 4));
        assert!(out[64..].iter().all(|&b| b == 0));

        let err = dst.copy_from(&src, 100, 0, 64, false).unwrap_err();
        assert!(matches!(err, BufferError::OutOfRange { offset: 100, .. }));
    }

    #[test]
    fn test_locks_and_copies_share_arena_across_threads() {
        let context = staging(4096, 256);
        let a = Arc::new(buffer(256, Some(Arc::clone(&context))));
        let b = Arc::new(buffer(256, Some(Arc::clone(&context))));

        let handles: Vec<_> = (0..4u8)
            .map(|i| {
                let (a, b) = if i % 2 == 0 {
                    (Arc::clone(&a), Arc::clone(&b))
                } else {
                    (Arc::clone(&b), Arc::clone(&a))
                };
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        if let Ok(mut lock) = a.lock(0, 128, LockOption::Normal) {
                            lock.with_bytes_mut(|bytes| bytes.fill(i));
                        }
                        b.copy_from(&a, 0, 128, 128, false).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(!a.is_locked());
        assert!(!b.is_locked());
        assert_eq!(context.arena.stats().live_blocks, 0);
    }

    #[test]
    fn test_second_lock_fails() {
        let buffer = buffer(8, None);
        let lock = buffer.lock_all(LockOption::Normal).unwrap();
        assert_eq!(
            buffer.lock(0, 4, LockOption::Normal).unwrap_err(),
            BufferError::AlreadyLocked(buffer.id().get())
        );
        drop(lock);
        assert!(buffer.lock(0, 4, LockOption::Normal).is_ok());
    }
}
