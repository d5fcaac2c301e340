//! # Hardware Vertex Buffers
//!
//! One capability surface ([`HardwareBuffer`]) over every backing variant.
//! Reads and writes copy byte ranges; [`HardwareBuffer::lock`] hands out a
//! staged range that is written back on unlock.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use bytemuck::Pod;
use parking_lot::Mutex;
use tessera_core::{MemoryRegistry, ScratchArena};

use super::backing::{BackingKind, BufferBacking};
use super::lock::{BufferLock, Staging};
use super::usage::{BufferUsage, LockOption};
use crate::error::{BufferError, BufferResult};

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique buffer identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufferId(u64);

impl BufferId {
    fn next() -> Self {
        Self(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer#{}", self.0)
    }
}

/// Where locks stage their bytes.
///
/// Locks shorter than `map_threshold` try the scratch arena first; misses
/// and longer locks take a pooled block from `registry`.
#[derive(Debug)]
pub struct StagingContext {
    /// Arena for short locks.
    pub arena: Arc<ScratchArena>,
    /// Pool for longer locks and scratch misses.
    pub registry: Arc<MemoryRegistry>,
    /// Locks of fewer bytes than this stage through scratch.
    pub map_threshold: usize,
}

/// Shared handle to a buffer.
pub type SharedBuffer = Arc<HardwareBuffer>;

/// A vertex buffer.
pub struct HardwareBuffer {
    id: BufferId,
    vertex_size: usize,
    vertex_count: usize,
    usage: BufferUsage,
    kind: BackingKind,
    backing: Mutex<BufferBacking>,
    locked: AtomicBool,
    instance_data: AtomicBool,
    instance_step_rate: AtomicU32,
    staging: Option<Arc<StagingContext>>,
}

impl HardwareBuffer {
    /// Wraps `backing` as a buffer of `vertex_count` vertices.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::InvalidShape`] if the size overflows, or
    /// [`BufferError::SizeMismatch`] if the backing has a different size.
    pub fn new(
        vertex_size: usize,
        vertex_count: usize,
        usage: BufferUsage,
        backing: BufferBacking,
        staging: Option<Arc<StagingContext>>,
    ) -> BufferResult<Self> {
        let size = vertex_size
            .checked_mul(vertex_count)
            .ok_or(BufferError::InvalidShape {
                vertex_size,
                vertex_count,
            })?;
        if backing.len() != size {
            return Err(BufferError::SizeMismatch {
                expected: size,
                actual: backing.len(),
            });
        }
        Ok(Self {
            id: BufferId::next(),
            vertex_size,
            vertex_count,
            usage,
            kind: backing.kind(),
            backing: Mutex::new(backing),
            locked: AtomicBool::new(false),
            instance_data: AtomicBool::new(false),
            instance_step_rate: AtomicU32::new(1),
            staging,
        })
    }

    /// Identity.
    #[inline]
    #[must_use]
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Bytes per vertex.
    #[inline]
    #[must_use]
    pub fn vertex_size(&self) -> usize {
        self.vertex_size
    }

    /// Number of vertices.
    #[inline]
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    /// Total size in bytes.
    #[inline]
    #[must_use]
    pub fn size_in_bytes(&self) -> usize {
        self.vertex_size * self.vertex_count
    }

    /// Usage hint given at creation.
    #[inline]
    #[must_use]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    /// Backing variant.
    #[inline]
    #[must_use]
    pub fn backing_kind(&self) -> BackingKind {
        self.kind
    }

    /// Whether reads are served by a system-memory shadow.
    #[inline]
    #[must_use]
    pub fn has_shadow(&self) -> bool {
        self.kind == BackingKind::Shadowed
    }

    /// Whether a [`BufferLock`] is outstanding.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    /// Whether the buffer holds per-instance data.
    #[must_use]
    pub fn is_instance_data(&self) -> bool {
        self.instance_data.load(Ordering::Relaxed)
    }

    /// Marks the buffer as per-instance data.
    pub fn set_instance_data(&self, instance_data: bool) {
        self.instance_data.store(instance_data, Ordering::Relaxed);
    }

    /// Instances drawn per element of instance data.
    #[must_use]
    pub fn instance_step_rate(&self) -> u32 {
        self.instance_step_rate.load(Ordering::Relaxed)
    }

    /// Sets the instance step rate.
    ///
    /// # Panics
    ///
    /// Panics if `rate` is zero.
    pub fn set_instance_step_rate(&self, rate: u32) {
        assert!(rate > 0, "instance step rate must be positive");
        self.instance_step_rate.store(rate, Ordering::Relaxed);
    }

    /// Copies `dest.len()` bytes at `offset` into `dest`.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfRange`] if the range does not fit.
    pub fn read(&self, offset: usize, dest: &mut [u8]) -> BufferResult<()> {
        self.check_range(offset, dest.len())?;
        self.backing.lock().read(offset, dest);
        Ok(())
    }

    /// Writes `src` at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfRange`] if the range does not fit.
    pub fn write(&self, offset: usize, src: &[u8], discard_whole: bool) -> BufferResult<()> {
        self.check_range(offset, src.len())?;
        self.backing.lock().write(offset, src, discard_whole);
        Ok(())
    }

    /// Writes a slice of plain-old-data values at byte `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfRange`] if the bytes do not fit.
    pub fn write_typed<T: Pod>(&self, offset: usize, data: &[T]) -> BufferResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let whole = offset == 0 && bytes.len() == self.size_in_bytes();
        self.write(offset, bytes, whole)
    }

    /// Reads `count` plain-old-data values at byte `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfRange`] if the bytes do not fit.
    pub fn read_typed<T: Pod>(&self, offset: usize, count: usize) -> BufferResult<Vec<T>> {
        let mut out = vec![T::zeroed(); count];
        self.read(offset, bytemuck::cast_slice_mut(&mut out))?;
        Ok(out)
    }

    /// Copies `len` bytes from `src` at `src_offset` to `dst_offset`.
    ///
    /// The bytes pass through this buffer's staging, as for a lock.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfRange`] if either range does not fit.
    pub fn copy_from(
        &self,
        src: &HardwareBuffer,
        src_offset: usize,
        dst_offset: usize,
        len: usize,
        discard_whole: bool,
    ) -> BufferResult<()> {
        self.check_range(dst_offset, len)?;
        src.check_range(src_offset, len)?;
        let context = self.staging_context();
        let mut staged = Staging::acquire(self, len);
        staged.fill(context, &src.backing.lock(), src_offset);
        staged.write_to(context, &mut self.backing.lock(), dst_offset, discard_whole);
        staged.release(context);
        Ok(())
    }

    /// Copies the whole of `src`, discarding previous contents.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::SizeMismatch`] if the sizes differ.
    pub fn copy_all_from(&self, src: &HardwareBuffer) -> BufferResult<()> {
        if src.size_in_bytes() != self.size_in_bytes() {
            return Err(BufferError::SizeMismatch {
                expected: self.size_in_bytes(),
                actual: src.size_in_bytes(),
            });
        }
        self.copy_from(src, 0, 0, self.size_in_bytes(), true)
    }

    /// Locks `len` bytes at `offset`.
    ///
    /// Short ranges are staged in the scratch arena; the rest, and every
    /// scratch miss, in a pooled or heap block. Unless `option` is
    /// [`LockOption::Discard`] or [`LockOption::NoOverwrite`] the staged
    /// range starts with the buffer's bytes.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfRange`] if the range does not fit, or
    /// [`BufferError::AlreadyLocked`] if a lock is outstanding.
    pub fn lock(&self, offset: usize, len: usize, option: LockOption) -> BufferResult<BufferLock<'_>> {
        self.check_range(offset, len)?;
        if self
            .locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(BufferError::AlreadyLocked(self.id.get()));
        }
        Ok(BufferLock::begin(self, offset, len, option))
    }

    /// Locks the whole buffer.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::AlreadyLocked`] if a lock is outstanding.
    pub fn lock_all(&self, option: LockOption) -> BufferResult<BufferLock<'_>> {
        self.lock(0, self.size_in_bytes(), option)
    }

    pub(crate) fn staging(&self) -> Option<&Arc<StagingContext>> {
        self.staging.as_ref()
    }

    pub(crate) fn staging_context(&self) -> Option<&StagingContext> {
        self.staging.as_deref()
    }

    pub(crate) fn backing(&self) -> &Mutex<BufferBacking> {
        &self.backing
    }

    pub(crate) fn release_lock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    fn check_range(&self, offset: usize, len: usize) -> BufferResult<()> {
        let size = self.size_in_bytes();
        match offset.checked_add(len) {
            Some(end) if end <= size => Ok(()),
            _ => Err(BufferError::OutOfRange { offset, len, size }),
        }
    }
}

impl fmt::Debug for HardwareBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HardwareBuffer")
            .field("id", &self.id)
            .field("vertex_size", &self.vertex_size)
            .field("vertex_count", &self.vertex_count)
            .field("usage", &self.usage)
            .field("kind", &self.kind)
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}
