//! # Buffer Backing
//!
//! Where a buffer's bytes live:
//!
//! | variant    | reads from | writes to        |
//! |------------|------------|------------------|
//! | `Software` | pool block | pool block       |
//! | `Device`   | device     | device           |
//! | `Shadowed` | shadow     | shadow + device  |
//!
//! System-memory bytes come from the [`MemoryRegistry`] under the geometry
//! category and go back to it on drop.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tessera_core::{MemoryCategory, MemoryRegistry, PoolBlock};

use super::device::DeviceMemory;

/// Geometry bytes borrowed from a registry.
pub struct PooledBytes {
    block: Option<PoolBlock>,
    registry: Arc<MemoryRegistry>,
}

impl PooledBytes {
    /// Allocates `len` bytes. `None` if the registry is exhausted.
    #[must_use]
    pub fn allocate(registry: &Arc<MemoryRegistry>, len: usize) -> Option<Self> {
        let block = registry.allocate(MemoryCategory::Geometry, len)?;
        Some(Self {
            block: Some(block),
            registry: Arc::clone(registry),
        })
    }

    /// Allocates `len` zeroed bytes.
    #[must_use]
    pub fn zeroed(registry: &Arc<MemoryRegistry>, len: usize) -> Option<Self> {
        let mut bytes = Self::allocate(registry, len)?;
        bytes.fill(0);
        Some(bytes)
    }
}

impl Deref for PooledBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.block.as_deref().unwrap_or_default()
    }
}

impl DerefMut for PooledBytes {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.block.as_deref_mut().unwrap_or_default()
    }
}

impl Drop for PooledBytes {
    fn drop(&mut self) {
        if let Some(block) = self.block.take() {
            self.registry.deallocate(MemoryCategory::Geometry, block);
        }
    }
}

impl fmt::Debug for PooledBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBytes").field("len", &self.len()).finish()
    }
}

/// Discriminant of a [`BufferBacking`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackingKind {
    /// System memory only.
    Software,
    /// Device memory only.
    Device,
    /// Device memory mirrored by a system-memory shadow.
    Shadowed,
}

/// Storage behind a hardware buffer.
pub enum BufferBacking {
    /// System memory only.
    Software(PooledBytes),
    /// Device memory only.
    Device(Box<dyn DeviceMemory>),
    /// Device memory with a system-memory shadow serving reads.
    Shadowed {
        /// Device allocation.
        device: Box<dyn DeviceMemory>,
        /// System-memory mirror.
        shadow: PooledBytes,
    },
}

impl BufferBacking {
    /// Which variant this is.
    #[must_use]
    pub fn kind(&self) -> BackingKind {
        match self {
            Self::Software(_) => BackingKind::Software,
            Self::Device(_) => BackingKind::Device,
            Self::Shadowed { .. } => BackingKind::Shadowed,
        }
    }

    /// Size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Software(bytes) => bytes.len(),
            Self::Device(device) | Self::Shadowed { device, .. } => device.len(),
        }
    }

    /// Whether the backing holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies bytes at `offset` into `dest`. The range must be in bounds.
    pub fn read(&self, offset: usize, dest: &mut [u8]) {
        match self {
            Self::Software(bytes) | Self::Shadowed { shadow: bytes, .. } => {
                dest.copy_from_slice(&bytes[offset..offset + dest.len()]);
            }
            Self::Device(device) => device.read(offset, dest),
        }
    }

    /// Writes `src` at `offset`. The range must be in bounds.
    pub fn write(&mut self, offset: usize, src: &[u8], discard_whole: bool) {
        match self {
            Self::Software(bytes) => bytes[offset..offset + src.len()].copy_from_slice(src),
            Self::Device(device) => device.write(offset, src, discard_whole),
            Self::Shadowed { device, shadow } => {
                shadow[offset..offset + src.len()].copy_from_slice(src);
                device.write(offset, src, discard_whole);
            }
        }
    }
}

impl fmt::Debug for BufferBacking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferBacking")
            .field("kind", &self.kind())
            .field("len", &self.len())
            .finish()
    }
}
