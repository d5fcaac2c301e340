//! # Buffer Factory
//!
//! The seam through which the lease manager creates copies. The graphics
//! binding layer provides its own factory over real device memory;
//! [`HostBufferFactory`] builds buffers over [`HostDeviceMemory`] for
//! headless runs and tests.

use std::sync::Arc;

use tessera_core::{MemoryRegistry, ScratchArena};

use crate::buffer::{
    BufferBacking, BufferUsage, HardwareBuffer, HostDeviceMemory, PooledBytes, SharedBuffer,
    StagingContext,
};
use crate::config::BufferConfig;
use crate::error::{BufferError, BufferResult};

/// Creates vertex buffers.
pub trait BufferFactory: Send + Sync {
    /// Creates a buffer of `vertex_count` vertices of `vertex_size` bytes.
    /// With `shadowed` reads are served by a system-memory mirror.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::InvalidShape`] if the size overflows, or
    /// [`BufferError::OutOfMemory`] if backing memory is unavailable.
    fn create_vertex_buffer(
        &self,
        vertex_size: usize,
        vertex_count: usize,
        usage: BufferUsage,
        shadowed: bool,
    ) -> BufferResult<SharedBuffer>;
}

/// Factory over in-process memory.
#[derive(Debug, Clone)]
pub struct HostBufferFactory {
    registry: Arc<MemoryRegistry>,
    staging: Option<Arc<StagingContext>>,
    software_only: bool,
}

impl HostBufferFactory {
    /// Device-backed buffers without lock staging context; locks stage on
    /// the heap.
    #[must_use]
    pub fn new(registry: Arc<MemoryRegistry>) -> Self {
        Self {
            registry,
            staging: None,
            software_only: false,
        }
    }

    /// Device-backed buffers whose short locks stage through `arena`.
    #[must_use]
    pub fn with_scratch(
        registry: Arc<MemoryRegistry>,
        arena: Arc<ScratchArena>,
        config: &BufferConfig,
    ) -> Self {
        let staging = StagingContext {
            arena,
            registry: Arc::clone(&registry),
            map_threshold: config.map_buffer_threshold,
        };
        Self {
            registry,
            staging: Some(Arc::new(staging)),
            software_only: false,
        }
    }

    /// Buffers held entirely in registry memory. `shadowed` is ignored.
    #[must_use]
    pub fn software_only(mut self) -> Self {
        self.software_only = true;
        self
    }

    /// Registry system-memory bytes come from.
    #[must_use]
    pub fn registry(&self) -> &Arc<MemoryRegistry> {
        &self.registry
    }

    fn system_bytes(&self, size: usize) -> BufferResult<PooledBytes> {
        PooledBytes::zeroed(&self.registry, size)
            .ok_or(BufferError::OutOfMemory { requested: size })
    }
}

impl BufferFactory for HostBufferFactory {
    fn create_vertex_buffer(
        &self,
        vertex_size: usize,
        vertex_count: usize,
        usage: BufferUsage,
        shadowed: bool,
    ) -> BufferResult<SharedBuffer> {
        let size = vertex_size
            .checked_mul(vertex_count)
            .ok_or(BufferError::InvalidShape {
                vertex_size,
                vertex_count,
            })?;

        let backing = if self.software_only {
            BufferBacking::Software(self.system_bytes(size)?)
        } else if shadowed {
            BufferBacking::Shadowed {
                device: Box::new(HostDeviceMemory::new(size)),
                shadow: self.system_bytes(size)?,
            }
        } else {
            BufferBacking::Device(Box::new(HostDeviceMemory::new(size)))
        };

        let buffer = HardwareBuffer::new(
            vertex_size,
            vertex_count,
            usage,
            backing,
            self.staging.clone(),
        )?;
        Ok(Arc::new(buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BackingKind;
    use tessera_core::{MemoryCategory, MemoryConfig};

    fn registry() -> Arc<MemoryRegistry> {
        Arc::new(MemoryRegistry::new(MemoryConfig::default()))
    }

    #[test]
    fn test_backing_selection() {
        let factory = HostBufferFactory::new(registry());
        let device = factory
            .create_vertex_buffer(12, 10, BufferUsage::STATIC, false)
            .unwrap();
        assert_eq!(device.backing_kind(), BackingKind::Device);
        assert_eq!(device.size_in_bytes(), 120);

        let shadowed = factory
            .create_vertex_buffer(12, 10, BufferUsage::DYNAMIC, true)
            .unwrap();
        assert_eq!(shadowed.backing_kind(), BackingKind::Shadowed);

        let software = factory
            .software_only()
            .create_vertex_buffer(12, 10, BufferUsage::DYNAMIC, true)
            .unwrap();
        assert_eq!(software.backing_kind(), BackingKind::Software);
    }

    #[test]
    fn test_shadow_memory_comes_from_registry() {
        let registry = registry();
        let factory = HostBufferFactory::new(Arc::clone(&registry));
        let buffer = factory
            .create_vertex_buffer(4, 64, BufferUsage::DYNAMIC, true)
            .unwrap();
        assert_eq!(registry.stats().live_bytes_in(MemoryCategory::Geometry), 256);
        drop(buffer);
        assert_eq!(registry.stats().total_live_blocks(), 0);
    }

    #[test]
    fn test_exhausted_registry() {
        let registry = Arc::new(MemoryRegistry::new(MemoryConfig::default().with_budget(64)));
        let factory = HostBufferFactory::new(registry).software_only();
        let err = factory
            .create_vertex_buffer(4, 1024, BufferUsage::STATIC, false)
            .unwrap_err();
        assert_eq!(err, BufferError::OutOfMemory { requested: 4096 });
    }

    #[test]
    fn test_overflowing_shape() {
        let factory = HostBufferFactory::new(registry());
        let err = factory
            .create_vertex_buffer(usize::MAX, 2, BufferUsage::STATIC, false)
            .unwrap_err();
        assert!(matches!(err, BufferError::InvalidShape { .. }));
    }
}
