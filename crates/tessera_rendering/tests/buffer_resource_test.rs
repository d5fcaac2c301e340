//! A buffer-owning resource driven through the loading state machine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use tessera_core::{MemoryConfig, MemoryRegistry, ScratchArena, ScratchConfig};
use tessera_rendering::{
    BufferConfig, BufferLicensee, BufferUsage, HostBufferFactory, LeaseConfig, LeaseManager,
    LicenseType, LockOption, SharedBuffer, StagingKind,
};
use tessera_resource::{
    Loadable, LoadingState, Resource, ResourceConfig, ResourceHandle, ResourceManager,
    ResourceResult,
};

/// Vertex data staged on prepare and uploaded to a buffer on load.
struct Mesh {
    manager: Arc<LeaseManager>,
    vertices: usize,
    staged: Vec<u8>,
    buffer: Option<SharedBuffer>,
    loads: Arc<AtomicUsize>,
}

impl Mesh {
    fn new(manager: &Arc<LeaseManager>, vertices: usize) -> Self {
        Self {
            manager: Arc::clone(manager),
            vertices,
            staged: Vec::new(),
            buffer: None,
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Loadable for Mesh {
    fn prepare(&mut self) -> ResourceResult<()> {
        self.staged = (0..self.vertices * 4).map(|i| (i % 251) as u8).collect();
        Ok(())
    }

    fn unprepare(&mut self) {
        self.staged.clear();
    }

    fn load(&mut self) -> ResourceResult<()> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let buffer = self
            .manager
            .create_vertex_buffer(4, self.vertices, BufferUsage::STATIC_WRITE_ONLY, true)
            .map_err(|e| tessera_resource::ResourceError::payload(e.to_string()))?;
        {
            let mut lock = buffer
                .lock_all(LockOption::Discard)
                .map_err(|e| tessera_resource::ResourceError::payload(e.to_string()))?;
            let staged = &self.staged;
            lock.with_bytes_mut(|bytes| bytes.copy_from_slice(staged));
        }
        self.buffer = Some(buffer);
        Ok(())
    }

    fn unload(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.manager.notify_buffer_destroyed(buffer.id());
        }
        self.staged.clear();
    }

    fn content_size(&self) -> usize {
        self.buffer.as_ref().map_or(0, |b| b.size_in_bytes())
    }
}

struct Silent;

impl BufferLicensee for Silent {
    fn license_expired(&self, _copy: &SharedBuffer) {}
}

fn lease_manager(scratch: usize) -> Arc<LeaseManager> {
    let registry = Arc::new(MemoryRegistry::new(MemoryConfig::default()));
    let arena = ScratchArena::new(Arc::clone(&registry), &ScratchConfig::with_capacity(scratch))
        .unwrap();
    let factory = HostBufferFactory::with_scratch(registry, Arc::new(arena), &BufferConfig::default());
    Arc::new(LeaseManager::new(Arc::new(factory), &LeaseConfig::default()))
}

#[test]
fn test_mesh_load_uploads_and_reports_size() {
    let leases = lease_manager(64 * 1024);
    let mesh = Resource::new(ResourceHandle(1), "quad", "General", Mesh::new(&leases, 128));
    mesh.load().unwrap();
    assert_eq!(mesh.state(), LoadingState::Loaded);
    assert_eq!(mesh.size(), 512);

    let buffer = mesh.with_content(|m| m.buffer.clone()).unwrap();
    let lock = buffer.lock(0, 64, LockOption::ReadOnly).unwrap();
    assert_eq!(lock.staging_kind(), StagingKind::Scratch);
    lock.with_bytes(|bytes| assert_eq!(bytes[10], 10));
}

#[test]
fn test_unload_evicts_leased_copies() {
    let leases = lease_manager(64 * 1024);
    let mesh = Resource::new(ResourceHandle(1), "quad", "General", Mesh::new(&leases, 16));
    mesh.load().unwrap();

    let buffer = mesh.with_content(|m| m.buffer.clone()).unwrap();
    let copy = leases
        .lease(&buffer, LicenseType::Manual, Arc::new(Silent), true)
        .unwrap();
    let mut out = [0u8; 8];
    copy.read(0, &mut out).unwrap();
    assert_eq!(out, [0, 1, 2, 3, 4, 5, 6, 7]);

    mesh.unload();
    assert!(leases.license(copy.id()).is_none());
    assert_eq!(leases.free_copies(buffer.id()), 0);
}

#[test]
fn test_concurrent_mesh_loads_create_one_buffer() {
    let leases = lease_manager(64 * 1024);
    let payload = Mesh::new(&leases, 64);
    let loads = Arc::clone(&payload.loads);
    let mesh = Arc::new(Resource::new(ResourceHandle(1), "quad", "General", payload));
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let mesh = Arc::clone(&mesh);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                mesh.load()
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(leases.live_buffers(), 1);
}

#[test]
fn test_manager_budget_unloads_oldest_mesh() {
    let leases = lease_manager(64 * 1024);
    let manager = ResourceManager::new(&ResourceConfig::default().with_budget(1024));
    manager.create("a", Mesh::new(&leases, 128)).unwrap();
    manager.create("b", Mesh::new(&leases, 128)).unwrap();
    manager.create("c", Mesh::new(&leases, 128)).unwrap();

    manager.load("a").unwrap();
    manager.load("b").unwrap();
    manager.load("c").unwrap();

    assert_eq!(manager.get("a").unwrap().state(), LoadingState::Unloaded);
    assert!(manager.get("b").unwrap().is_loaded());
    assert!(manager.get("c").unwrap().is_loaded());
    assert_eq!(manager.memory_usage(), 1024);
    assert_eq!(leases.live_buffers(), 2);
}
