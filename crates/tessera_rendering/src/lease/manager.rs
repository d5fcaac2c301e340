//! # Lease Manager
//!
//! Hands out temporary copies of vertex buffers and takes them back.
//!
//! ```text
//!            lease()                       release() / expiry
//!  free[source] ──pop──► licenses[copy] ─────────────────────► free[source]
//!       │ empty                                                    │
//!       └──► factory.create_vertex_buffer()        reclaim_unused()└──► dropped
//! ```
//!
//! ## Locks
//!
//! `buffers` (structural) is always taken before `temp` (temporary pool).
//! Licensees are notified after both are released.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::license::{BufferLicense, BufferLicensee, Expiry, LicenseInfo, LicenseType};
use crate::buffer::{BufferId, BufferUsage, HardwareBuffer, SharedBuffer};
use crate::config::LeaseConfig;
use crate::error::{BufferError, BufferResult};
use crate::factory::BufferFactory;

/// Counter snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LeaseStats {
    /// Copies currently leased.
    pub leased: usize,
    /// Copies waiting in the free pool.
    pub free: usize,
    /// Consecutive under-used frames counted so far.
    pub under_used_frames: u32,
    /// Copies created through the factory.
    pub created: u64,
    /// Leases served from the free pool.
    pub reused: u64,
    /// Licenses ended by release, expiry or eviction.
    pub expired: u64,
    /// Free copies dropped by reclamation or eviction.
    pub reclaimed: u64,
}

/// What one [`LeaseManager::tick`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Automatic licenses that reached zero.
    pub expired: usize,
    /// Whether a reclamation pass ran.
    pub reclaim_ran: bool,
    /// Free copies dropped by that pass.
    pub reclaimed: usize,
}

#[derive(Default)]
struct TempPool {
    free: HashMap<BufferId, Vec<SharedBuffer>>,
    licenses: HashMap<BufferId, BufferLicense>,
    under_used_frames: u32,
    created: u64,
    reused: u64,
    expired: u64,
    reclaimed: u64,
}

impl TempPool {
    fn free_count(&self) -> usize {
        self.free.values().map(Vec::len).sum()
    }

    fn push_free(&mut self, source: BufferId, copy: SharedBuffer) {
        self.free.entry(source).or_default().push(copy);
    }

    /// Whether `copy` is leased or waiting in a free pool.
    fn contains(&self, copy: BufferId) -> bool {
        self.licenses.contains_key(&copy)
            || self
                .free
                .values()
                .any(|copies| copies.iter().any(|c| c.id() == copy))
    }

    fn pop_free(&mut self, source: BufferId) -> Option<SharedBuffer> {
        let copies = self.free.get_mut(&source)?;
        let copy = copies.pop();
        if copies.is_empty() {
            self.free.remove(&source);
        }
        copy
    }

    /// Ends the license on `copy`, returning the copy to the free pool.
    fn end_license(&mut self, copy: BufferId) -> Option<Expiry> {
        let license = self.licenses.remove(&copy)?;
        let expiry = Expiry::of(&license);
        self.push_free(license.original, license.copy);
        self.expired += 1;
        Some(expiry)
    }

    /// Drops free copies nothing outside the pool refers to.
    fn reclaim(&mut self) -> Vec<BufferId> {
        let mut dropped = Vec::new();
        self.free.retain(|_, copies| {
            copies.retain(|copy| {
                let unused = Arc::strong_count(copy) == 1;
                if unused {
                    dropped.push(copy.id());
                }
                !unused
            });
            !copies.is_empty()
        });
        self.reclaimed += dropped.len() as u64;
        dropped
    }

    /// Ends every license of `source` and discards its free copies.
    fn evict(&mut self, source: BufferId) -> (Vec<Expiry>, Vec<BufferId>) {
        let mut expired = Vec::new();
        self.licenses.retain(|_, license| {
            if license.original != source {
                return true;
            }
            expired.push(Expiry::of(license));
            false
        });
        self.expired += expired.len() as u64;

        let discarded: Vec<BufferId> = self
            .free
            .remove(&source)
            .unwrap_or_default()
            .iter()
            .map(|copy| copy.id())
            .collect();
        self.reclaimed += discarded.len() as u64;
        (expired, discarded)
    }
}

/// Temporary buffer copies leased under manual or automatic licenses.
///
/// # Example
///
/// ```rust,ignore
/// let manager = LeaseManager::new(Arc::new(factory), &LeaseConfig::default());
/// let source = manager.create_vertex_buffer(32, 1024, BufferUsage::STATIC_WRITE_ONLY, false)?;
/// let copy = manager.lease(&source, LicenseType::Automatic, licensee, true)?;
/// // ... once per frame:
/// manager.tick(false);
/// ```
pub struct LeaseManager {
    factory: Arc<dyn BufferFactory>,
    config: LeaseConfig,
    /// Structural lock: every buffer this manager created.
    buffers: Mutex<HashMap<BufferId, Weak<HardwareBuffer>>>,
    /// Temporary-pool lock.
    temp: Mutex<TempPool>,
}

impl LeaseManager {
    /// Creates a manager with empty pools.
    #[must_use]
    pub fn new(factory: Arc<dyn BufferFactory>, config: &LeaseConfig) -> Self {
        Self {
            factory,
            config: config.clone(),
            buffers: Mutex::new(HashMap::new()),
            temp: Mutex::new(TempPool::default()),
        }
    }

    /// Settings in effect.
    #[must_use]
    pub fn config(&self) -> &LeaseConfig {
        &self.config
    }

    /// Creates a buffer through the factory and tracks it.
    ///
    /// # Errors
    ///
    /// Returns the factory's error.
    pub fn create_vertex_buffer(
        &self,
        vertex_size: usize,
        vertex_count: usize,
        usage: BufferUsage,
        shadowed: bool,
    ) -> BufferResult<SharedBuffer> {
        let mut buffers = self.buffers.lock();
        let buffer = self
            .factory
            .create_vertex_buffer(vertex_size, vertex_count, usage, shadowed)?;
        buffers.insert(buffer.id(), Arc::downgrade(&buffer));
        Ok(buffer)
    }

    /// Number of tracked buffers still alive, copies included.
    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.buffers
            .lock()
            .values()
            .filter(|buffer| buffer.strong_count() > 0)
            .count()
    }

    /// Adds `copy` to the free pool of `source`.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::SizeMismatch`] if `copy` does not have the
    /// size of `source`, or [`BufferError::CopyInUse`] if `copy` is leased,
    /// already spare, or is `source` itself.
    pub fn register_existing_copy(
        &self,
        source: &SharedBuffer,
        copy: SharedBuffer,
    ) -> BufferResult<()> {
        if copy.size_in_bytes() != source.size_in_bytes() {
            return Err(BufferError::SizeMismatch {
                expected: source.size_in_bytes(),
                actual: copy.size_in_bytes(),
            });
        }
        let mut temp = self.temp.lock();
        if copy.id() == source.id() || temp.contains(copy.id()) {
            return Err(BufferError::CopyInUse(copy.id().get()));
        }
        tracing::debug!("Registered {} as a spare copy of {}", copy.id(), source.id());
        temp.push_free(source.id(), copy);
        Ok(())
    }

    /// Checks out a copy of `source`.
    ///
    /// A spare copy of `source` is reused if one exists, otherwise a new
    /// discardable, shadowed copy is created. With `copy_data` the whole of
    /// `source` is copied in; without it the contents are unspecified.
    /// Automatic licenses start with `expired_delay_frames` frames.
    ///
    /// # Errors
    ///
    /// Returns the factory's error, or the copy error if a new copy cannot
    /// take the source's contents. A spare that fails to copy is discarded
    /// and replaced by a new copy.
    pub fn lease(
        &self,
        source: &SharedBuffer,
        license_type: LicenseType,
        licensee: Arc<dyn BufferLicensee>,
        copy_data: bool,
    ) -> BufferResult<SharedBuffer> {
        let mut buffers = self.buffers.lock();
        let mut temp = self.temp.lock();

        let mut spare = temp.pop_free(source.id());
        if copy_data {
            if let Some(copy) = spare.take() {
                match copy.copy_all_from(source) {
                    Ok(()) => spare = Some(copy),
                    Err(err) => {
                        tracing::warn!("Discarding spare {} of {}: {}", copy.id(), source.id(), err);
                        buffers.remove(&copy.id());
                        temp.reclaimed += 1;
                    }
                }
            }
        }

        let copy = match spare {
            Some(copy) => {
                temp.reused += 1;
                tracing::debug!("Reusing {} as a copy of {}", copy.id(), source.id());
                copy
            }
            None => {
                let copy = self.factory.create_vertex_buffer(
                    source.vertex_size(),
                    source.vertex_count(),
                    BufferUsage::DYNAMIC_WRITE_ONLY_DISCARDABLE,
                    true,
                )?;
                if copy_data {
                    copy.copy_all_from(source)?;
                }
                buffers.insert(copy.id(), Arc::downgrade(&copy));
                temp.created += 1;
                tracing::debug!("Created {} as a copy of {}", copy.id(), source.id());
                copy
            }
        };

        temp.licenses.insert(
            copy.id(),
            BufferLicense {
                original: source.id(),
                license_type,
                expired_delay: self.config.expired_delay_frames,
                copy: Arc::clone(&copy),
                licensee,
            },
        );
        Ok(copy)
    }

    /// Ends the license on `copy` and returns it to the free pool. The
    /// licensee is notified. Unknown or already released copies are ignored.
    pub fn release(&self, copy: &SharedBuffer) {
        let expiry = self.temp.lock().end_license(copy.id());
        if let Some(expiry) = expiry {
            tracing::debug!("Released {}", copy.id());
            expiry.notify();
        }
    }

    /// Restarts the countdown of an automatic license. Unknown copies are
    /// ignored.
    ///
    /// # Panics
    ///
    /// Panics if `copy` is leased under a manual license.
    pub fn touch(&self, copy: &SharedBuffer) {
        let mut temp = self.temp.lock();
        if let Some(license) = temp.licenses.get_mut(&copy.id()) {
            assert!(
                license.license_type == LicenseType::Automatic,
                "touch on {} which is under a manual license",
                copy.id()
            );
            license.expired_delay = self.config.expired_delay_frames;
        }
    }

    /// Drops free copies nothing outside the pool refers to. Returns how
    /// many were dropped.
    pub fn reclaim_unused(&self) -> usize {
        let dropped = self.temp.lock().reclaim();
        self.forget(&dropped);
        dropped.len()
    }

    /// Advances one frame.
    ///
    /// Automatic licenses count down and expire at zero. Then, with
    /// `force_reclaim`, unused copies are reclaimed at once. Otherwise a
    /// frame where fewer copies are leased than free counts as under-used;
    /// after `under_used_frame_threshold` such frames in a row unused copies
    /// are reclaimed. Any other frame resets the count.
    ///
    /// Licensees of expired copies are notified before reclamation, so a
    /// copy that expires this frame can be reclaimed in the same frame.
    ///
    /// Must be called from one thread.
    pub fn tick(&self, force_reclaim: bool) -> TickReport {
        let mut report = TickReport::default();
        let (used, unused, expired) = {
            let mut temp = self.temp.lock();
            let unused = temp.free_count();
            let used = temp.licenses.len();

            let due: Vec<BufferId> = temp
                .licenses
                .iter_mut()
                .filter(|(_, license)| license.license_type == LicenseType::Automatic)
                .filter_map(|(id, license)| {
                    license.expired_delay = license.expired_delay.saturating_sub(1);
                    (license.expired_delay == 0).then_some(*id)
                })
                .collect();
            let expired: Vec<Expiry> = due
                .into_iter()
                .filter_map(|id| temp.end_license(id))
                .collect();
            (used, unused, expired)
        };
        report.expired = expired.len();
        for expiry in expired {
            expiry.notify();
        }

        let mut temp = self.temp.lock();
        let mut dropped = Vec::new();
        if force_reclaim {
            dropped = temp.reclaim();
            temp.under_used_frames = 0;
            report.reclaim_ran = true;
        } else if used < unused {
            temp.under_used_frames += 1;
            if temp.under_used_frames >= self.config.under_used_frame_threshold {
                dropped = temp.reclaim();
                temp.under_used_frames = 0;
                report.reclaim_ran = true;
            }
        } else {
            temp.under_used_frames = 0;
        }
        drop(temp);

        report.reclaimed = dropped.len();
        if report.expired > 0 || report.reclaim_ran {
            tracing::debug!(
                "Lease tick: {} expired, reclaim {} ({} copies dropped)",
                report.expired,
                if report.reclaim_ran { "ran" } else { "skipped" },
                report.reclaimed
            );
        }
        self.forget(&dropped);
        report
    }

    /// Ends every license on copies of `source` and discards its spare
    /// copies. Used when `source` is about to be destroyed.
    pub fn force_evict(&self, source: BufferId) {
        let mut buffers = self.buffers.lock();
        let (expired, discarded) = self.temp.lock().evict(source);
        for id in &discarded {
            buffers.remove(id);
        }
        drop(buffers);

        tracing::debug!(
            "Evicted copies of {}: {} licenses ended, {} spares discarded",
            source,
            expired.len(),
            discarded.len()
        );
        for expiry in expired {
            expiry.notify();
        }
    }

    /// Stops tracking `buffer` and evicts its copies. Buffers this manager
    /// did not create are ignored.
    pub fn notify_buffer_destroyed(&self, buffer: BufferId) {
        let mut buffers = self.buffers.lock();
        if buffers.remove(&buffer).is_none() {
            return;
        }
        let (expired, discarded) = self.temp.lock().evict(buffer);
        for id in &discarded {
            buffers.remove(id);
        }
        drop(buffers);

        for expiry in expired {
            expiry.notify();
        }
    }

    /// License on `copy`, if leased.
    #[must_use]
    pub fn license(&self, copy: BufferId) -> Option<LicenseInfo> {
        self.temp.lock().licenses.get(&copy).map(BufferLicense::info)
    }

    /// Spare copies of `source` in the free pool.
    #[must_use]
    pub fn free_copies(&self, source: BufferId) -> usize {
        self.temp.lock().free.get(&source).map_or(0, Vec::len)
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> LeaseStats {
        let temp = self.temp.lock();
        LeaseStats {
            leased: temp.licenses.len(),
            free: temp.free_count(),
            under_used_frames: temp.under_used_frames,
            created: temp.created,
            reused: temp.reused,
            expired: temp.expired,
            reclaimed: temp.reclaimed,
        }
    }

    fn forget(&self, dropped: &[BufferId]) {
        if dropped.is_empty() {
            return;
        }
        let mut buffers = self.buffers.lock();
        for id in dropped {
            buffers.remove(id);
        }
    }
}

impl std::fmt::Debug for LeaseManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseManager")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::HostBufferFactory;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tessera_core::{MemoryConfig, MemoryRegistry};

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl BufferLicensee for Counter {
        fn license_expired(&self, _copy: &SharedBuffer) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn manager(config: LeaseConfig) -> LeaseManager {
        let registry = Arc::new(MemoryRegistry::new(MemoryConfig::default()));
        LeaseManager::new(Arc::new(HostBufferFactory::new(registry)), &config)
    }

    #[test]
    fn test_lease_creates_discardable_shadowed_copy() {
        let manager = manager(LeaseConfig::default());
        let source = manager
            .create_vertex_buffer(8, 16, BufferUsage::STATIC_WRITE_ONLY, false)
            .unwrap();
        let licensee = Arc::new(Counter::default());
        let copy = manager
            .lease(&source, LicenseType::Manual, licensee, false)
            .unwrap();
        assert_ne!(copy.id(), source.id());
        assert_eq!(copy.usage(), BufferUsage::DYNAMIC_WRITE_ONLY_DISCARDABLE);
        assert!(copy.has_shadow());
        assert_eq!(copy.size_in_bytes(), source.size_in_bytes());
        assert_eq!(manager.live_buffers(), 2);
        assert_eq!(manager.stats().created, 1);
    }

    #[test]
    fn test_copy_data_synchronizes_contents() {
        let manager = manager(LeaseConfig::default());
        let source = manager
            .create_vertex_buffer(4, 4, BufferUsage::STATIC, false)
            .unwrap();
        source.write(0, &[42; 16], true).unwrap();
        let copy = manager
            .lease(&source, LicenseType::Manual, Arc::new(Counter::default()), true)
            .unwrap();
        let mut out = [0u8; 16];
        copy.read(0, &mut out).unwrap();
        assert_eq!(out, [42; 16]);
    }

    #[test]
    fn test_double_release_is_noop() {
        let manager = manager(LeaseConfig::default());
        let source = manager
            .create_vertex_buffer(4, 4, BufferUsage::STATIC, false)
            .unwrap();
        let licensee = Arc::new(Counter::default());
        let copy = manager
            .lease(&source, LicenseType::Manual, licensee.clone(), false)
            .unwrap();
        manager.release(&copy);
        manager.release(&copy);
        assert_eq!(licensee.0.load(Ordering::SeqCst), 1);
        assert_eq!(manager.free_copies(source.id()), 1);
    }

    #[test]
    fn test_touch_restarts_countdown() {
        let manager = manager(LeaseConfig {
            expired_delay_frames: 3,
            ..LeaseConfig::default()
        });
        let source = manager
            .create_vertex_buffer(4, 4, BufferUsage::STATIC, false)
            .unwrap();
        let licensee = Arc::new(Counter::default());
        let copy = manager
            .lease(&source, LicenseType::Automatic, licensee.clone(), false)
            .unwrap();

        manager.tick(false);
        manager.tick(false);
        assert_eq!(manager.license(copy.id()).unwrap().remaining_frames, 1);
        manager.touch(&copy);
        assert_eq!(manager.license(copy.id()).unwrap().remaining_frames, 3);
        manager.tick(false);
        manager.tick(false);
        assert!(manager.license(copy.id()).is_some());
        assert_eq!(licensee.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    #[should_panic(expected = "manual license")]
    fn test_touch_manual_panics() {
        let manager = manager(LeaseConfig::default());
        let source = manager
            .create_vertex_buffer(4, 4, BufferUsage::STATIC, false)
            .unwrap();
        let copy = manager
            .lease(&source, LicenseType::Manual, Arc::new(Counter::default()), false)
            .unwrap();
        manager.touch(&copy);
    }

    #[test]
    fn test_manual_license_never_expires() {
        let manager = manager(LeaseConfig {
            expired_delay_frames: 1,
            ..LeaseConfig::default()
        });
        let source = manager
            .create_vertex_buffer(4, 4, BufferUsage::STATIC, false)
            .unwrap();
        let copy = manager
            .lease(&source, LicenseType::Manual, Arc::new(Counter::default()), false)
            .unwrap();
        for _ in 0..10 {
            manager.tick(false);
        }
        assert!(manager.license(copy.id()).is_some());
    }

    #[test]
    fn test_reclaim_keeps_referenced_copies() {
        let manager = manager(LeaseConfig::default());
        let source = manager
            .create_vertex_buffer(4, 4, BufferUsage::STATIC, false)
            .unwrap();
        let licensee: Arc<dyn BufferLicensee> = Arc::new(Counter::default());
        let held = manager
            .lease(&source, LicenseType::Manual, Arc::clone(&licensee), false)
            .unwrap();
        let dropped = manager
            .lease(&source, LicenseType::Manual, licensee, false)
            .unwrap();
        manager.release(&held);
        manager.release(&dropped);
        let dropped_id = dropped.id();
        drop(dropped);

        assert_eq!(manager.reclaim_unused(), 1);
        assert_eq!(manager.free_copies(source.id()), 1);
        assert_eq!(manager.live_buffers(), 2);
        assert!(manager.license(dropped_id).is_none());
    }

    #[test]
    fn test_notify_buffer_destroyed_evicts() {
        let manager = manager(LeaseConfig::default());
        let source = manager
            .create_vertex_buffer(4, 4, BufferUsage::STATIC, false)
            .unwrap();
        let licensee = Arc::new(Counter::default());
        let copy = manager
            .lease(&source, LicenseType::Automatic, licensee.clone(), false)
            .unwrap();

        manager.notify_buffer_destroyed(source.id());
        assert_eq!(licensee.0.load(Ordering::SeqCst), 1);
        assert!(manager.license(copy.id()).is_none());
        assert_eq!(manager.free_copies(source.id()), 0);

        // Second notification is ignored.
        manager.notify_buffer_destroyed(source.id());
        assert_eq!(licensee.0.load(Ordering::SeqCst), 1);
    }
}
