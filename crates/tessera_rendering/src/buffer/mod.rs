//! # Hardware Buffers
//!
//! Vertex buffers over a closed set of backings, with lock/unlock staging
//! through the scratch arena.

mod backing;
mod device;
mod hardware;
mod lock;
mod usage;

pub use backing::{BackingKind, BufferBacking, PooledBytes};
pub use device::{DeviceMemory, HostDeviceMemory};
pub use hardware::{BufferId, HardwareBuffer, SharedBuffer, StagingContext};
pub use lock::{BufferLock, StagingKind};
pub use usage::{BufferUsage, LockOption};
