//! # TESSERA Rendering
//!
//! Hardware buffers and the temporary copies leased out of them:
//! - [`HardwareBuffer`] over software, device and shadowed backings
//! - Lock/unlock staging through the scratch arena
//! - [`LeaseManager`] handing out copies under manual or automatic licenses
//!
//! ## Architecture Rules
//!
//! 1. **Lock order** - Structural lock before temporary-pool lock, always
//! 2. **No callbacks under locks** - Licensees are told after locks are released
//! 3. **One ticker** - `LeaseManager::tick` runs once per frame on one thread
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tessera_rendering::{BufferUsage, HostBufferFactory, LeaseConfig, LeaseManager, LicenseType};
//!
//! let factory = Arc::new(HostBufferFactory::new(registry));
//! let manager = LeaseManager::new(factory, &LeaseConfig::default());
//! let source = manager.create_vertex_buffer(32, 1024, BufferUsage::STATIC_WRITE_ONLY, false)?;
//! let copy = manager.lease(&source, LicenseType::Automatic, licensee, true)?;
//! manager.tick(false);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod buffer;
pub mod config;
pub mod error;
pub mod factory;
pub mod lease;

pub use buffer::{
    BackingKind, BufferBacking, BufferId, BufferLock, BufferUsage, DeviceMemory, HardwareBuffer,
    HostDeviceMemory, LockOption, PooledBytes, SharedBuffer, StagingContext, StagingKind,
};
pub use config::{BufferConfig, LeaseConfig, RenderingConfig};
pub use error::{BufferError, BufferResult};
pub use factory::{BufferFactory, HostBufferFactory};
pub use lease::{BufferLicensee, LeaseManager, LeaseStats, LicenseInfo, LicenseType, TickReport};
