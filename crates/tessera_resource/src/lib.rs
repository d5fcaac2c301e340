//! # TESSERA Resource
//!
//! Lifecycle control for loadable assets:
//! - A six-state loading machine guarded by one mutex and condvar
//! - [`Resource`] wrapping a [`Loadable`] payload and its listeners
//! - [`ResourceManager`] keeping loaded resources within a memory budget
//!
//! ## Concurrency Rules
//!
//! 1. **One winner** - Exactly one thread runs a transition's hooks
//! 2. **Losers wait** - A thread that loses a race waits for the winner and never redoes the work
//! 3. **No cancellation** - A won transition runs to completion
//!
//! ## Example
//!
//! ```rust,ignore
//! use tessera_resource::{ResourceConfig, ResourceManager};
//!
//! let manager = ResourceManager::new(&ResourceConfig::default().with_budget(64 << 20));
//! manager.create("ship.mesh", MeshData::default())?;
//! let mesh = manager.load("ship.mesh")?;
//! assert!(mesh.is_loaded());
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod machine;
pub mod manager;
pub mod resource;
pub mod state;

pub use config::{ResourceConfig, DEFAULT_GROUP};
pub use error::{ResourceError, ResourceResult};
pub use machine::StateMachine;
pub use manager::ResourceManager;
pub use resource::{Loadable, Resource, ResourceHandle, ResourceListener, ResourceMeta};
pub use state::LoadingState;
