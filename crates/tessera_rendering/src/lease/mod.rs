//! # Temporary Buffer Leases
//!
//! Spare copies of vertex buffers, checked out against a license and
//! returned to a free pool keyed by the buffer they were copied from.

mod license;
mod manager;

pub use license::{BufferLicensee, LicenseInfo, LicenseType};
pub use manager::{LeaseManager, LeaseStats, TickReport};
