//! Licenses under which temporary copies are checked out.

use std::fmt;
use std::sync::Arc;

use crate::buffer::{BufferId, SharedBuffer};

/// How a leased copy goes back to the free pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LicenseType {
    /// Stays leased until released or force-evicted.
    Manual,
    /// Expires after a number of frames without a touch.
    Automatic,
}

impl fmt::Display for LicenseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => f.write_str("manual"),
            Self::Automatic => f.write_str("automatic"),
        }
    }
}

/// Holder of a leased copy.
///
/// Called without any manager lock held, so it may lease or release again.
pub trait BufferLicensee: Send + Sync {
    /// The license on `copy` has ended; the copy must no longer be used.
    fn license_expired(&self, copy: &SharedBuffer);
}

/// A checked-out copy.
pub(crate) struct BufferLicense {
    pub(crate) original: BufferId,
    pub(crate) license_type: LicenseType,
    pub(crate) expired_delay: u32,
    pub(crate) copy: SharedBuffer,
    pub(crate) licensee: Arc<dyn BufferLicensee>,
}

impl BufferLicense {
    pub(crate) fn info(&self) -> LicenseInfo {
        LicenseInfo {
            original: self.original,
            copy: self.copy.id(),
            license_type: self.license_type,
            remaining_frames: self.expired_delay,
        }
    }
}

/// Snapshot of one license.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LicenseInfo {
    /// Buffer the copy was made from.
    pub original: BufferId,
    /// The leased copy.
    pub copy: BufferId,
    /// License type.
    pub license_type: LicenseType,
    /// Frames left before an automatic license expires.
    pub remaining_frames: u32,
}

/// A license that ended, waiting for its licensee to be told.
pub(crate) struct Expiry {
    pub(crate) licensee: Arc<dyn BufferLicensee>,
    pub(crate) copy: SharedBuffer,
}

impl Expiry {
    pub(crate) fn of(license: &BufferLicense) -> Self {
        Self {
            licensee: Arc::clone(&license.licensee),
            copy: Arc::clone(&license.copy),
        }
    }

    pub(crate) fn notify(self) {
        self.licensee.license_expired(&self.copy);
    }
}
