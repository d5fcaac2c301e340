//! Device memory seam.
//!
//! The graphics binding layer implements [`DeviceMemory`] over a real API
//! allocation. Callers have already checked ranges.

/// A fixed-size allocation owned by the graphics device.
pub trait DeviceMemory: Send {
    /// Size in bytes.
    fn len(&self) -> usize;

    /// Whether the allocation is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies `dest.len()` bytes starting at `offset` into `dest`.
    fn read(&self, offset: usize, dest: &mut [u8]);

    /// Uploads `src` at `offset`. With `discard_whole` the previous contents
    /// of the whole allocation may be orphaned first.
    fn write(&mut self, offset: usize, src: &[u8], discard_whole: bool);
}

/// In-process device memory for headless runs and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostDeviceMemory {
    bytes: Vec<u8>,
    uploads: u64,
    discards: u64,
}

impl HostDeviceMemory {
    /// Zero-filled allocation of `len` bytes.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            bytes: vec![0; len],
            uploads: 0,
            discards: 0,
        }
    }

    /// Number of writes received.
    #[must_use]
    pub fn uploads(&self) -> u64 {
        self.uploads
    }

    /// Number of writes that orphaned the whole allocation.
    #[must_use]
    pub fn discards(&self) -> u64 {
        self.discards
    }
}

impl DeviceMemory for HostDeviceMemory {
    fn len(&self) -> usize {
        self.bytes.len()
    }

    fn read(&self, offset: usize, dest: &mut [u8]) {
        dest.copy_from_slice(&self.bytes[offset..offset + dest.len()]);
    }

    fn write(&mut self, offset: usize, src: &[u8], discard_whole: bool) {
        self.uploads += 1;
        if discard_whole {
            self.discards += 1;
        }
        self.bytes[offset..offset + src.len()].copy_from_slice(src);
    }
}
