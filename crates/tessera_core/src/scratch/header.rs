//! In-place block header.
//!
//! ```text
//!  byte   0        1        2        3
//!        [size (31 bits, little endian)  |F]
//!                                         └─ free flag, bit 31
//! ```

/// Bytes taken by every header.
pub const HEADER_SIZE: usize = 4;

const FREE_BIT: u32 = 1 << 31;

/// Largest block size a header can describe.
pub const MAX_BLOCK_SIZE: usize = (FREE_BIT - 1) as usize;

/// Size and free flag of one arena block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    size: u32,
    free: bool,
}

impl BlockHeader {
    /// Header of a free block with `size` data bytes.
    #[inline]
    #[must_use]
    pub fn free(size: usize) -> Self {
        Self::new(size, true)
    }

    /// Header of a used block with `size` data bytes.
    #[inline]
    #[must_use]
    pub fn used(size: usize) -> Self {
        Self::new(size, false)
    }

    fn new(size: usize, free: bool) -> Self {
        debug_assert!(size <= MAX_BLOCK_SIZE, "block size {size} exceeds header range");
        #[allow(clippy::cast_possible_truncation)]
        let size = (size & MAX_BLOCK_SIZE) as u32;
        Self { size, free }
    }

    /// Data bytes following the header.
    #[inline]
    #[must_use]
    pub const fn size(self) -> usize {
        self.size as usize
    }

    /// Whether the block is free.
    #[inline]
    #[must_use]
    pub const fn is_free(self) -> bool {
        self.free
    }

    /// Encoded form.
    #[must_use]
    pub const fn encode(self) -> [u8; HEADER_SIZE] {
        let raw = if self.free {
            self.size | FREE_BIT
        } else {
            self.size
        };
        raw.to_le_bytes()
    }

    /// Decodes a header.
    #[must_use]
    pub const fn decode(raw: [u8; HEADER_SIZE]) -> Self {
        let raw = u32::from_le_bytes(raw);
        Self {
            size: raw & !FREE_BIT,
            free: raw & FREE_BIT != 0,
        }
    }

    /// Reads the header at byte offset `at`.
    pub(crate) fn read(bytes: &[u8], at: usize) -> Self {
        let mut raw = [0u8; HEADER_SIZE];
        raw.copy_from_slice(&bytes[at..at + HEADER_SIZE]);
        Self::decode(raw)
    }

    /// Writes the header at byte offset `at`.
    pub(crate) fn write(self, bytes: &mut [u8], at: usize) {
        bytes[at..at + HEADER_SIZE].copy_from_slice(&self.encode());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_bit_layout() {
        assert_eq!(BlockHeader::used(8).encode(), [8, 0, 0, 0]);
        assert_eq!(BlockHeader::free(8).encode(), [8, 0, 0, 0x80]);
        assert_eq!(
            BlockHeader::decode([0xfc, 0xff, 0xff, 0xff]),
            BlockHeader::free(MAX_BLOCK_SIZE - 3)
        );
    }

    #[test]
    fn test_read_write_in_place() {
        let mut bytes = [0u8; 12];
        BlockHeader::free(1000).write(&mut bytes, 4);
        assert_eq!(&bytes[..4], &[0, 0, 0, 0]);
        let header = BlockHeader::read(&bytes, 4);
        assert!(header.is_free());
        assert_eq!(header.size(), 1000);
    }
}
