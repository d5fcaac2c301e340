//! # Size Classes
//!
//! Maps a request size to a pool id.
//!
//! ```text
//!   size      1..=4  5..=8  9..=12  13..=16 | 17..=32  33..=48 ... 161..=176 | 177..
//!   pool id     0      1      2       3     |    4        5    ...    13     |  14
//!             ------ 4-byte classes ------- | ------- 16-byte classes ------ | overflow
//! ```
//!
//! Small, frequent requests get tight classes; everything past the cutoff
//! shares one overflow pool, so the number of live pools stays constant.

use std::fmt;

/// Largest request served by the 4-byte classes.
pub const SMALL_CLASS_LIMIT: usize = 16;

/// Id of the shared overflow pool.
pub const MAX_POOL_ID: u8 = 14;

/// Number of size-class pools, overflow included.
pub const POOL_COUNT: usize = MAX_POOL_ID as usize + 1;

/// Smallest request routed to the overflow pool.
pub const OVERFLOW_CUTOFF: usize = ((MAX_POOL_ID as usize - 3) * 16) + 1;

/// Identifier of a size-class pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PoolId(u8);

impl PoolId {
    /// The shared overflow pool.
    pub const OVERFLOW: Self = Self(MAX_POOL_ID);

    /// Pool id for a request of `size` bytes. Zero is treated as one byte.
    #[must_use]
    pub fn for_size(size: usize) -> Self {
        let size = size.max(1);
        if size <= SMALL_CLASS_LIMIT {
            // At most 3, fits in u8.
            #[allow(clippy::cast_possible_truncation)]
            return Self(((size - 1) / 4) as u8);
        }
        let id = ((size - 1) / 16 + 3).min(MAX_POOL_ID as usize);
        #[allow(clippy::cast_possible_truncation)]
        Self(id as u8)
    }

    /// Builds a pool id from its raw value.
    ///
    /// Returns `None` if `raw` is past the overflow id.
    #[must_use]
    pub const fn from_raw(raw: u8) -> Option<Self> {
        if raw <= MAX_POOL_ID {
            Some(Self(raw))
        } else {
            None
        }
    }

    /// Raw id value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Index into per-pool tables.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Whether this is the shared overflow pool.
    #[inline]
    #[must_use]
    pub const fn is_overflow(self) -> bool {
        self.0 == MAX_POOL_ID
    }

    /// Fixed slot size of this class, `None` for the overflow pool.
    #[must_use]
    pub const fn slot_size(self) -> Option<usize> {
        let id = self.0 as usize;
        if self.is_overflow() {
            None
        } else if id < 4 {
            Some((id + 1) * 4)
        } else {
            Some((id - 2) * 16)
        }
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_overflow() {
            write!(f, "pool#{}(overflow)", self.0)
        } else {
            write!(f, "pool#{}", self.0)
        }
    }
}
