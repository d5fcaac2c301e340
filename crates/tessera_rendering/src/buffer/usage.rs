//! Usage hints and lock options.

use std::fmt;
use std::ops::BitOr;

/// Usage hint given when a buffer is created. Individual flags combine with
/// `|`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferUsage(u8);

impl BufferUsage {
    /// Written once, read many times.
    pub const STATIC: Self = Self(1);
    /// Rewritten frequently.
    pub const DYNAMIC: Self = Self(2);
    /// Never read back by the application.
    pub const WRITE_ONLY: Self = Self(4);
    /// Contents may be thrown away between frames.
    pub const DISCARDABLE: Self = Self(8);
    /// `STATIC | WRITE_ONLY`.
    pub const STATIC_WRITE_ONLY: Self = Self(5);
    /// `DYNAMIC | WRITE_ONLY`.
    pub const DYNAMIC_WRITE_ONLY: Self = Self(6);
    /// `DYNAMIC | WRITE_ONLY | DISCARDABLE`, the hint for temporary copies.
    pub const DYNAMIC_WRITE_ONLY_DISCARDABLE: Self = Self(14);

    /// Raw flag bits.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether every flag of `other` is set.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for BufferUsage {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for BufferUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::STATIC, "static"),
            (Self::DYNAMIC, "dynamic"),
            (Self::WRITE_ONLY, "write-only"),
            (Self::DISCARDABLE, "discardable"),
        ];
        let mut first = true;
        for (flag, name) in names {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("none")?;
        }
        Ok(())
    }
}

/// How a locked range will be used.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LockOption {
    /// Read and write.
    #[default]
    Normal,
    /// Existing contents of the whole buffer may be thrown away.
    Discard,
    /// Read only; nothing is written back.
    ReadOnly,
    /// Caller promises not to overwrite data in use.
    NoOverwrite,
    /// Write only.
    WriteOnly,
}

impl LockOption {
    /// Whether the staged range starts with the buffer's current bytes.
    #[inline]
    #[must_use]
    pub const fn reads_existing(self) -> bool {
        !matches!(self, Self::Discard | Self::NoOverwrite)
    }

    /// Whether unlocking writes the staged range back.
    #[inline]
    #[must_use]
    pub const fn writes_back(self) -> bool {
        !matches!(self, Self::ReadOnly)
    }
}
