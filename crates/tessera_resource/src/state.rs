//! Loading states.

use std::fmt;

/// Lifecycle state of a resource.
///
/// ```text
///  Unloaded ──► Preparing ──► Prepared ──► Loading ──► Loaded
///     │                          │            ▲          │
///     └──────────────────────────┼────────────┘          │
///     ▲                          ▼                       │
///     └──────────────────── Unloading ◄─────────────────┘
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LoadingState {
    /// No data held.
    #[default]
    Unloaded,
    /// A thread is running the prepare step.
    Preparing,
    /// Raw data staged, not loaded.
    Prepared,
    /// A thread is running the load steps.
    Loading,
    /// Fully loaded.
    Loaded,
    /// A thread is running the unload steps.
    Unloading,
}

impl LoadingState {
    /// Number of states.
    pub const COUNT: usize = 6;

    /// Dense index for per-state tables.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Whether some thread owns an in-progress transition.
    #[inline]
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Preparing | Self::Loading | Self::Unloading)
    }

    /// Lowercase name for logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unloaded => "unloaded",
            Self::Preparing => "preparing",
            Self::Prepared => "prepared",
            Self::Loading => "loading",
            Self::Loaded => "loaded",
            Self::Unloading => "unloading",
        }
    }
}

impl fmt::Display for LoadingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
