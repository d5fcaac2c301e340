//! # Memory Categories
//!
//! Every pool allocation is tagged with the subsystem that owns it. The tag is
//! part of the block's identity: it must be handed back on free.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Subsystem that owns an allocation.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum MemoryCategory {
    /// Anything without a more specific owner.
    #[default]
    General = 0,
    /// Vertex, index and staging data.
    Geometry = 1,
    /// Skeletons, tracks and keyframes.
    Animation = 2,
    /// Scene management structures.
    SceneControl = 3,
    /// Objects placed in a scene.
    SceneObjects = 4,
    /// Loadable resources.
    Resource = 5,
    /// Render system internals.
    RenderSystem = 6,
}

impl MemoryCategory {
    /// Number of categories.
    pub const COUNT: usize = 7;

    /// All categories in index order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::General,
        Self::Geometry,
        Self::Animation,
        Self::SceneControl,
        Self::SceneObjects,
        Self::Resource,
        Self::RenderSystem,
    ];

    /// Dense index for per-category tables.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Short lowercase name used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Geometry => "geometry",
            Self::Animation => "animation",
            Self::SceneControl => "scene-control",
            Self::SceneObjects => "scene-objects",
            Self::Resource => "resource",
            Self::RenderSystem => "render-system",
        }
    }
}

impl fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Compile-time category marker.
///
/// Lets call sites fix the category in the type instead of passing it:
///
/// ```rust,ignore
/// let block = registry.allocate_in::<Geometry>(64)?;
/// registry.deallocate_in::<Geometry>(block);
/// ```
pub trait CategoryTag {
    /// The category this marker stands for.
    const CATEGORY: MemoryCategory;
}

macro_rules! category_tags {
    ($($(#[$doc:meta])* $tag:ident => $variant:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
            pub struct $tag;

            impl CategoryTag for $tag {
                const CATEGORY: MemoryCategory = MemoryCategory::$variant;
            }
        )*
    };
}

/// Zero-sized category markers.
pub mod tags {
    use super::{CategoryTag, MemoryCategory};

    category_tags! {
        /// Marker for [`MemoryCategory::General`].
        General => General,
        /// Marker for [`MemoryCategory::Geometry`].
        Geometry => Geometry,
        /// Marker for [`MemoryCategory::Animation`].
        Animation => Animation,
        /// Marker for [`MemoryCategory::SceneControl`].
        SceneControl => SceneControl,
        /// Marker for [`MemoryCategory::SceneObjects`].
        SceneObjects => SceneObjects,
        /// Marker for [`MemoryCategory::Resource`].
        Resource => Resource,
        /// Marker for [`MemoryCategory::RenderSystem`].
        RenderSystem => RenderSystem,
    }
}
