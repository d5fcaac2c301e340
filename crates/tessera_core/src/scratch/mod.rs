//! # Scratch Memory
//!
//! Short-lived staging memory carved out of one fixed arena. A miss returns
//! `None`; callers fall back to a slower, unbounded path.

mod arena;
mod header;

pub use arena::{ScratchArena, ScratchBlock, ScratchStats};
pub use header::{BlockHeader, HEADER_SIZE, MAX_BLOCK_SIZE};
