//! # Buffer Mapping
//!
//! Keeps the block model aligned with freely edited buffer text.
//!
//! - **`tracker`**: `PositionTracker`, one marker per block; after edits it
//!   recomputes spans and decides which blocks were deleted
//! - **`orphans`**: `OrphanDetector`, turns text no block owns into anchored
//!   candidate blocks

pub mod orphans;
pub mod tracker;

pub use orphans::{Anchor, OrphanDetector, OrphanRange};
pub use tracker::{PositionTracker, RefreshReport};
