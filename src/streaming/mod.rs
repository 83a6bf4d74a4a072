//! Asset streaming cache
//!
//! Serves payload bytes for asset descriptors out of a fixed-capacity,
//! LRU-evicted slab. Misses are filled by background jobs; callers poll.

pub mod slab;
pub mod loader;
pub mod asset_manager;

pub use slab::{CacheStats, SlotState};
pub use loader::read_payload;
pub use asset_manager::{AssetManager, BarrierGuard, BarrierToken, PackHandle};
