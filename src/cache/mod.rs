//! Cache Module
//!
//! Per-shard in-memory storage with TTL expiration and LRU eviction under a
//! byte budget.

mod entry;
mod lru;
mod stats;
mod store;


// Re-export public types
pub use entry::CacheEntry;
pub use lru::LruList;
pub use stats::CacheStats;
pub use store::{CacheStore, SweepStep};

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 512;
