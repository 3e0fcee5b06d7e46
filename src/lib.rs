//! kvcache - A shard-per-core in-memory key-value cache engine
//!
//! Every core owns one shard of the key space and runs its own cooperative
//! event loop. Requests for a key owned elsewhere travel over a lock-free
//! inter-core fabric and come back as correlated responses. Shards enforce a
//! memory budget with LRU eviction and expire entries by TTL.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod fabric;
pub mod models;
pub mod reactor;
pub mod router;
pub mod shard;
pub mod tasks;

pub use cache::{CacheStats, CacheStore};
pub use config::Config;
pub use engine::{merge_reports, Engine};
pub use error::{CacheError, Result};
pub use models::{Op, Request, Response, Status};
pub use reactor::ShardReport;
pub use router::shard_for;
