//! Bounded in-memory block cache sitting between the query executor and
//! on-disk hour-files.

pub mod lru;

pub use lru::{BlockCache, CacheStats, CachedBlock};
