//! Bounded LRU block cache keyed by `(file_id, block_id)`.
//!
//! Built on the `lru` crate wrapped in a `Mutex`, with an accounting
//! counter for total cached bytes — the same "mutex around the map plus
//! auxiliary counters" shape the teacher uses for its `Metrics` struct,
//! applied here to a cache instead of a counter bank. `lru::LruCache`
//! itself has no notion of a byte budget (only entry count), so eviction
//! past the configured cap is driven manually via `pop_lru`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use lru::LruCache;

use crate::error::{Result, SpectreError};
use crate::model::Event;
use crate::storage::types::BlockMeta;

/// A decompressed, parsed block plus its accounted memory size.
#[derive(Debug, Clone)]
pub struct CachedBlock {
    pub events: Vec<Event>,
    pub meta: BlockMeta,
    pub accounted_size: u64,
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub current_bytes: u64,
    pub cap_bytes: u64,
}

impl CacheStats {
    /// `hits / (hits + misses)`, or 0 when there have been no accesses yet.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

type CacheKey = (u64, u32);

/// Thread-safe bounded LRU cache of parsed blocks.
pub struct BlockCache {
    inner: Mutex<LruCache<CacheKey, Arc<CachedBlock>>>,
    cap_bytes: u64,
    current_bytes: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl BlockCache {
    pub fn new(cap_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(LruCache::unbounded()),
            cap_bytes,
            current_bytes: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Look up a cached block, updating its recency and the hit/miss
    /// counters.
    pub fn get(&self, file_id: u64, block_id: u32) -> Option<Arc<CachedBlock>> {
        let mut inner = self.inner.lock().unwrap();
        match inner.get(&(file_id, block_id)) {
            Some(block) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(block))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert (or update) a cached block, evicting least-recently-used
    /// entries until the budget is satisfied. A single block larger than
    /// the cap is rejected outright and the cache is left unchanged.
    pub fn put(&self, file_id: u64, block_id: u32, block: CachedBlock) -> Result<()> {
        let size = block.accounted_size;
        if size > self.cap_bytes {
            return Err(SpectreError::TooLarge(format!(
                "block ({file_id}, {block_id}) size {size} exceeds cache cap {}",
                self.cap_bytes
            )));
        }

        let mut inner = self.inner.lock().unwrap();
        let key = (file_id, block_id);
        if let Some(old) = inner.pop(&key) {
            self.current_bytes.fetch_sub(old.accounted_size, Ordering::Relaxed);
        }

        while self.current_bytes.load(Ordering::Relaxed) + size > self.cap_bytes {
            match inner.pop_lru() {
                Some((_, evicted)) => {
                    self.current_bytes.fetch_sub(evicted.accounted_size, Ordering::Relaxed);
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
                None => break,
            }
        }

        inner.put(key, Arc::new(block));
        self.current_bytes.fetch_add(size, Ordering::Relaxed);
        Ok(())
    }

    /// Drop every cached entry and reset the accounted byte count. Counters
    /// (hits/misses/evictions) are left intact; they describe history, not
    /// current occupancy.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.clear();
        self.current_bytes.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            current_bytes: self.current_bytes.load(Ordering::Relaxed),
            cap_bytes: self.cap_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::{CompressionAlgo, SegmentMetadata};

    fn block_of_size(block_id: u32, size: u64) -> CachedBlock {
        CachedBlock {
            events: Vec::new(),
            meta: BlockMeta {
                block_id,
                offset: 0,
                length: size,
                uncompressed_size: size,
                compressed_size: size,
                event_count: 1,
                min_ts_ns: 0,
                max_ts_ns: 0,
                compression: CompressionAlgo::None,
                segment_metadata: SegmentMetadata::default(),
                digest: [0u8; 32],
            },
            accounted_size: size,
        }
    }

    #[test]
    fn miss_then_hit_updates_counters() {
        let cache = BlockCache::new(1024);
        assert!(cache.get(1, 0).is_none());
        cache.put(1, 0, block_of_size(0, 100)).unwrap();
        assert!(cache.get(1, 0).is_some());
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn too_large_block_is_rejected_and_cache_unchanged() {
        let cache = BlockCache::new(100);
        let err = cache.put(1, 0, block_of_size(0, 200)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::TooLarge);
        assert_eq!(cache.stats().current_bytes, 0);
    }

    #[test]
    fn eviction_scenario_matches_seed_case_b() {
        // cap = 1MB; insert three 400,000-byte blocks (f=1,0..2) in order.
        let cache = BlockCache::new(1_000_000);
        cache.put(1, 0, block_of_size(0, 400_000)).unwrap();
        cache.put(1, 1, block_of_size(1, 400_000)).unwrap();
        cache.put(1, 2, block_of_size(2, 400_000)).unwrap();

        assert!(cache.get(1, 0).is_none(), "oldest block should be evicted");
        assert!(cache.get(1, 1).is_some());
        assert!(cache.get(1, 2).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn accounted_bytes_never_exceed_cap_under_interleaving() {
        let cache = BlockCache::new(1000);
        for i in 0..50u32 {
            let _ = cache.put(1, i, block_of_size(i, 37));
            if i % 3 == 0 {
                let _ = cache.get(1, i.saturating_sub(1));
            }
            if i == 25 {
                cache.clear();
            }
        }
        assert!(cache.stats().current_bytes <= 1000);
    }

    #[test]
    fn hit_rate_is_zero_with_no_accesses() {
        let cache = BlockCache::new(100);
        assert_eq!(cache.stats().hit_rate(), 0.0);
    }

    #[test]
    fn updating_existing_key_does_not_double_count_bytes() {
        let cache = BlockCache::new(1000);
        cache.put(1, 0, block_of_size(0, 100)).unwrap();
        cache.put(1, 0, block_of_size(0, 150)).unwrap();
        assert_eq!(cache.stats().current_bytes, 150);
    }

    #[test]
    fn clear_resets_occupancy_but_not_counters() {
        let cache = BlockCache::new(1000);
        cache.put(1, 0, block_of_size(0, 100)).unwrap();
        cache.get(1, 0);
        cache.clear();
        let stats = cache.stats();
        assert_eq!(stats.current_bytes, 0);
        assert_eq!(stats.hits, 1);
    }
}
