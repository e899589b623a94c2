//! Runtime metrics for the storage engine and extractor pipeline.
//!
//! Provides lightweight, thread-safe metrics collection with near-zero cost
//! on the hot path. Counters are plain atomics; the only mutex-guarded state
//! is the rolling latency windows and the per-extractor breakdown maps, both
//! of which are only walked on `snapshot()`.
//!
//! # Overview
//!
//! Tracked quantities:
//! - Write and query latencies, with percentile calculations (p50/p95/p99)
//! - Blocks scanned vs. skipped by the query executor's index pruning
//! - Block cache hit/miss/eviction counts
//! - Extractor dispatch counts and failures, broken down by extractor name
//!
//! # Design Decisions
//!
//! - Thread-safe: all counters are `AtomicU64`; only the latency windows and
//!   per-extractor maps need a `Mutex`, and that lock is held only for the
//!   duration of a push/pop or a snapshot copy.
//! - Bounded memory: the latency windows are fixed-size ring buffers, so
//!   memory use does not grow with uptime.
//! - O(1) per-operation recording; `snapshot()` is O(window size) for the
//!   percentile sort, which is acceptable since it's not called per-event.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Rolling window size for write/query latency percentile calculation.
const LATENCY_WINDOW_SIZE: usize = 1000;

/// Maximum number of slow queries retained for reporting.
const MAX_SLOW_QUERIES: usize = 10;

/// Query duration, in milliseconds, above which a query is recorded as slow.
pub const SLOW_QUERY_THRESHOLD_MS: u64 = 100;

/// Thread-safe metrics collector for a single storage engine instance.
///
/// Create one instance per engine and share it (wrapped in `Arc`) between
/// the writer, query executor, block cache, and extractor registry.
pub struct Metrics {
    write_count: AtomicU64,
    write_latency_sum_ms: AtomicU64,
    write_latencies_ms: Mutex<VecDeque<u64>>,

    query_count: AtomicU64,
    query_latency_sum_ms: AtomicU64,
    query_latencies_ms: Mutex<VecDeque<u64>>,
    slow_query_count: AtomicU64,
    slow_queries: Mutex<VecDeque<SlowQuery>>,

    blocks_scanned: AtomicU64,
    blocks_skipped: AtomicU64,

    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_evictions: AtomicU64,

    extractor_dispatches: Mutex<HashMap<String, u64>>,
    extractor_failures: Mutex<HashMap<String, u64>>,

    started_at: Instant,
}

/// A recorded slow query: which query ran long and when.
#[derive(Clone, Debug, PartialEq)]
pub struct SlowQuery {
    pub duration_ms: u64,
    pub blocks_scanned: u64,
    pub timestamp_ms: u64,
}

/// Per-extractor dispatch/failure counts, for the top-N breakdown in a snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractorStat {
    pub name: String,
    pub dispatch_count: u64,
    pub failure_count: u64,
}

/// Point-in-time copy of all metrics, safe to serialize and hand to a caller.
#[derive(Clone, Debug, Default)]
pub struct MetricsSnapshot {
    pub write_count: u64,
    pub write_avg_ms: u64,
    pub write_p50_ms: u64,
    pub write_p99_ms: u64,

    pub query_count: u64,
    pub query_avg_ms: u64,
    pub query_p50_ms: u64,
    pub query_p95_ms: u64,
    pub query_p99_ms: u64,
    pub slow_query_count: u64,
    pub top_slow_queries: Vec<SlowQuery>,

    pub blocks_scanned: u64,
    pub blocks_skipped: u64,

    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_evictions: u64,
    /// `cache_hits / (cache_hits + cache_misses)`, or 0.0 with no accesses yet.
    pub cache_hit_rate: f64,

    pub extractor_stats: Vec<ExtractorStat>,

    pub uptime_secs: u64,
}

/// Compute (p50, p95, p99, avg) from a window of latencies. Empty window
/// yields all zeros.
fn percentiles(latencies: &VecDeque<u64>, sum_ms: u64) -> (u64, u64, u64, u64) {
    if latencies.is_empty() {
        return (0, 0, 0, 0);
    }
    let mut sorted: Vec<u64> = latencies.iter().copied().collect();
    sorted.sort_unstable();
    let len = sorted.len();
    let p50 = sorted[len * 50 / 100];
    let p95 = sorted[len * 95 / 100];
    let p99 = sorted.get(len * 99 / 100).copied().unwrap_or(sorted[len - 1]);
    let avg = sum_ms / len as u64;
    (p50, p95, p99, avg)
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            write_count: AtomicU64::new(0),
            write_latency_sum_ms: AtomicU64::new(0),
            write_latencies_ms: Mutex::new(VecDeque::with_capacity(LATENCY_WINDOW_SIZE)),
            query_count: AtomicU64::new(0),
            query_latency_sum_ms: AtomicU64::new(0),
            query_latencies_ms: Mutex::new(VecDeque::with_capacity(LATENCY_WINDOW_SIZE)),
            slow_query_count: AtomicU64::new(0),
            slow_queries: Mutex::new(VecDeque::with_capacity(MAX_SLOW_QUERIES)),
            blocks_scanned: AtomicU64::new(0),
            blocks_skipped: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            cache_evictions: AtomicU64::new(0),
            extractor_dispatches: Mutex::new(HashMap::new()),
            extractor_failures: Mutex::new(HashMap::new()),
            started_at: Instant::now(),
        }
    }

    /// Record a single event write, including its block-append latency.
    pub fn record_write(&self, duration_ms: u64) {
        self.write_count.fetch_add(1, Ordering::Relaxed);
        push_window(
            &self.write_latencies_ms,
            &self.write_latency_sum_ms,
            duration_ms,
        );
    }

    /// Record a completed query: its latency and how many blocks the
    /// executor scanned vs. skipped via index pruning.
    pub fn record_query(&self, duration_ms: u64, blocks_scanned: u64, blocks_skipped: u64) {
        self.query_count.fetch_add(1, Ordering::Relaxed);
        push_window(
            &self.query_latencies_ms,
            &self.query_latency_sum_ms,
            duration_ms,
        );
        self.blocks_scanned.fetch_add(blocks_scanned, Ordering::Relaxed);
        self.blocks_skipped.fetch_add(blocks_skipped, Ordering::Relaxed);

        if duration_ms >= SLOW_QUERY_THRESHOLD_MS {
            self.slow_query_count.fetch_add(1, Ordering::Relaxed);
            let mut slow = self.slow_queries.lock().unwrap();
            if slow.len() >= MAX_SLOW_QUERIES {
                slow.pop_front();
            }
            slow.push_back(SlowQuery {
                duration_ms,
                blocks_scanned,
                timestamp_ms: self.started_at.elapsed().as_millis() as u64,
            });
        }
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_eviction(&self) {
        self.cache_evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful dispatch of `name` against an event.
    pub fn record_extractor_dispatch(&self, name: &str) {
        let mut counts = self.extractor_dispatches.lock().unwrap();
        *counts.entry(name.to_string()).or_insert(0) += 1;
    }

    /// Record that extractor `name` returned an error for an event.
    pub fn record_extractor_failure(&self, name: &str) {
        let mut counts = self.extractor_failures.lock().unwrap();
        *counts.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let (write_p50, _write_p95, write_p99, write_avg) = {
            let latencies = self.write_latencies_ms.lock().unwrap();
            percentiles(&latencies, self.write_latency_sum_ms.load(Ordering::Relaxed))
        };
        let (query_p50, query_p95, query_p99, query_avg) = {
            let latencies = self.query_latencies_ms.lock().unwrap();
            percentiles(&latencies, self.query_latency_sum_ms.load(Ordering::Relaxed))
        };

        let top_slow_queries = {
            let slow = self.slow_queries.lock().unwrap();
            slow.iter().cloned().collect()
        };

        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.cache_misses.load(Ordering::Relaxed);
        let total_accesses = cache_hits + cache_misses;
        let cache_hit_rate = if total_accesses > 0 {
            cache_hits as f64 / total_accesses as f64
        } else {
            0.0
        };

        let extractor_stats = {
            let dispatches = self.extractor_dispatches.lock().unwrap();
            let failures = self.extractor_failures.lock().unwrap();
            let mut names: Vec<&String> = dispatches.keys().chain(failures.keys()).collect();
            names.sort_unstable();
            names.dedup();
            let mut stats: Vec<ExtractorStat> = names
                .into_iter()
                .map(|name| ExtractorStat {
                    name: name.clone(),
                    dispatch_count: dispatches.get(name).copied().unwrap_or(0),
                    failure_count: failures.get(name).copied().unwrap_or(0),
                })
                .collect();
            stats.sort_by(|a, b| b.dispatch_count.cmp(&a.dispatch_count));
            stats
        };

        MetricsSnapshot {
            write_count: self.write_count.load(Ordering::Relaxed),
            write_avg_ms: write_avg,
            write_p50_ms: write_p50,
            write_p99_ms: write_p99,
            query_count: self.query_count.load(Ordering::Relaxed),
            query_avg_ms: query_avg,
            query_p50_ms: query_p50,
            query_p95_ms: query_p95,
            query_p99_ms: query_p99,
            slow_query_count: self.slow_query_count.load(Ordering::Relaxed),
            top_slow_queries,
            blocks_scanned: self.blocks_scanned.load(Ordering::Relaxed),
            blocks_skipped: self.blocks_skipped.load(Ordering::Relaxed),
            cache_hits,
            cache_misses,
            cache_evictions: self.cache_evictions.load(Ordering::Relaxed),
            cache_hit_rate,
            extractor_stats,
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}

/// Push a latency sample into a bounded window, evicting the oldest sample
/// (and subtracting it from `sum`) once the window is full.
fn push_window(window: &Mutex<VecDeque<u64>>, sum: &AtomicU64, value_ms: u64) {
    let mut latencies = window.lock().unwrap();
    if latencies.len() >= LATENCY_WINDOW_SIZE {
        if let Some(old) = latencies.pop_front() {
            sum.fetch_sub(old, Ordering::Relaxed);
        }
    }
    latencies.push_back(value_ms);
    sum.fetch_add(value_ms, Ordering::Relaxed);
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
