//! `QueryExecutor`: the six-step read pipeline over a set of finalized
//! hour-files — enumerate, prune by time range, prune by inverted index,
//! read surviving blocks through the cache, re-check the full predicate,
//! and merge globally by timestamp.
//!
//! Per-file reads run concurrently via `rayon`, already a teacher
//! dependency used there for parallel iteration over graph data; within a
//! file, block reads stay sequential as specified.

use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use crate::cache::BlockCache;
use crate::error::Result;
use crate::metrics::Metrics;
use crate::model::Event;
use crate::storage::engine::StorageFile;
use crate::storage::reader::HourFileReader;

/// A query over the stored event history. `kind`/`namespace` filters are
/// empty strings to mean "no filter on this dimension".
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub start_ts: u64,
    pub end_ts: u64,
    pub kind: Option<String>,
    pub namespace: Option<String>,
}

impl QueryRequest {
    fn matches(&self, event: &Event) -> bool {
        if event.ts_ns < self.start_ts || event.ts_ns > self.end_ts {
            return false;
        }
        if let Some(kind) = &self.kind {
            if &event.metadata.kind != kind {
                return false;
            }
        }
        if let Some(ns) = &self.namespace {
            if &event.metadata.namespace != ns {
                return false;
            }
        }
        true
    }
}

/// Observability counters returned alongside a query's results, per the
/// pipeline's step 6.
#[derive(Debug, Clone, Default)]
pub struct QueryStats {
    pub events_returned: usize,
    pub blocks_scanned: u64,
    pub blocks_skipped: u64,
    pub files_searched: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub events: Vec<Event>,
    pub stats: QueryStats,
}

/// Executes `QueryRequest`s against a list of closed hour-files, backed by
/// a shared block cache.
pub struct QueryExecutor {
    cache: Arc<BlockCache>,
    metrics: Arc<Metrics>,
    max_blocks_per_query: usize,
}

struct FileOutcome {
    events: Vec<(u64, u32, usize, Event)>,
    blocks_scanned: u64,
    blocks_skipped: u64,
}

impl QueryExecutor {
    pub fn new(cache: Arc<BlockCache>, metrics: Arc<Metrics>, max_blocks_per_query: usize) -> Self {
        Self {
            cache,
            metrics,
            max_blocks_per_query,
        }
    }

    /// Run `request` against `files`. Hour-file enumeration by filename is
    /// the caller's job (`StorageEngine::storage_files`); this narrows by
    /// hour before opening anything.
    pub fn execute(&self, request: &QueryRequest, files: &[StorageFile]) -> Result<QueryResult> {
        let start = Instant::now();
        let start_hour = request.start_ts / 1_000_000_000 / 3600;
        let end_hour = request.end_ts / 1_000_000_000 / 3600;

        let candidate_files: Vec<&StorageFile> = files
            .iter()
            .filter(|f| f.hour_epoch >= start_hour && f.hour_epoch <= end_hour)
            .collect();

        let outcomes: Vec<Result<FileOutcome>> = candidate_files
            .par_iter()
            .map(|file| self.scan_file(file, request))
            .collect();

        let mut all_events = Vec::new();
        let mut blocks_scanned = 0u64;
        let mut blocks_skipped = 0u64;
        let mut files_searched = 0usize;

        for outcome in outcomes {
            match outcome {
                Ok(outcome) => {
                    files_searched += 1;
                    blocks_scanned += outcome.blocks_scanned;
                    blocks_skipped += outcome.blocks_skipped;
                    all_events.extend(outcome.events);
                }
                Err(e) if e.is_block_recoverable() => {
                    tracing::warn!(error = %e, "skipping unreadable hour-file");
                }
                Err(e) => return Err(e),
            }
        }

        // Global ascending timestamp order, tie-broken by
        // (file-hour, block_id, intra-block position).
        all_events.sort_by(|a, b| {
            a.3.ts_ns
                .cmp(&b.3.ts_ns)
                .then(a.0.cmp(&b.0))
                .then(a.1.cmp(&b.1))
                .then(a.2.cmp(&b.2))
        });

        let events: Vec<Event> = all_events.into_iter().map(|(_, _, _, e)| e).collect();
        let elapsed_ms = start.elapsed().as_millis() as u64;
        self.metrics.record_query(elapsed_ms, blocks_scanned, blocks_skipped);

        Ok(QueryResult {
            stats: QueryStats {
                events_returned: events.len(),
                blocks_scanned,
                blocks_skipped,
                files_searched,
                elapsed_ms,
            },
            events,
        })
    }

    fn scan_file(&self, file: &StorageFile, request: &QueryRequest) -> Result<FileOutcome> {
        let reader = HourFileReader::open(&file.path)?;
        let file_id = file.hour_epoch;

        let mut candidates: Vec<u32> = reader
            .blocks()
            .iter()
            .filter(|b| b.overlaps_time_range(request.start_ts, request.end_ts))
            .map(|b| b.block_id)
            .collect();

        if let Some(kind) = &request.kind {
            let allowed: std::collections::HashSet<u32> = reader
                .kind_index()
                .get(kind)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .collect();
            candidates.retain(|id| allowed.contains(id));
        }
        if let Some(ns) = &request.namespace {
            let allowed: std::collections::HashSet<u32> = reader
                .namespace_index()
                .get(ns)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .collect();
            candidates.retain(|id| allowed.contains(id));
        }

        let total_blocks = reader.blocks().len() as u64;
        let mut blocks_scanned = 0u64;
        let mut events = Vec::new();

        for block_id in candidates {
            if blocks_scanned >= self.max_blocks_per_query as u64 {
                break;
            }
            let meta = reader
                .blocks()
                .iter()
                .find(|b| b.block_id == block_id)
                .expect("block id came from this reader's own index");

            match reader.read_block_cached(file_id, meta, &self.cache, &self.metrics) {
                Ok(cached) => {
                    blocks_scanned += 1;
                    for (pos, event) in cached.events.iter().enumerate() {
                        if request.matches(event) {
                            events.push((file_id, block_id, pos, event.clone()));
                        }
                    }
                }
                Err(e) if e.is_block_recoverable() => {
                    tracing::warn!(block_id, error = %e, "skipping unreadable block");
                }
                Err(e) => return Err(e),
            }
        }

        let blocks_skipped = total_blocks.saturating_sub(blocks_scanned);
        Ok(FileOutcome {
            events,
            blocks_scanned,
            blocks_skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChangeKind, ResourceMetadata};
    use crate::storage::writer::HourFileWriter;
    use std::collections::BTreeMap as Map;
    use tempfile::tempdir;

    fn sample_event(id: &str, ts_ns: u64, kind: &str, ns: &str) -> Event {
        Event {
            id: id.to_string(),
            ts_ns,
            kind: ChangeKind::Update,
            metadata: ResourceMetadata {
                api_group: "".into(),
                api_version: "v1".into(),
                kind: kind.into(),
                namespace: ns.into(),
                name: id.to_string(),
                uid: format!("uid-{id}"),
                labels: Map::new(),
                first_seen_ns: ts_ns,
                last_seen_ns: ts_ns,
            },
            payload: Some(serde_json::json!({"n": 1})),
        }
    }

    fn write_file(dir: &std::path::Path, hour_epoch: u64, events: &[Event]) -> StorageFile {
        let path = dir.join(format!("{hour_epoch}.spct"));
        let mut writer = HourFileWriter::open(&path, hour_epoch, 4096).unwrap();
        for event in events {
            writer.write(event.clone()).unwrap();
        }
        writer.close().unwrap();
        StorageFile { hour_epoch, path }
    }

    #[test]
    fn query_returns_events_in_global_timestamp_order() {
        let dir = tempdir().unwrap();
        let file0 = write_file(
            dir.path(),
            0,
            &[sample_event("b", 2_000_000_000, "Pod", "default")],
        );
        let file1 = write_file(
            dir.path(),
            1,
            &[sample_event("a", 1_000_000_000, "Pod", "default")],
        );

        let executor = QueryExecutor::new(
            Arc::new(BlockCache::new(1024 * 1024)),
            Arc::new(Metrics::new()),
            500,
        );
        let request = QueryRequest {
            start_ts: 0,
            end_ts: u64::MAX,
            kind: None,
            namespace: None,
        };
        let result = executor.execute(&request, &[file0, file1]).unwrap();
        assert_eq!(result.events.len(), 2);
        assert_eq!(result.events[0].id, "a");
        assert_eq!(result.events[1].id, "b");
    }

    #[test]
    fn kind_filter_excludes_non_matching_events() {
        let dir = tempdir().unwrap();
        let file = write_file(
            dir.path(),
            0,
            &[
                sample_event("a", 1000, "Pod", "default"),
                sample_event("b", 2000, "Service", "default"),
            ],
        );
        let executor = QueryExecutor::new(
            Arc::new(BlockCache::new(1024 * 1024)),
            Arc::new(Metrics::new()),
            500,
        );
        let request = QueryRequest {
            start_ts: 0,
            end_ts: u64::MAX,
            kind: Some("Pod".into()),
            namespace: None,
        };
        let result = executor.execute(&request, &[file]).unwrap();
        assert_eq!(result.events.len(), 1);
        assert_eq!(result.events[0].id, "a");
    }

    #[test]
    fn out_of_range_time_window_skips_the_file_entirely() {
        let dir = tempdir().unwrap();
        let file = write_file(dir.path(), 0, &[sample_event("a", 1000, "Pod", "default")]);
        let executor = QueryExecutor::new(
            Arc::new(BlockCache::new(1024 * 1024)),
            Arc::new(Metrics::new()),
            500,
        );
        let request = QueryRequest {
            start_ts: 10_000_000_000_000,
            end_ts: 20_000_000_000_000,
            kind: None,
            namespace: None,
        };
        let result = executor.execute(&request, &[file]).unwrap();
        assert_eq!(result.stats.files_searched, 0);
        assert!(result.events.is_empty());
    }

    #[test]
    fn reports_blocks_scanned_and_skipped() {
        let dir = tempdir().unwrap();
        let file = write_file(
            dir.path(),
            0,
            &[
                sample_event("a", 1000, "Pod", "default"),
                sample_event("b", 2000, "Service", "default"),
            ],
        );
        let executor = QueryExecutor::new(
            Arc::new(BlockCache::new(1024 * 1024)),
            Arc::new(Metrics::new()),
            500,
        );
        let request = QueryRequest {
            start_ts: 0,
            end_ts: u64::MAX,
            kind: None,
            namespace: None,
        };
        let result = executor.execute(&request, &[file]).unwrap();
        assert_eq!(result.stats.blocks_scanned, 1);
        assert_eq!(result.stats.blocks_skipped, 0);
    }
}
