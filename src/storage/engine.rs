//! `StorageEngine`: owns the set of open hour-files and the current
//! writer for each, plus the background closer task that finalizes them.
//!
//! Grounded on the teacher's `DatabaseManager` (`database_manager.rs`):
//! an `RwLock`-guarded registry of named, independently-lockable resources,
//! generalized here from "named databases" to "named (by hour) open
//! writers". The background closer is new — the teacher flushes on an OS
//! signal in its binary, this flushes on a timer, so it is built on
//! `tokio::select!` over a tick interval and a shutdown channel instead.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{Result, SpectreError};
use crate::metrics::Metrics;
use crate::model::Event;
use crate::storage::reader::HourFileReader;
use crate::storage::writer::HourFileWriter;

const SECONDS_PER_HOUR: u64 = 3600;

/// A hand-finalized hour-file, readable via `HourFileReader::open`.
#[derive(Debug, Clone)]
pub struct StorageFile {
    pub hour_epoch: u64,
    pub path: PathBuf,
}

/// Snapshot of engine health for the `Metrics`/ops surface: a non-empty
/// quarantine means writes are failing to finalize somewhere and a human
/// should look.
#[derive(Debug, Clone, Default)]
pub struct HealthSnapshot {
    pub open_files: usize,
    pub quarantined_hours: Vec<u64>,
}

struct EngineState {
    open: HashMap<u64, HourFileWriter>,
    closed: BTreeMap<u64, StorageFile>,
    quarantined: Vec<u64>,
}

/// Owns every open `HourFileWriter` for the process, routes incoming
/// events to the correct one by hour, and runs the background closer.
pub struct StorageEngine {
    root: PathBuf,
    block_size_bytes: u64,
    state: RwLock<EngineState>,
    metrics: Arc<Metrics>,
    closer_handle: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
}

fn current_hour_epoch(ts_ns: u64) -> u64 {
    (ts_ns / 1_000_000_000) / SECONDS_PER_HOUR
}

fn now_hour_epoch() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    now.as_secs() / SECONDS_PER_HOUR
}

/// Civil (UTC) `YYYY-MM-DD-HH` for an hour epoch, via the civil_from_days
/// algorithm (Howard Hinnant's `chrono`-independent days-since-epoch to
/// year/month/day conversion), since the crate carries no date/time crate.
fn civil_hour_string(hour_epoch: u64) -> String {
    let days = (hour_epoch / 24) as i64;
    let hour = hour_epoch % 24;

    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };

    format!("{y:04}-{m:02}-{d:02}-{hour:02}")
}

impl StorageEngine {
    pub fn new(root: impl AsRef<Path>, block_size_bytes: u64, metrics: Arc<Metrics>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            block_size_bytes,
            state: RwLock::new(EngineState {
                open: HashMap::new(),
                closed: BTreeMap::new(),
                quarantined: Vec::new(),
            }),
            metrics,
            closer_handle: Mutex::new(None),
            shutdown_tx: Mutex::new(None),
        }
    }

    fn hour_path(&self, hour_epoch: u64) -> PathBuf {
        self.root.join(format!("{}.bin", civil_hour_string(hour_epoch)))
    }

    /// Spawn the background closer task, ticking on `tick_interval` and
    /// finalizing any open file older than `max_age`.
    pub fn start(self: &Arc<Self>, tick_interval: Duration, max_age: Duration) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;

        let (tx, mut rx) = watch::channel(false);
        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = engine.close_old_hour_files(max_age) {
                            tracing::warn!(error = %e, "background hour-file closer failed");
                        }
                    }
                    _ = rx.changed() => {
                        if *rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        *self.closer_handle.lock().unwrap() = Some(handle);
        *self.shutdown_tx.lock().unwrap() = Some(tx);
        Ok(())
    }

    /// Route `event` to the hour-file implied by its timestamp, opening a
    /// new writer on demand.
    pub fn write_event(&self, event: Event) -> Result<()> {
        event.validate()?;
        let hour_epoch = current_hour_epoch(event.ts_ns);

        let mut state = self.state.write().unwrap();
        if state.quarantined.contains(&hour_epoch) {
            return Err(SpectreError::Internal(format!(
                "hour {hour_epoch} is quarantined after a failed finalize; rejecting write"
            )));
        }

        if !state.open.contains_key(&hour_epoch) {
            let path = self.hour_path(hour_epoch);
            let writer = HourFileWriter::open(&path, hour_epoch, self.block_size_bytes)?;
            state.open.insert(hour_epoch, writer);
        }
        let writer = state.open.get_mut(&hour_epoch).expect("just inserted");
        let start = std::time::Instant::now();
        let result = writer.write(event);
        self.metrics.record_write(start.elapsed().as_millis() as u64);
        result
    }

    /// Finalize every open hour-file older than `now - max_age`. Failure to
    /// finalize quarantines the hour rather than propagating: subsequent
    /// writes to that hour fail, but the engine as a whole keeps running.
    pub fn close_old_hour_files(&self, max_age: Duration) -> Result<()> {
        let max_age_hours = (max_age.as_secs() / SECONDS_PER_HOUR).max(1);
        let cutoff = now_hour_epoch().saturating_sub(max_age_hours);

        let due: Vec<u64> = {
            let state = self.state.read().unwrap();
            state
                .open
                .keys()
                .copied()
                .filter(|hour| *hour < cutoff)
                .collect()
        };

        for hour_epoch in due {
            let writer = {
                let mut state = self.state.write().unwrap();
                state.open.remove(&hour_epoch)
            };
            let Some(writer) = writer else { continue };

            let path = self.hour_path(hour_epoch);
            match writer.close() {
                Ok(summary) => {
                    let mut state = self.state.write().unwrap();
                    state.closed.insert(
                        hour_epoch,
                        StorageFile {
                            hour_epoch,
                            path: summary.path,
                        },
                    );
                }
                Err(e) => {
                    tracing::warn!(hour_epoch, error = %e, path = %path.display(), "failed to finalize hour-file");
                    let mut state = self.state.write().unwrap();
                    state.quarantined.push(hour_epoch);
                }
            }
        }
        Ok(())
    }

    /// Stop the closer task (best-effort, bounded) and finalize every
    /// remaining open file.
    pub async fn stop(&self, shutdown_grace: Duration) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.lock().unwrap().take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.closer_handle.lock().unwrap().take() {
            let _ = tokio::time::timeout(shutdown_grace, handle).await;
        }

        let remaining: Vec<u64> = {
            let mut state = self.state.write().unwrap();
            state.open.keys().copied().collect()
        };
        for hour_epoch in remaining {
            let writer = {
                let mut state = self.state.write().unwrap();
                state.open.remove(&hour_epoch)
            };
            let Some(writer) = writer else { continue };
            match writer.close() {
                Ok(summary) => {
                    let mut state = self.state.write().unwrap();
                    state.closed.insert(
                        hour_epoch,
                        StorageFile {
                            hour_epoch,
                            path: summary.path,
                        },
                    );
                }
                Err(e) => {
                    tracing::warn!(hour_epoch, error = %e, "failed to finalize hour-file during stop");
                    let mut state = self.state.write().unwrap();
                    state.quarantined.push(hour_epoch);
                }
            }
        }
        Ok(())
    }

    /// Every closed (readable) hour-file, oldest first.
    pub fn storage_files(&self) -> Vec<StorageFile> {
        self.state.read().unwrap().closed.values().cloned().collect()
    }

    pub fn health(&self) -> HealthSnapshot {
        let state = self.state.read().unwrap();
        HealthSnapshot {
            open_files: state.open.len(),
            quarantined_hours: state.quarantined.clone(),
        }
    }

    /// Open a reader for a closed hour-file by its hour epoch, if it has
    /// been finalized.
    pub fn open_reader(&self, hour_epoch: u64) -> Result<Option<HourFileReader>> {
        let path = {
            let state = self.state.read().unwrap();
            state.closed.get(&hour_epoch).map(|f| f.path.clone())
        };
        match path {
            Some(path) => Ok(Some(HourFileReader::open(path)?)),
            None => Ok(None),
        }
    }
}
