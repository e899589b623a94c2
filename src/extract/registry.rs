//! `ExtractorRegistry`: a pull-based fan-out over registered extractors,
//! ordered by ascending priority with a stable tie-break by registration
//! order, dispatching one event at a time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::graph_store::ResourceLookup;
use crate::model::{Edge, Event};

use super::traits::Extractor;

struct Registered {
    extractor: Arc<dyn Extractor>,
    registration_order: usize,
}

/// Ordered-by-priority registry of extractors, with per-extractor failure
/// isolation recorded by name.
pub struct ExtractorRegistry {
    entries: Mutex<Vec<Registered>>,
    failures: Mutex<HashMap<String, u64>>,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, extractor: Arc<dyn Extractor>) {
        let mut entries = self.entries.lock().unwrap();
        let registration_order = entries.len();
        entries.push(Registered {
            extractor,
            registration_order,
        });
    }

    /// Extractors in dispatch order: ascending priority, ties broken by
    /// registration order.
    pub fn list_by_priority(&self) -> Vec<Arc<dyn Extractor>> {
        let entries = self.entries.lock().unwrap();
        let mut snapshot: Vec<(i32, usize, Arc<dyn Extractor>)> = entries
            .iter()
            .map(|r| (r.extractor.priority(), r.registration_order, Arc::clone(&r.extractor)))
            .collect();
        snapshot.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        snapshot.into_iter().map(|(_, _, e)| e).collect()
    }

    /// Run every matching extractor against `event`, isolating a failing
    /// extractor's error by name rather than aborting the whole dispatch.
    /// Edges are returned concatenated in extractor (priority) order.
    pub fn dispatch(&self, event: &Event, lookup: &dyn ResourceLookup) -> Vec<Edge> {
        let mut edges = Vec::new();
        for extractor in self.list_by_priority() {
            if !extractor.matches(event) {
                continue;
            }
            match extractor.extract_relationships(event, lookup) {
                Ok(mut produced) => edges.append(&mut produced),
                Err(e) => {
                    tracing::warn!(extractor = extractor.name(), error = %e, "extractor failed");
                    let mut failures = self.failures.lock().unwrap();
                    *failures.entry(extractor.name().to_string()).or_insert(0) += 1;
                }
            }
        }
        edges
    }

    /// Failure counts by extractor name, for the metrics surface.
    pub fn failure_counts(&self) -> HashMap<String, u64> {
        self.failures.lock().unwrap().clone()
    }
}
