//! Demo binary: wires the storage engine, the extractor registry, and the
//! lifecycle coordinator together against an in-memory graph store stub.
//!
//! Reads newline-delimited JSON `Event` records from stdin, writes each to
//! the storage engine, dispatches it through the extractor registry, and
//! records resulting edges against the in-memory graph store. Not a
//! substitute for the (out-of-scope) long-running server — this is the
//! thing a developer runs locally to see the pipeline move.
//!
//! Usage: `spectre-demo [config.yaml] < events.ndjson`

use std::io::BufRead;
use std::sync::Arc;

use async_trait::async_trait;

use spectre_core::config::SpectreConfig;
use spectre_core::error::Result;
use spectre_core::extract::{
    ExtractorRegistry, GitOpsManagerExtractor, ObservedCreationExtractor, OwnerReferenceExtractor,
    SelectorExtractor, SpecReferenceExtractor,
};
use spectre_core::graph_store::{GraphNode, GraphStore, InMemoryGraphStore};
use spectre_core::lifecycle::{Component, LifecycleCoordinator};
use spectre_core::metrics::Metrics;
use spectre_core::model::Event;
use spectre_core::storage::StorageEngine;

/// Adapts `StorageEngine` (whose own `start`/`stop` take extra tuning
/// arguments the generic `Component` contract doesn't carry) to the
/// lifecycle coordinator's uniform start/stop surface.
struct StorageEngineComponent {
    engine: Arc<StorageEngine>,
    tick_interval: std::time::Duration,
    max_age: std::time::Duration,
    shutdown_grace: std::time::Duration,
}

#[async_trait]
impl Component for StorageEngineComponent {
    fn name(&self) -> &str {
        "storage_engine"
    }

    async fn start(&self) -> Result<()> {
        self.engine.start(self.tick_interval, self.max_age)
    }

    async fn stop(&self) -> Result<()> {
        self.engine.stop(self.shutdown_grace).await
    }
}

fn build_registry() -> ExtractorRegistry {
    let registry = ExtractorRegistry::new();
    registry.register(Arc::new(OwnerReferenceExtractor));
    registry.register(Arc::new(SpecReferenceExtractor));
    registry.register(Arc::new(SelectorExtractor));
    registry.register(Arc::new(GitOpsManagerExtractor::flux_helm_release(0.75)));
    registry.register(Arc::new(GitOpsManagerExtractor::flux_kustomization(0.75)));
    registry.register(Arc::new(GitOpsManagerExtractor::argo_application(0.75)));
    registry.register(Arc::new(ObservedCreationExtractor));
    registry
}

fn record_event(store: &InMemoryGraphStore, event: &Event) {
    store.upsert_resource(
        GraphNode {
            uid: event.metadata.uid.clone(),
            kind: event.metadata.kind.clone(),
            namespace: event.metadata.namespace.clone(),
            name: event.metadata.name.clone(),
            labels: event.metadata.labels.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        },
        event.payload.clone(),
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => SpectreConfig::load(path)?,
        None => SpectreConfig::default(),
    };

    let metrics = Arc::new(Metrics::new());
    let engine = Arc::new(StorageEngine::new(
        &config.storage_root,
        config.block_size_bytes,
        Arc::clone(&metrics),
    ));
    let graph_store = Arc::new(InMemoryGraphStore::new());
    let registry = build_registry();

    let mut coordinator = LifecycleCoordinator::new();
    coordinator
        .register(
            Arc::new(StorageEngineComponent {
                engine: Arc::clone(&engine),
                tick_interval: config.closer_tick_interval,
                max_age: config.hour_file_max_age,
                shutdown_grace: config.shutdown_grace,
            }),
            &[],
        )
        .expect("storage_engine is the only component, so registration cannot fail");
    coordinator.start().await?;

    let stdin = std::io::stdin();
    let mut emitted = 0u64;
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: Event = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed event line");
                continue;
            }
        };

        if let Err(e) = engine.write_event(event.clone()) {
            tracing::warn!(error = %e, event_id = %event.id, "failed to write event");
            continue;
        }

        record_event(&graph_store, &event);
        graph_store.create_node(GraphNode {
            uid: event.metadata.uid.clone(),
            kind: event.metadata.kind.clone(),
            namespace: event.metadata.namespace.clone(),
            name: event.metadata.name.clone(),
            labels: event.metadata.labels.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        })?;

        let edges = registry.dispatch(&event, graph_store.as_ref());
        for edge in edges {
            if let EdgeConfidence::BelowThreshold = edge_confidence(&edge, config.min_emit_confidence) {
                continue;
            }
            emitted += 1;
            graph_store.create_edge(edge)?;
        }
    }

    tracing::info!(emitted, "demo run complete, shutting down");
    coordinator.stop().await?;
    Ok(())
}

enum EdgeConfidence {
    Ok,
    BelowThreshold,
}

/// Applies the configured emit threshold to scored edges; unscored edge
/// kinds (`Owns`, `Selects`) carry no confidence and always pass.
fn edge_confidence(edge: &spectre_core::model::Edge, min_emit_confidence: f64) -> EdgeConfidence {
    match &edge.properties {
        spectre_core::model::EdgeProperties::Scored { confidence, .. } if *confidence < min_emit_confidence => {
            EdgeConfidence::BelowThreshold
        }
        _ => EdgeConfidence::Ok,
    }
}
