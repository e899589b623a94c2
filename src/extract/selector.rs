//! Selector extractor: `Service` -> `Pod` via label-subset matching.
//!
//! On a non-delete `Service` event, reads `spec.selector`, queries all
//! pods in the same namespace through `ResourceLookup::query_graph`, and
//! in-memory filters by label subset (selector keys/values all present in
//! the pod's labels).

use crate::error::Result;
use crate::graph_store::{GraphQuery, ResourceLookup};
use crate::model::path::get_string_map;
use crate::model::{ChangeKind, Edge, EdgeProperties, EdgeType, Event};

use super::traits::Extractor;

pub struct SelectorExtractor;

impl Extractor for SelectorExtractor {
    fn name(&self) -> &str {
        "selector"
    }

    fn priority(&self) -> i32 {
        20
    }

    fn matches(&self, event: &Event) -> bool {
        event.kind != ChangeKind::Delete && event.metadata.kind == "Service" && event.payload.is_some()
    }

    fn extract_relationships(&self, event: &Event, lookup: &dyn ResourceLookup) -> Result<Vec<Edge>> {
        let Some(payload) = &event.payload else {
            return Ok(Vec::new());
        };
        let selector = get_string_map(payload, &["spec", "selector"]);
        if selector.is_empty() {
            tracing::debug!(
                service = %event.metadata.name,
                namespace = %event.metadata.namespace,
                "service has no selector; skipping"
            );
            return Ok(Vec::new());
        }

        let candidates = lookup.query_graph(&GraphQuery {
            kind: "Pod".to_string(),
            namespace: event.metadata.namespace.clone(),
        })?;

        let mut edges = Vec::new();
        for pod in &candidates.nodes {
            let is_subset = selector
                .iter()
                .all(|(k, v)| pod.labels.get(k) == Some(v));
            if !is_subset {
                continue;
            }
            edges.push(Edge::new(
                EdgeType::Selects,
                event.metadata.uid.clone(),
                pod.uid.clone(),
                EdgeProperties::Selects {
                    selector_labels: selector.clone(),
                },
            ));
        }

        tracing::debug!(
            service = %event.metadata.name,
            namespace = %event.metadata.namespace,
            matched = edges.len(),
            "selector extractor matched pods"
        );
        Ok(edges)
    }
}
