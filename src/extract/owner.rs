//! Owner-reference extractor: emits `OWNS(parent_uid -> child_uid)` for
//! every `ownerReferences[]` entry on a resource, at full confidence.

use crate::error::Result;
use crate::graph_store::ResourceLookup;
use crate::model::path::get_array;
use crate::model::{ChangeKind, Edge, EdgeProperties, EdgeType, Event};

use super::traits::Extractor;

pub struct OwnerReferenceExtractor;

impl Extractor for OwnerReferenceExtractor {
    fn name(&self) -> &str {
        "owner_reference"
    }

    fn priority(&self) -> i32 {
        0
    }

    fn matches(&self, event: &Event) -> bool {
        event.kind != ChangeKind::Delete && event.payload.is_some()
    }

    fn extract_relationships(&self, event: &Event, _lookup: &dyn ResourceLookup) -> Result<Vec<Edge>> {
        let Some(payload) = &event.payload else {
            return Ok(Vec::new());
        };
        let Some(refs) = get_array(payload, &["metadata", "ownerReferences"]) else {
            return Ok(Vec::new());
        };

        let mut edges = Vec::new();
        for reference in refs {
            let Some(parent_uid) = reference.get("uid").and_then(|v| v.as_str()) else {
                continue;
            };
            edges.push(Edge::new(
                EdgeType::Owns,
                parent_uid.to_string(),
                event.metadata.uid.clone(),
                EdgeProperties::Owns,
            ));
        }
        Ok(edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_store::InMemoryGraphStore;
    use crate::model::ResourceMetadata;
    use std::collections::BTreeMap;

    fn event_with_owners(owners: serde_json::Value) -> Event {
        Event {
            id: "e1".into(),
            ts_ns: 1,
            kind: ChangeKind::Create,
            metadata: ResourceMetadata {
                api_group: "".into(),
                api_version: "v1".into(),
                kind: "Pod".into(),
                namespace: "default".into(),
                name: "child".into(),
                uid: "child-uid".into(),
                labels: BTreeMap::new(),
                first_seen_ns: 1,
                last_seen_ns: 1,
            },
            payload: Some(serde_json::json!({
                "metadata": {"ownerReferences": owners}
            })),
        }
    }

    #[test]
    fn emits_owns_edge_per_owner_reference() {
        let extractor = OwnerReferenceExtractor;
        let lookup = InMemoryGraphStore::new();
        let event = event_with_owners(serde_json::json!([
            {"uid": "parent-1"},
            {"uid": "parent-2"}
        ]));
        assert!(extractor.matches(&event));
        let edges = extractor.extract_relationships(&event, &lookup).unwrap();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].edge_type, EdgeType::Owns);
        assert_eq!(edges[0].to_uid, "child-uid");
    }

    #[test]
    fn no_owner_references_yields_no_edges() {
        let extractor = OwnerReferenceExtractor;
        let lookup = InMemoryGraphStore::new();
        let event = event_with_owners(serde_json::json!([]));
        let edges = extractor.extract_relationships(&event, &lookup).unwrap();
        assert!(edges.is_empty());
    }

    #[test]
    fn delete_events_do_not_match() {
        let extractor = OwnerReferenceExtractor;
        let mut event = event_with_owners(serde_json::json!([]));
        event.kind = ChangeKind::Delete;
        event.payload = None;
        assert!(!extractor.matches(&event));
    }
}
