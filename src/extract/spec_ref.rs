//! Spec-reference extractor: emits `REFERENCES_SPEC` edges for typed
//! references embedded in a resource's spec (`secretStoreRef`,
//! `backend.service.name`, `defaultBackend`, ...). Unresolved targets
//! still record the intent with an empty `target_uid`.

use crate::error::Result;
use crate::graph_store::ResourceLookup;
use crate::model::path::get_str;
use crate::model::{ChangeKind, Edge, EdgeProperties, EdgeType, Event};

use super::traits::Extractor;

/// One typed reference this extractor knows how to read: a JSON path to
/// the referenced name, the kind it points at, and a label for the edge.
struct RefField {
    field_path: &'static str,
    path: &'static [&'static str],
    ref_kind: &'static str,
}

const REF_FIELDS: &[RefField] = &[
    RefField {
        field_path: "spec.secretStoreRef.name",
        path: &["spec", "secretStoreRef", "name"],
        ref_kind: "SecretStore",
    },
    RefField {
        field_path: "spec.backend.service.name",
        path: &["spec", "backend", "service", "name"],
        ref_kind: "Service",
    },
    RefField {
        field_path: "spec.defaultBackend.service.name",
        path: &["spec", "defaultBackend", "service", "name"],
        ref_kind: "Service",
    },
];

pub struct SpecReferenceExtractor;

impl Extractor for SpecReferenceExtractor {
    fn name(&self) -> &str {
        "spec_reference"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn matches(&self, event: &Event) -> bool {
        event.kind != ChangeKind::Delete && event.payload.is_some()
    }

    fn extract_relationships(&self, event: &Event, lookup: &dyn ResourceLookup) -> Result<Vec<Edge>> {
        let Some(payload) = &event.payload else {
            return Ok(Vec::new());
        };

        let mut edges = Vec::new();
        for field in REF_FIELDS {
            let Some(ref_name) = get_str(payload, field.path) else {
                continue;
            };
            let target_uid = lookup
                .find_resource_by_namespace(&event.metadata.namespace, field.ref_kind, ref_name)?
                .map(|n| n.uid)
                .unwrap_or_default();

            edges.push(Edge::new(
                EdgeType::ReferencesSpec,
                event.metadata.uid.clone(),
                target_uid,
                EdgeProperties::ReferencesSpec {
                    field_path: field.field_path.to_string(),
                    ref_kind: field.ref_kind.to_string(),
                    ref_name: ref_name.to_string(),
                    ref_namespace: event.metadata.namespace.clone(),
                },
            ));
        }
        Ok(edges)
    }
}
