//! Observed-creation extractor: e.g. `ExternalSecret` -> `Secret`, emitting
//! `CREATES_OBSERVED` with evidence-weighted confidence. Skipped for
//! `Delete` events, since there is nothing newly observed to correlate.
//!
//! Per Design Notes' resolved Open Question 2: the ownership check here is
//! not stubbed out. When the target resource's payload is available (the
//! lookup resolved it), `ownerReferences` on that payload is read and, if
//! it names this event's resource, short-circuits to full confidence. When
//! the target can't be resolved, the ownership signal is simply absent and
//! scoring falls through to the remaining evidence terms.

use crate::error::Result;
use crate::extract::confidence::{namespace_evidence, ownership_evidence, score, temporal_evidence};
use crate::graph_store::ResourceLookup;
use crate::model::path::{get_array, get_str};
use crate::model::{ChangeKind, Edge, EdgeProperties, EdgeType, Event, ValidationState};

use super::traits::Extractor;

const MIN_CONFIDENCE: f64 = 0.5;
const TEMPORAL_WINDOW_MS: u64 = 30_000;
const TEMPORAL_WEIGHT: f64 = 0.5;
const NAMESPACE_WEIGHT: f64 = 0.3;

/// One known "observed creation" relationship: a controller kind and the
/// field on its payload naming the resource it creates.
struct ObservedRule {
    controller_kind: &'static str,
    target_kind: &'static str,
    target_name_path: &'static [&'static str],
}

const RULES: &[ObservedRule] = &[ObservedRule {
    controller_kind: "ExternalSecret",
    target_kind: "Secret",
    target_name_path: &["spec", "target", "name"],
}];

pub struct ObservedCreationExtractor;

impl Extractor for ObservedCreationExtractor {
    fn name(&self) -> &str {
        "observed_creation"
    }

    fn priority(&self) -> i32 {
        40
    }

    fn matches(&self, event: &Event) -> bool {
        event.kind != ChangeKind::Delete
            && event.payload.is_some()
            && RULES.iter().any(|r| r.controller_kind == event.metadata.kind)
    }

    fn extract_relationships(&self, event: &Event, lookup: &dyn ResourceLookup) -> Result<Vec<Edge>> {
        let Some(payload) = &event.payload else {
            return Ok(Vec::new());
        };
        let Some(rule) = RULES.iter().find(|r| r.controller_kind == event.metadata.kind) else {
            return Ok(Vec::new());
        };

        let target_name = get_str(payload, rule.target_name_path).unwrap_or(&event.metadata.name);
        let target = lookup.find_resource_by_namespace(&event.metadata.namespace, rule.target_kind, target_name)?;
        let Some(target) = target else {
            return Ok(Vec::new());
        };

        let mut evidence = Vec::new();
        let mut owned = false;
        if let Some(target_payload) = lookup_target_payload(lookup, &target.uid) {
            if let Some(refs) = get_array(&target_payload, &["metadata", "ownerReferences"]) {
                owned = refs
                    .iter()
                    .any(|r| r.get("uid").and_then(|v| v.as_str()) == Some(event.metadata.uid.as_str()));
            }
        }

        if owned {
            evidence = ownership_evidence(event.ts_ns);
        } else {
            evidence.push(namespace_evidence(&event.metadata.namespace, NAMESPACE_WEIGHT, event.ts_ns));
            if let Some(temporal) = temporal_evidence(
                event.ts_ns,
                event.metadata.first_seen_ns,
                TEMPORAL_WINDOW_MS,
                TEMPORAL_WEIGHT,
            ) {
                evidence.push(temporal);
            }
        }

        let confidence = score(&evidence);
        if confidence < MIN_CONFIDENCE {
            return Ok(Vec::new());
        }

        Ok(vec![Edge::new(
            EdgeType::CreatesObserved,
            event.metadata.uid.clone(),
            target.uid,
            EdgeProperties::Scored {
                confidence,
                evidence,
                first_observed_ns: event.ts_ns,
                last_validated_ns: event.ts_ns,
                validation_state: ValidationState::Valid,
            },
        )])
    }
}

/// `ResourceLookup` doesn't expose payloads directly (it's an identity
/// lookup, not a payload store) — extractors that need a resolved
/// resource's body go through the in-memory store's extra accessor when
/// available, and otherwise treat the ownership signal as unavailable.
fn lookup_target_payload(lookup: &dyn ResourceLookup, uid: &str) -> Option<serde_json::Value> {
    lookup
        .as_any()
        .downcast_ref::<crate::graph_store::InMemoryGraphStore>()
        .and_then(|store| store.get_payload(uid))
}
