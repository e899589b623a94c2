//! The `Edge` the extractor pipeline emits, and its closed per-type
//! property schemas.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The closed set of relationship kinds extractors can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeType {
    Owns,
    ReferencesSpec,
    Selects,
    Manages,
    CreatesObserved,
}

/// A category of justification contributing to an edge's confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvidenceKind {
    Ownership,
    Label,
    Namespace,
    Temporal,
    Reconcile,
    NamePrefix,
}

/// One weighted justification for a scored edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub evidence_kind: EvidenceKind,
    pub value: String,
    pub weight: f64,
    pub observed_ns: u64,
}

/// Whether a scored edge's evidence is still believed current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationState {
    Valid,
    Stale,
    Invalid,
}

/// Per-type edge properties. Each `EdgeType` has exactly one matching
/// variant here — the "closed schema" §6 specifies, modeled as an enum
/// rather than a loosely-typed map so a caller can match exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EdgeProperties {
    Owns,
    ReferencesSpec {
        field_path: String,
        ref_kind: String,
        ref_name: String,
        ref_namespace: String,
    },
    Selects {
        selector_labels: BTreeMap<String, String>,
    },
    Scored {
        confidence: f64,
        evidence: Vec<EvidenceItem>,
        first_observed_ns: u64,
        last_validated_ns: u64,
        validation_state: ValidationState,
    },
}

impl EdgeProperties {
    /// The `EdgeType` this property variant belongs to. `Scored` is used by
    /// both `Manages` and `CreatesObserved`, so it alone can't determine the
    /// edge type; callers construct `Edge` with both fields explicitly.
    pub fn matches(&self, edge_type: EdgeType) -> bool {
        match (self, edge_type) {
            (EdgeProperties::Owns, EdgeType::Owns) => true,
            (EdgeProperties::ReferencesSpec { .. }, EdgeType::ReferencesSpec) => true,
            (EdgeProperties::Selects { .. }, EdgeType::Selects) => true,
            (EdgeProperties::Scored { .. }, EdgeType::Manages | EdgeType::CreatesObserved) => true,
            _ => false,
        }
    }
}

/// A directed, typed, attributed relationship between two resource UIDs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub edge_type: EdgeType,
    pub from_uid: String,
    pub to_uid: String,
    pub properties: EdgeProperties,
}

impl Edge {
    /// Build an edge, asserting `properties` matches `edge_type`. Extractors
    /// are internal callers, not an external boundary, so a debug assertion
    /// catches a mismatched constructor call without paying for it in
    /// release builds.
    pub fn new(edge_type: EdgeType, from_uid: String, to_uid: String, properties: EdgeProperties) -> Self {
        debug_assert!(
            properties.matches(edge_type),
            "edge properties variant does not match edge_type {:?}",
            edge_type
        );
        Self {
            edge_type,
            from_uid,
            to_uid,
            properties,
        }
    }
}
