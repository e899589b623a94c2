//! Evidence-weighted confidence scoring, shared by the GitOps management
//! and observed-creation extractors: a weighted-sum model over named
//! evidence categories, with an ownership short-circuit and a
//! perfect-label-match short-circuit.

use crate::model::{EvidenceItem, EvidenceKind};

/// Per-manager-flavor GitOps configuration (Flux `HelmRelease`/
/// `Kustomization`, Argo `Application`, ...): which labels identify the
/// manager, and how much weight each evidence category contributes.
#[derive(Debug, Clone)]
pub struct GitOpsConfig {
    /// Label key holding the manager's name, and optionally its namespace.
    pub label_templates: LabelTemplates,
    pub name_prefix_weight: f64,
    pub namespace_weight: f64,
    pub temporal_weight: f64,
    pub reconcile_weight: f64,
    pub temporal_window_ms: u64,
    pub check_reconcile_events: bool,
}

#[derive(Debug, Clone)]
pub struct LabelTemplates {
    pub name: String,
    pub namespace: Option<String>,
}

impl GitOpsConfig {
    /// Flux `HelmRelease` defaults: `helm.toolkit.fluxcd.io/name[-namespace]`.
    pub fn flux_helm_release() -> Self {
        Self {
            label_templates: LabelTemplates {
                name: "helm.toolkit.fluxcd.io/name".into(),
                namespace: Some("helm.toolkit.fluxcd.io/namespace".into()),
            },
            name_prefix_weight: 0.4,
            namespace_weight: 0.2,
            temporal_weight: 0.5,
            reconcile_weight: 0.2,
            temporal_window_ms: 60_000,
            check_reconcile_events: true,
        }
    }

    /// Flux `Kustomization` defaults.
    pub fn flux_kustomization() -> Self {
        Self {
            label_templates: LabelTemplates {
                name: "kustomize.toolkit.fluxcd.io/name".into(),
                namespace: Some("kustomize.toolkit.fluxcd.io/namespace".into()),
            },
            name_prefix_weight: 0.4,
            namespace_weight: 0.2,
            temporal_weight: 0.5,
            reconcile_weight: 0.2,
            temporal_window_ms: 60_000,
            check_reconcile_events: true,
        }
    }

    /// Argo CD `Application` defaults.
    pub fn argo_application() -> Self {
        Self {
            label_templates: LabelTemplates {
                name: "argocd.argoproj.io/instance".into(),
                namespace: None,
            },
            name_prefix_weight: 0.4,
            namespace_weight: 0.1,
            temporal_weight: 0.3,
            reconcile_weight: 0.2,
            temporal_window_ms: 120_000,
            check_reconcile_events: false,
        }
    }
}

/// An ownership reference was found: short-circuits scoring to full
/// confidence with a single evidence item.
pub fn ownership_evidence(observed_ns: u64) -> Vec<EvidenceItem> {
    vec![EvidenceItem {
        evidence_kind: EvidenceKind::Ownership,
        value: "ownerReferences".into(),
        weight: 1.0,
        observed_ns,
    }]
}

/// An exact label key+value match (or a name-templated label), weighted in
/// `[0.4, 0.9]` per spec; extractors pick the specific weight for their
/// label category.
pub fn label_evidence(key: &str, value: &str, weight: f64, observed_ns: u64) -> EvidenceItem {
    EvidenceItem {
        evidence_kind: EvidenceKind::Label,
        value: format!("{key}={value}"),
        weight,
        observed_ns,
    }
}

pub fn namespace_evidence(namespace: &str, weight: f64, observed_ns: u64) -> EvidenceItem {
    EvidenceItem {
        evidence_kind: EvidenceKind::Namespace,
        value: namespace.to_string(),
        weight,
        observed_ns,
    }
}

/// Temporal-proximity evidence: `weight * (1 - |delta_ms| / window_ms)`,
/// clamped to `[0, weight]`. Negative lag (the candidate observed strictly
/// before the manager) yields zero, per spec — a manager cannot manage
/// something that already existed before it was ever observed.
pub fn temporal_evidence(
    candidate_observed_ns: u64,
    manager_observed_ns: u64,
    window_ms: u64,
    weight: f64,
) -> Option<EvidenceItem> {
    if candidate_observed_ns < manager_observed_ns {
        return None;
    }
    let delta_ms = (candidate_observed_ns - manager_observed_ns) / 1_000_000;
    if delta_ms > window_ms {
        return None;
    }
    let proximity = 1.0 - (delta_ms as f64 / window_ms as f64);
    Some(EvidenceItem {
        evidence_kind: EvidenceKind::Temporal,
        value: format!("{delta_ms}ms"),
        weight: weight * proximity.max(0.0),
        observed_ns: candidate_observed_ns,
    })
}

pub fn reconcile_evidence(observed_ns: u64, weight: f64) -> EvidenceItem {
    EvidenceItem {
        evidence_kind: EvidenceKind::Reconcile,
        value: "reconcile-event".into(),
        weight,
        observed_ns,
    }
}

pub fn name_prefix_evidence(prefix: &str, weight: f64, observed_ns: u64) -> EvidenceItem {
    EvidenceItem {
        evidence_kind: EvidenceKind::NamePrefix,
        value: format!("name-prefix:{prefix}"),
        weight,
        observed_ns,
    }
}

/// Sum evidence weights, capped at 1.0. An empty evidence list scores 0.0.
pub fn score(evidence: &[EvidenceItem]) -> f64 {
    evidence.iter().map(|e| e.weight).sum::<f64>().min(1.0)
}

/// Whether all of `label_templates`'s configured keys are present in
/// `labels` with matching values against `expected` — the "perfect label
/// match" short-circuit condition.
pub fn is_perfect_label_match(template_keys: &[&str], labels: &std::collections::BTreeMap<String, String>) -> bool {
    !template_keys.is_empty() && template_keys.iter().all(|k| labels.contains_key(*k))
}
