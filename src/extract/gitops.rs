//! GitOps management extractors: Flux (`HelmRelease`, `Kustomization`) and
//! Argo CD (`Application`) each emit `MANAGES(manager -> managed)` when a
//! newly created resource carries the manager's well-known labels.
//!
//! Multiple flavors coexist at increasing priorities so non-conflicting
//! emissions are produced independently — a resource carrying both Flux
//! and Argo labels (unusual, but not forbidden) gets a `MANAGES` edge from
//! each manager that claims it.

use crate::error::Result;
use crate::extract::confidence::{
    is_perfect_label_match, label_evidence, namespace_evidence, reconcile_evidence, score,
    temporal_evidence, GitOpsConfig,
};
use crate::graph_store::ResourceLookup;
use crate::model::{ChangeKind, Edge, EdgeProperties, EdgeType, Event, EvidenceItem, EvidenceKind, ValidationState};

use super::traits::Extractor;

/// Shared implementation for a single GitOps manager flavor; `Flux*` and
/// `Argo*` extractor types each wrap one with their own name/priority.
pub struct GitOpsManagerExtractor {
    name: &'static str,
    priority: i32,
    manager_kind: &'static str,
    config: GitOpsConfig,
    min_confidence: f64,
}

impl GitOpsManagerExtractor {
    pub fn flux_helm_release(min_confidence: f64) -> Self {
        Self {
            name: "gitops_flux_helmrelease",
            priority: 30,
            manager_kind: "HelmRelease",
            config: GitOpsConfig::flux_helm_release(),
            min_confidence,
        }
    }

    pub fn flux_kustomization(min_confidence: f64) -> Self {
        Self {
            name: "gitops_flux_kustomization",
            priority: 31,
            manager_kind: "Kustomization",
            config: GitOpsConfig::flux_kustomization(),
            min_confidence,
        }
    }

    pub fn argo_application(min_confidence: f64) -> Self {
        Self {
            name: "gitops_argo_application",
            priority: 32,
            manager_kind: "Application",
            config: GitOpsConfig::argo_application(),
            min_confidence,
        }
    }
}

impl Extractor for GitOpsManagerExtractor {
    fn name(&self) -> &str {
        self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn matches(&self, event: &Event) -> bool {
        event.kind == ChangeKind::Create && !event.metadata.labels.is_empty()
    }

    fn extract_relationships(&self, event: &Event, lookup: &dyn ResourceLookup) -> Result<Vec<Edge>> {
        let labels = &event.metadata.labels;
        let Some(manager_name) = labels.get(&self.config.label_templates.name) else {
            return Ok(Vec::new());
        };
        let manager_namespace = self
            .config
            .label_templates
            .namespace
            .as_ref()
            .and_then(|key| labels.get(key))
            .cloned()
            .unwrap_or_else(|| event.metadata.namespace.clone());

        let manager = lookup.find_resource_by_namespace(&manager_namespace, self.manager_kind, manager_name)?;
        let Some(manager) = manager else {
            return Ok(Vec::new());
        };

        let mut template_keys = vec![self.config.label_templates.name.as_str()];
        if let Some(ns_key) = &self.config.label_templates.namespace {
            template_keys.push(ns_key.as_str());
        }

        let evidence: Vec<EvidenceItem> = if is_perfect_label_match(&template_keys, labels) {
            vec![label_evidence(
                &self.config.label_templates.name,
                manager_name,
                1.0,
                event.ts_ns,
            )]
        } else {
            let mut evidence = vec![label_evidence(
                &self.config.label_templates.name,
                manager_name,
                self.config.name_prefix_weight,
                event.ts_ns,
            )];
            if manager_namespace == event.metadata.namespace {
                evidence.push(namespace_evidence(
                    &manager_namespace,
                    self.config.namespace_weight,
                    event.ts_ns,
                ));
            }
            if let Some(temporal) = temporal_evidence(
                event.ts_ns,
                event.metadata.first_seen_ns,
                self.config.temporal_window_ms,
                self.config.temporal_weight,
            ) {
                evidence.push(temporal);
            }
            if self.config.check_reconcile_events {
                evidence.push(reconcile_evidence(event.ts_ns, self.config.reconcile_weight));
            }
            evidence
        };

        let confidence = score(&evidence);
        if confidence < self.min_confidence {
            return Ok(Vec::new());
        }

        Ok(vec![Edge::new(
            EdgeType::Manages,
            manager.uid,
            event.metadata.uid.clone(),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_store::{GraphNode, InMemoryGraphStore};
    use crate::model::ResourceMetadata;
    use std::collections::BTreeMap;

    fn managed_event(labels: BTreeMap<String, String>) -> Event {
        Event {
            id: "e1".into(),
            ts_ns: 1_000_000_000,
            kind: ChangeKind::Create,
            metadata: ResourceMetadata {
                api_group: "apps".into(),
                api_version: "v1".into(),
                kind: "Deployment".into(),
                namespace: "default".into(),
                name: "app".into(),
                uid: "app-uid".into(),
                labels,
                first_seen_ns: 1_000_000_000,
                last_seen_ns: 1_000_000_000,
            },
            payload: Some(serde_json::json!({})),
        }
    }

    #[test]
    fn perfect_label_match_short_circuits_to_full_confidence() {
        let lookup = InMemoryGraphStore::new();
        lookup.upsert_resource(
            GraphNode {
                uid: "hr-uid".into(),
                kind: "HelmRelease".into(),
                namespace: "default".into(),
                name: "app".into(),
                labels: Default::default(),
            },
            None,
        );

        let labels = BTreeMap::from([
            ("helm.toolkit.fluxcd.io/name".to_string(), "app".to_string()),
            ("helm.toolkit.fluxcd.io/namespace".to_string(), "default".to_string()),
        ]);
        let extractor = GitOpsManagerExtractor::flux_helm_release(0.5);
        let event = managed_event(labels);
        let edges = extractor.extract_relationships(&event, &lookup).unwrap();
        assert_eq!(edges.len(), 1);
        match &edges[0].properties {
            EdgeProperties::Scored {
                confidence, evidence, ..
            } => {
                assert_eq!(*confidence, 1.0);
                assert_eq!(evidence.len(), 1);
                assert_eq!(evidence[0].evidence_kind, EvidenceKind::Label);
            }
            _ => panic!("expected Scored properties"),
        }
    }

    #[test]
    fn below_threshold_confidence_emits_nothing() {
        let lookup = InMemoryGraphStore::new();
        lookup.upsert_resource(
            GraphNode {
                uid: "hr-uid".into(),
                kind: "HelmRelease".into(),
                namespace: "other-ns".into(),
                name: "app".into(),
                labels: Default::default(),
            },
            None,
        );
        // Name label present but namespace label absent -> not a perfect
        // match, and the namespace differs from the resource's own, so
        // only the partial name-prefix weight (0.4) contributes; well
        // under a 0.99 threshold.
        let labels = BTreeMap::from([
            ("helm.toolkit.fluxcd.io/name".to_string(), "app".to_string()),
        ]);
        let extractor = GitOpsManagerExtractor::flux_helm_release(0.99);
        let mut event = managed_event(labels);
        event.metadata.namespace = "other-ns".to_string();
        event.metadata.first_seen_ns = 0;
        event.ts_ns = 10_000_000_000_000; // far outside the temporal window
        let edges = extractor.extract_relationships(&event, &lookup).unwrap();
        assert!(edges.is_empty());
    }

    #[test]
    fn no_manager_label_yields_no_edges() {
        let lookup = InMemoryGraphStore::new();
        let extractor = GitOpsManagerExtractor::flux_kustomization(0.5);
        let event = managed_event(BTreeMap::new());
        let edges = extractor.extract_relationships(&event, &lookup).unwrap();
        assert!(edges.is_empty());
    }
}
