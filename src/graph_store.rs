//! `GraphStore`: the minimal interface the (out-of-scope) graph database
//! driver presents to the rest of this crate, plus an in-memory stub
//! implementation for tests and the demo binary.
//!
//! Grounded on the teacher's `graph::GraphStore` trait (`graph/mod.rs`): a
//! `dyn Trait` capability object behind which a concrete storage engine is
//! swapped in, rather than a generic parameter threaded through every
//! caller. Narrowed here to the handful of operations the extractor
//! pipeline and query layer actually need, per the external-interfaces
//! list in spec.md §6.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::Result;
use crate::model::Edge;

/// A resource node as the graph store sees it: enough to identify and
/// re-find a resource, without owning the full event/payload history.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub uid: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub labels: HashMap<String, String>,
}

/// Opaque pass-through query for set-based selection (e.g. "all pods in
/// namespace X"). The concrete query language belongs to the graph driver;
/// this crate only shapes the round trip.
#[derive(Debug, Clone)]
pub struct GraphQuery {
    pub kind: String,
    pub namespace: String,
}

#[derive(Debug, Clone, Default)]
pub struct GraphQueryResult {
    pub nodes: Vec<GraphNode>,
}

/// The capability surface extractors and the demo binary depend on. A real
/// implementation would be backed by an external graph database; this
/// crate only consumes the trait.
pub trait GraphStore: Send + Sync {
    fn create_node(&self, node: GraphNode) -> Result<()>;
    fn create_edge(&self, edge: Edge) -> Result<()>;
    fn execute_query(&self, query: &GraphQuery) -> Result<GraphQueryResult>;
    fn ping(&self) -> Result<()>;
    fn close(&self) -> Result<()>;
}

/// `ResourceLookup`: the contract extractors consume from their
/// environment to resolve references into identities, per spec.md §4.7.
pub trait ResourceLookup: Send + Sync {
    fn find_resource_by_namespace(&self, namespace: &str, kind: &str, name: &str) -> Result<Option<GraphNode>>;
    fn find_resource_by_uid(&self, uid: &str) -> Result<Option<GraphNode>>;
    fn query_graph(&self, query: &GraphQuery) -> Result<GraphQueryResult>;

    /// Downcast support, in the style of the teacher's `GraphStore::as_any`
    /// — most extractors never need it, but the observed-creation
    /// extractor reaches through it to read a resolved target's payload,
    /// which the identity-only lookup contract above doesn't expose.
    fn as_any(&self) -> &dyn std::any::Any;
}

/// A payload-carrying resource, as the in-memory store records it — unlike
/// `GraphNode`, this keeps the decoded JSON body so owner-reference lookups
/// (the `Secret` in `ExternalSecret` → `Secret`, for example) have
/// something to read.
#[derive(Debug, Clone)]
pub struct StoredResource {
    pub node: GraphNode,
    pub payload: Option<serde_json::Value>,
}

/// In-memory `GraphStore` + `ResourceLookup` for tests and the demo
/// binary. Not a production graph database — the real one is an
/// out-of-scope collaborator per spec.md §1.
#[derive(Default)]
pub struct InMemoryGraphStore {
    by_uid: RwLock<HashMap<String, StoredResource>>,
    edges: RwLock<Vec<Edge>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record or replace a resource's latest observed payload, keyed by
    /// UID — extractors resolve references through this, not through
    /// `create_node` alone, since they need the payload for ownership
    /// checks.
    pub fn upsert_resource(&self, node: GraphNode, payload: Option<serde_json::Value>) {
        let mut by_uid = self.by_uid.write().unwrap();
        by_uid.insert(node.uid.clone(), StoredResource { node, payload });
    }

    pub fn get_payload(&self, uid: &str) -> Option<serde_json::Value> {
        self.by_uid.read().unwrap().get(uid).and_then(|r| r.payload.clone())
    }

    pub fn edges(&self) -> Vec<Edge> {
        self.edges.read().unwrap().clone()
    }
}

impl GraphStore for InMemoryGraphStore {
    fn create_node(&self, node: GraphNode) -> Result<()> {
        self.upsert_resource(node, None);
        Ok(())
    }

    fn create_edge(&self, edge: Edge) -> Result<()> {
        self.edges.write().unwrap().push(edge);
        Ok(())
    }

    fn execute_query(&self, query: &GraphQuery) -> Result<GraphQueryResult> {
        self.query_graph(query)
    }

    fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

impl ResourceLookup for InMemoryGraphStore {
    fn find_resource_by_namespace(&self, namespace: &str, kind: &str, name: &str) -> Result<Option<GraphNode>> {
        let by_uid = self.by_uid.read().unwrap();
        Ok(by_uid
            .values()
            .find(|r| r.node.namespace == namespace && r.node.kind == kind && r.node.name == name)
            .map(|r| r.node.clone()))
    }

    fn find_resource_by_uid(&self, uid: &str) -> Result<Option<GraphNode>> {
        Ok(self.by_uid.read().unwrap().get(uid).map(|r| r.node.clone()))
    }

    fn query_graph(&self, query: &GraphQuery) -> Result<GraphQueryResult> {
        let by_uid = self.by_uid.read().unwrap();
        let nodes = by_uid
            .values()
            .filter(|r| r.node.kind == query.kind && r.node.namespace == query.namespace)
            .map(|r| r.node.clone())
            .collect();
        Ok(GraphQueryResult { nodes })
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
