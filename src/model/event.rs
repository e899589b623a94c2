//! The `Event` the storage engine ingests: one observed change to a
//! Kubernetes resource.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Result, SpectreError};

/// The kind of change an `Event` represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

/// Identity and classification of the resource an event is about.
///
/// `(api_group, api_version, kind)` identifies the schema; `uid` is the
/// stable identity assigned by the upstream system. `namespace` is empty
/// for cluster-scoped resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    pub api_group: String,
    pub api_version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub uid: String,
    pub labels: BTreeMap<String, String>,
    pub first_seen_ns: u64,
    pub last_seen_ns: u64,
}

/// A single observed change to a Kubernetes resource, as produced by the
/// (out-of-scope) watcher and handed to `StorageEngine::write_event`.
///
/// `payload` holds the decoded resource body; it is the JSON form of the
/// "opaque byte sequence" the abstract model describes, chosen because
/// every extractor needs structured field access (`GetPath`) and JSON is
/// how Kubernetes resources already serialize. It is `None` for `Delete`
/// events that carry no last-seen state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub ts_ns: u64,
    pub kind: ChangeKind,
    pub metadata: ResourceMetadata,
    pub payload: Option<serde_json::Value>,
}

impl Event {
    /// Validate the invariants the storage engine assumes of every event:
    /// `Create`/`Update` carry a non-empty payload. The engine only checks
    /// that the event's hour is well-defined (see `storage::engine`);
    /// this check belongs to the producer per the event-stream contract,
    /// but is exposed here so a producer or the demo binary can call it.
    pub fn validate(&self) -> Result<()> {
        match self.kind {
            ChangeKind::Create | ChangeKind::Update if self.payload.is_none() => {
                Err(SpectreError::Validation(format!(
                    "event {} ({:?}) must carry a payload",
                    self.id, self.kind
                )))
            }
            _ => Ok(()),
        }
    }

    /// Serialize this event to its on-disk representation (length-prefixed
    /// by the block writer, not here).
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize an event from its on-disk representation.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> ResourceMetadata {
        ResourceMetadata {
            api_group: "apps".into(),
            api_version: "v1".into(),
            kind: "Deployment".into(),
            namespace: "prod".into(),
            name: "frontend".into(),
            uid: "uid-1".into(),
            labels: BTreeMap::new(),
            first_seen_ns: 0,
            last_seen_ns: 0,
        }
    }

    #[test]
    fn create_without_payload_fails_validation() {
        let event = Event {
            id: "e1".into(),
            ts_ns: 1,
            kind: ChangeKind::Create,
            metadata: sample_metadata(),
            payload: None,
        };
        let err = event.validate().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }

    #[test]
    fn delete_without_payload_is_valid() {
        let event = Event {
            id: "e2".into(),
            ts_ns: 1,
            kind: ChangeKind::Delete,
            metadata: sample_metadata(),
            payload: None,
        };
        assert!(event.validate().is_ok());
    }

    #[test]
    fn encode_decode_roundtrip_preserves_event() {
        let event = Event {
            id: "e3".into(),
            ts_ns: 42,
            kind: ChangeKind::Update,
            metadata: sample_metadata(),
            payload: Some(serde_json::json!({"spec": {"replicas": 3}})),
        };
        let bytes = event.encode().unwrap();
        let decoded = Event::decode(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
