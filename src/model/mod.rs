//! Domain types shared by the storage engine and the extractor pipeline:
//! the event the core ingests, the edges it produces, and the path-based
//! accessor extractors use to read opaque resource payloads.

pub mod edge;
pub mod event;
pub mod path;

pub use edge::{Edge, EdgeProperties, EdgeType, EvidenceItem, EvidenceKind, ValidationState};
pub use event::{ChangeKind, Event, ResourceMetadata};
pub use path::get_path;
