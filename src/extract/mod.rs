//! Relationship extraction: the pull-based registry, the `Extractor`
//! contract, evidence-weighted confidence scoring, and the five concrete
//! extractors over observed Kubernetes resource events.

pub mod confidence;
pub mod gitops;
pub mod observed;
pub mod owner;
pub mod registry;
pub mod selector;
pub mod spec_ref;
pub mod traits;

pub use confidence::GitOpsConfig;
pub use gitops::GitOpsManagerExtractor;
pub use observed::ObservedCreationExtractor;
pub use owner::OwnerReferenceExtractor;
pub use registry::ExtractorRegistry;
pub use selector::SelectorExtractor;
pub use spec_ref::SpecReferenceExtractor;
pub use traits::Extractor;
