//! The `Extractor` trait every relationship extractor implements, and the
//! per-event dispatch contract the registry drives.

use crate::error::Result;
use crate::graph_store::ResourceLookup;
use crate::model::{Edge, Event};

/// A pure function from `(event, lookup)` to zero or more edges. Each
/// extractor owns one concrete relationship kind (or a small family of
/// closely related ones, as with the GitOps manager flavors).
pub trait Extractor: Send + Sync {
    /// Stable name, used to attribute dispatch errors and metrics.
    fn name(&self) -> &str;

    /// Ascending priority: lower runs first. Ties break by registration
    /// order, which the registry — not the extractor — is responsible for.
    fn priority(&self) -> i32;

    /// Whether this extractor has anything to say about `event`. Checked
    /// before `extract_relationships` so non-matching extractors impose no
    /// per-event cost beyond this predicate.
    fn matches(&self, event: &Event) -> bool;

    /// Produce this extractor's edges for `event`. Only called when
    /// `matches` returned true.
    fn extract_relationships(&self, event: &Event, lookup: &dyn ResourceLookup) -> Result<Vec<Edge>>;
}
