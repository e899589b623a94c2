//! `Component`: the unit the lifecycle coordinator starts and stops.

use async_trait::async_trait;

use crate::error::Result;

/// A startable/stoppable unit of the process (e.g. the storage engine, a
/// background metrics exporter). `start`/`stop` are async since real
/// components do I/O (opening files, flushing writers) on both paths.
#[async_trait]
pub trait Component: Send + Sync {
    fn name(&self) -> &str;
    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
}
