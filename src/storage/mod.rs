//! On-disk event store: binary block format, writer, reader, the
//! `StorageEngine` that owns open hour-files, and the `QueryExecutor` that
//! reads across them.

pub mod block;
pub mod engine;
pub mod query;
pub mod reader;
pub mod types;
pub mod writer;

pub use engine::{HealthSnapshot, StorageEngine, StorageFile};
pub use query::{QueryExecutor, QueryRequest, QueryResult, QueryStats};
pub use reader::HourFileReader;
pub use writer::{HourFileSummary, HourFileWriter};
