//! Error types for the storage engine, extractor pipeline, and lifecycle coordinator.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SpectreError>;

/// Error taxonomy for the Spectre core. Variants map to the surface kinds in
/// the design rather than to internal type names, so callers can match on
/// `kind()` without depending on exact message text.
#[derive(Error, Debug)]
pub enum SpectreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("bad format: {0}")]
    BadFormat(String),

    #[error("corrupted block {block_id} in {context}: {reason}")]
    Corruption {
        context: String,
        block_id: u32,
        reason: String,
    },

    #[error("file not finalized: {0}")]
    NotFinalized(String),

    #[error("too large: {0}")]
    TooLarge(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("extractor '{name}' failed: {source}")]
    ExtractorFailure {
        name: String,
        #[source]
        source: Box<SpectreError>,
    },

    #[error("internal invariant broken: {0}")]
    Internal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] serde_yaml::Error),
}

/// Coarse-grained error kind, used by callers that need to branch on the
/// taxonomy (e.g. the read path, which recovers from `BadFormat`/`Corruption`
/// for a single block or file rather than failing the whole query).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    BadFormat,
    Corruption,
    NotFinalized,
    TooLarge,
    Cancelled,
    Timeout,
    ExtractorFailure,
    Internal,
    Io,
}

impl SpectreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SpectreError::Validation(_) => ErrorKind::Validation,
            SpectreError::BadFormat(_) => ErrorKind::BadFormat,
            SpectreError::Corruption { .. } => ErrorKind::Corruption,
            SpectreError::NotFinalized(_) => ErrorKind::NotFinalized,
            SpectreError::TooLarge(_) => ErrorKind::TooLarge,
            SpectreError::Cancelled => ErrorKind::Cancelled,
            SpectreError::Timeout(_) => ErrorKind::Timeout,
            SpectreError::ExtractorFailure { .. } => ErrorKind::ExtractorFailure,
            SpectreError::Internal(_) => ErrorKind::Internal,
            SpectreError::Io(_)
            | SpectreError::Serialization(_)
            | SpectreError::Json(_)
            | SpectreError::Config(_) => ErrorKind::Io,
        }
    }

    /// Whether a read-path error for a single block should be recovered by
    /// skipping that block and continuing, per the propagation policy.
    pub fn is_block_recoverable(&self) -> bool {
        matches!(self.kind(), ErrorKind::BadFormat | ErrorKind::Corruption)
    }
}
