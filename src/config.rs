//! Engine configuration, loaded from a YAML file or built programmatically.
//!
//! Every field has a documented default so a caller can start from
//! `SpectreConfig::default()` and override only what matters for their
//! deployment, the same way the storage engine's tunables were exposed as
//! constructor arguments in the teacher, just collected here into one
//! serde-deserializable struct instead of scattered call-site constants.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default maximum size, in bytes, of an uncompressed block before it is
/// flushed to the current hour-file.
pub const DEFAULT_BLOCK_SIZE_BYTES: u64 = 256 * 1024;

/// Default block cache capacity.
pub const DEFAULT_CACHE_CAP_BYTES: u64 = 64 * 1024 * 1024;

/// Default age, from an hour-file's hour boundary, after which the storage
/// engine's background closer task finalizes it.
pub const DEFAULT_HOUR_FILE_MAX_AGE: Duration = Duration::from_secs(2 * 3600);

/// Default interval at which the background closer task wakes up to check
/// hour-file ages.
pub const DEFAULT_CLOSER_TICK_INTERVAL: Duration = Duration::from_secs(60);

/// Default bound on in-flight shutdown work before a component is
/// considered unresponsive by the lifecycle coordinator.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Default cap on the number of blocks a single query may scan before
/// returning a partial result. Resolves the "is 500 configurable" question
/// by making it a config field with this as its out-of-the-box value.
pub const DEFAULT_MAX_BLOCKS_PER_QUERY: usize = 500;

/// Top-level configuration for a Spectre storage engine + extractor
/// pipeline instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectreConfig {
    /// Directory under which hour-files are created and looked up.
    pub storage_root: PathBuf,

    /// Block rotation threshold, in bytes, before a block is compressed and
    /// appended to the current hour-file.
    pub block_size_bytes: u64,

    /// Block cache capacity in bytes. A single block larger than this is
    /// rejected from caching rather than evicting everything else.
    pub cache_cap_bytes: u64,

    /// How long after its hour boundary an hour-file becomes eligible for
    /// the background closer to finalize it.
    #[serde(with = "duration_secs")]
    pub hour_file_max_age: Duration,

    /// How often the background closer task re-checks hour-file ages.
    #[serde(with = "duration_secs")]
    pub closer_tick_interval: Duration,

    /// Bound on how long the lifecycle coordinator waits for a single
    /// component to stop before moving on.
    #[serde(with = "duration_secs")]
    pub shutdown_grace: Duration,

    /// Upper bound on blocks scanned per query, after index pruning, before
    /// the executor stops and returns what it has.
    pub max_blocks_per_query: usize,

    /// Names of extractors to register, in the order given. An empty list
    /// means "register everything the binary knows about" is left to the
    /// caller; the config itself does not hardcode the registry's contents.
    pub extractors: Vec<String>,

    /// Minimum confidence score, in `[0.0, 1.0]`, for an extracted edge to
    /// be emitted to the graph store rather than discarded.
    pub min_emit_confidence: f64,
}

impl Default for SpectreConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("./spectre-data"),
            block_size_bytes: DEFAULT_BLOCK_SIZE_BYTES,
            cache_cap_bytes: DEFAULT_CACHE_CAP_BYTES,
            hour_file_max_age: DEFAULT_HOUR_FILE_MAX_AGE,
            closer_tick_interval: DEFAULT_CLOSER_TICK_INTERVAL,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            max_blocks_per_query: DEFAULT_MAX_BLOCKS_PER_QUERY,
            extractors: Vec::new(),
            min_emit_confidence: 0.5,
        }
    }
}

impl SpectreConfig {
    /// Load configuration from a YAML file, falling back to defaults for
    /// any field the file omits.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&contents)?;
        Ok(config)
    }
}

/// `serde(with)` module for `Duration` fields stored as plain seconds in
/// YAML, since `Duration`'s own serde impl is a nested struct.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        value.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_documented_defaults() {
        let config = SpectreConfig::default();
        assert_eq!(config.block_size_bytes, DEFAULT_BLOCK_SIZE_BYTES);
        assert_eq!(config.cache_cap_bytes, DEFAULT_CACHE_CAP_BYTES);
        assert_eq!(config.max_blocks_per_query, DEFAULT_MAX_BLOCKS_PER_QUERY);
        assert_eq!(config.min_emit_confidence, 0.5);
        assert!(config.extractors.is_empty());
    }

    #[test]
    fn partial_yaml_falls_back_to_defaults() {
        let yaml = "storage_root: /var/lib/spectre\nblock_size_bytes: 1048576\n";
        let config: SpectreConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.storage_root, PathBuf::from("/var/lib/spectre"));
        assert_eq!(config.block_size_bytes, 1_048_576);
        assert_eq!(config.cache_cap_bytes, DEFAULT_CACHE_CAP_BYTES);
    }

    #[test]
    fn duration_fields_roundtrip_as_seconds() {
        let yaml = "hour_file_max_age: 120\nclosure_tick_interval: 5\n";
        let config: SpectreConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.hour_file_max_age, Duration::from_secs(120));
    }

    #[test]
    fn load_missing_file_returns_io_error() {
        let err = SpectreConfig::load("/nonexistent/path/spectre.yaml").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Io);
    }
}
