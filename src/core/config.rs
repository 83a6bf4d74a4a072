//! Streaming configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::Result;

/// Static capacities for the cache and the resource materializer.
///
/// All capacities are fixed for the lifetime of the managers built from it.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Byte capacity of the asset cache slab.
    pub cache_capacity: usize,
    /// Number of resource slots in the materializer pool.
    pub max_resources: usize,
    /// Number of staging leases (bounds uploads in flight).
    pub staging_leases: usize,
    /// Bytes a returned staging buffer may keep allocated.
    pub staging_buffer_size: usize,
    /// Nominal capacity of the deferred-destroy ring.
    pub deferred_capacity: usize,
    /// Threads used by the default background loader pool.
    pub worker_threads: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 64 * 1024 * 1024, // 64 MiB
            max_resources: 4096,
            staging_leases: 8,
            staging_buffer_size: 4 * 1024 * 1024, // 4 MiB
            deferred_capacity: 1024,
            worker_threads: 2,
        }
    }
}

impl StreamingConfig {
    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a config from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = StreamingConfig::from_json(r#"{ "cache_capacity": 1048576 }"#).unwrap();
        assert_eq!(config.cache_capacity, 1024 * 1024);
        assert_eq!(config.max_resources, StreamingConfig::default().max_resources);
        assert_eq!(config.staging_leases, 8);
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let err = StreamingConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, crate::core::Error::Config(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("streaming.json");
        std::fs::write(&path, r#"{ "worker_threads": 6, "deferred_capacity": 16 }"#).unwrap();

        let config = StreamingConfig::load(&path).unwrap();
        assert_eq!(config.worker_threads, 6);
        assert_eq!(config.deferred_capacity, 16);
    }
}
