//! Shared configuration for Tessera
//!
//! This crate provides the single source of truth for engine tuning shared
//! by the canvas engine and the command line tools: undo depth, snapshot
//! cadence, recording index density and flood fill defaults.
//!
//! Configuration is plain JSON. Missing fields fall back to the defaults
//! below, so a file only needs to name what it changes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Environment variable naming a config file to load
pub const CONFIG_ENV_VAR: &str = "TESSERA_CONFIG";

/// Default number of undo points kept per session
pub const DEFAULT_UNDO_DEPTH: usize = 30;

/// Default number of in-memory snapshots kept for seeking
pub const DEFAULT_SNAPSHOT_MAX_COUNT: usize = 5;

/// Default minimum time between two snapshots
pub const DEFAULT_SNAPSHOT_MIN_DELAY_MS: u64 = 10_000;

/// Default number of applied messages between two snapshots
pub const DEFAULT_SNAPSHOT_MESSAGE_INTERVAL: u64 = 500;

/// Default number of messages between two index thumbnails
pub const DEFAULT_THUMBNAIL_INTERVAL: u64 = 1000;

/// Default number of index entries between two index snapshots
pub const DEFAULT_INDEX_SNAPSHOT_INTERVAL: u64 = 2000;

/// Default longest edge of an index thumbnail in pixels
pub const DEFAULT_THUMBNAIL_SIZE: u32 = 128;

/// Default flood fill color tolerance (0.0 = exact match)
pub const DEFAULT_FILL_TOLERANCE: f32 = 0.01;

/// Default largest flood fill region in pixels
pub const DEFAULT_FILL_SIZE_LIMIT: u64 = 1_000_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unable to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// When the paint engine keeps a full canvas snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Oldest snapshots are dropped past this count
    pub max_count: usize,
    /// Minimum wall time between snapshots
    pub min_delay_ms: u64,
    /// Minimum applied messages between snapshots
    pub message_interval: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            max_count: DEFAULT_SNAPSHOT_MAX_COUNT,
            min_delay_ms: DEFAULT_SNAPSHOT_MIN_DELAY_MS,
            message_interval: DEFAULT_SNAPSHOT_MESSAGE_INTERVAL,
        }
    }
}

/// Density of a recording index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Messages between thumbnails
    pub thumbnail_interval: u64,
    /// Index entries between full snapshots
    pub snapshot_interval: u64,
    /// Longest thumbnail edge in pixels
    pub thumbnail_size: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            thumbnail_interval: DEFAULT_THUMBNAIL_INTERVAL,
            snapshot_interval: DEFAULT_INDEX_SNAPSHOT_INTERVAL,
            thumbnail_size: DEFAULT_THUMBNAIL_SIZE,
        }
    }
}

/// Shape used to grow or shrink a fill mask
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillKernel {
    #[default]
    Round,
    Square,
}

/// Flood fill tool defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FillConfig {
    pub tolerance: f32,
    /// Abort fills larger than this many pixels
    pub size_limit: u64,
    /// Grow (positive) or shrink (negative) the mask by this many pixels
    pub expand: i32,
    pub kernel: FillKernel,
    /// Blur radius for the mask edge
    pub feather: u32,
    /// Close gaps up to this many pixels wide
    pub gap: u32,
    /// Opacity used when committing, 0.0 to 1.0
    pub opacity: f32,
}

impl Default for FillConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_FILL_TOLERANCE,
            size_limit: DEFAULT_FILL_SIZE_LIMIT,
            expand: 0,
            kernel: FillKernel::Round,
            feather: 0,
            gap: 0,
            opacity: 1.0,
        }
    }
}

/// Top level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Undo points kept before old history folds into the base state
    pub undo_depth: usize,
    pub snapshots: SnapshotConfig,
    pub index: IndexConfig,
    pub fill: FillConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            undo_depth: DEFAULT_UNDO_DEPTH,
            snapshots: SnapshotConfig::default(),
            index: IndexConfig::default(),
            fill: FillConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load a JSON config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load the file named by `TESSERA_CONFIG`, or the defaults if it is unset
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) if !path.is_empty() => Self::load(Path::new(&path)),
            _ => Ok(Self::default()),
        }
    }

    /// Pretty JSON for writing a config file
    pub fn to_json(&self) -> String {
        // Plain structs with string keys always serialize
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.undo_depth, DEFAULT_UNDO_DEPTH);
        assert_eq!(config.snapshots.max_count, DEFAULT_SNAPSHOT_MAX_COUNT);
        assert_eq!(config.index.thumbnail_size, DEFAULT_THUMBNAIL_SIZE);
        assert_eq!(config.fill.kernel, FillKernel::Round);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{ "undo_depth": 5, "fill": { "gap": 3, "kernel": "square" } }"#).unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.undo_depth, 5);
        assert_eq!(config.fill.gap, 3);
        assert_eq!(config.fill.kernel, FillKernel::Square);
        assert_eq!(config.fill.tolerance, DEFAULT_FILL_TOLERANCE);
        assert_eq!(config.snapshots, SnapshotConfig::default());
    }

    #[test]
    fn test_json_roundtrip() {
        let mut config = EngineConfig::default();
        config.index.snapshot_interval = 7;
        let parsed: EngineConfig = serde_json::from_str(&config.to_json()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(EngineConfig::load(&missing), Err(ConfigError::Io { .. })));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ not json").unwrap();
        assert!(matches!(EngineConfig::load(&bad), Err(ConfigError::Parse { .. })));
    }
}
