//! Engine configuration lookup for the command line

use std::path::Path;

use anyhow::Context;
use tessera_config::EngineConfig;
use tracing::debug;

/// Configuration from `path`, else from `$TESSERA_CONFIG`, else defaults.
pub fn load(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::from_env().context("loading config from TESSERA_CONFIG")?,
    };
    debug!("Engine config: {}", config.to_json());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{ "undo_depth": 7 }"#).unwrap();
        let config = load(Some(&path)).unwrap();
        assert_eq!(config.undo_depth, 7);
    }

    #[test]
    fn test_bad_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(load(Some(&path)).is_err());
    }
}
