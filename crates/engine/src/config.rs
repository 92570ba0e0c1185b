//! Engine configuration, read from TOML.
//!
//! ```toml
//! [executor]
//! dispatch = "concurrent"
//! conflict_policy = "reject"
//! max_waves = 64
//!
//! [memory]
//! backend = "sqlite"
//! database_url = "sqlite://metabrain.db"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use memory::MemoryConfig;

use crate::executor::ExecutorConfig;
use crate::EngineError;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Applied to workflows loaded from definitions.
    pub executor: ExecutorConfig,
    pub memory: MemoryConfig,
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, EngineError> {
        toml::from_str(raw).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        let config = Self::from_toml_str(&raw)?;
        debug!(path = %path.display(), ?config, "engine config loaded");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ConflictPolicy, WaveDispatch};
    use memory::BackendKind;

    #[test]
    fn empty_file_is_all_defaults() {
        assert_eq!(EngineConfig::from_toml_str("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn sections_are_parsed() {
        let config = EngineConfig::from_toml_str(
            r#"
            [executor]
            dispatch = "concurrent"
            conflict_policy = "last_writer_wins"
            max_waves = 8

            [memory]
            backend = "sqlite"
            database_url = "sqlite::memory:"
            "#,
        )
        .unwrap();

        assert_eq!(config.executor.dispatch, WaveDispatch::Concurrent);
        assert_eq!(config.executor.conflict_policy, ConflictPolicy::LastWriterWins);
        assert_eq!(config.executor.max_waves, Some(8));
        assert_eq!(config.memory.backend, BackendKind::Sqlite);
        assert_eq!(config.memory.database_url, "sqlite::memory:");
        assert_eq!(config.memory.embedding_dim, memory::DEFAULT_EMBEDDING_DIM);
    }

    #[test]
    fn unknown_variant_is_a_config_error() {
        let err = EngineConfig::from_toml_str("[executor]\ndispatch = \"sideways\"").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metabrain.toml");
        std::fs::write(&path, "[executor]\nmax_waves = 3\n").unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap().executor.max_waves, Some(3));
        assert!(matches!(EngineConfig::load(&dir.path().join("missing.toml")), Err(EngineError::Config(_))));
    }
}
