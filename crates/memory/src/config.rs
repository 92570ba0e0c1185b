//! Memory configuration (`[memory]` section of the engine config).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which storage medium backs the memory tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// RAM only, optionally persisted through a JSON snapshot file.
    #[default]
    InMemory,
    /// SQLite through the `db` crate.
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub backend: BackendKind,
    /// Used by the SQLite backend.
    pub database_url: String,
    pub max_connections: u32,
    /// Dimension every semantic embedding must have.
    pub embedding_dim: usize,
    /// Used by the in-memory backend: loaded on connect, written on save.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::InMemory,
            database_url: "sqlite://metabrain.db".to_string(),
            max_connections: 5,
            embedding_dim: 384,
            snapshot_path: None,
        }
    }
}
