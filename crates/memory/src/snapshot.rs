//! JSON export of the whole memory, for backends without their own storage.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::records::{Concept, Episode, ProceduralStats};
use crate::MemoryError;

/// Everything the three tiers hold, as plain data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    #[serde(default)]
    pub episodic: Vec<Episode>,
    #[serde(default)]
    pub semantic: Vec<Concept>,
    #[serde(default)]
    pub procedural: Vec<ProceduralStats>,
}

impl MemorySnapshot {
    /// Write as pretty JSON, creating parent directories as needed.
    pub async fn write(&self, path: &Path) -> Result<(), MemoryError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(path, body).await?;
        info!(path = %path.display(), episodes = self.episodic.len(), "memory snapshot written");
        Ok(())
    }

    /// Read a snapshot; a missing file yields an empty snapshot.
    pub async fn read(path: &Path) -> Result<Self, MemoryError> {
        match tokio::fs::read(path).await {
            Ok(body) => Ok(serde_json::from_slice(&body)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }
}
