//! `memory` crate — three-tier memory shared across task executions.
//!
//! * **episodic** — append-only log of completed tasks;
//! * **semantic** — concepts keyed by embedding vectors, searchable by
//!   cosine similarity;
//! * **procedural** — running statistics per workflow, updated after every
//!   workflow execution.
//!
//! Nothing here ever deletes history. Storage is pluggable through
//! [`MemoryBackend`]; [`InMemoryBackend`] and [`SqlBackend`] ship with the
//! crate.

pub mod backend;
pub mod config;
pub mod error;
pub mod in_memory;
pub mod records;
pub mod similarity;
pub mod snapshot;
pub mod sql;

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, instrument};

pub use backend::MemoryBackend;
pub use config::{BackendKind, MemoryConfig};
pub use error::MemoryError;
pub use in_memory::InMemoryBackend;
pub use records::{Concept, Episode, ProceduralStats, RunRecord, SemanticMatch};
pub use snapshot::MemorySnapshot;
pub use sql::SqlBackend;

/// Default embedding dimension.
pub const DEFAULT_EMBEDDING_DIM: usize = 384;

/// Facade over one [`MemoryBackend`]. Cheap to clone; clones share storage.
#[derive(Clone)]
pub struct HierarchicalMemory {
    backend: Arc<dyn MemoryBackend>,
    embedding_dim: usize,
}

impl std::fmt::Debug for HierarchicalMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HierarchicalMemory")
            .field("embedding_dim", &self.embedding_dim)
            .finish_non_exhaustive()
    }
}

impl HierarchicalMemory {
    pub fn new(backend: Arc<dyn MemoryBackend>, embedding_dim: usize) -> Self {
        Self { backend, embedding_dim }
    }

    /// Empty RAM-only memory with the default embedding dimension.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryBackend::new()), DEFAULT_EMBEDDING_DIM)
    }

    /// Build the backend described by `config`.
    ///
    /// The SQLite backend connects and runs migrations; the in-memory
    /// backend loads `snapshot_path` when one is configured.
    pub async fn connect(config: &MemoryConfig) -> Result<Self, MemoryError> {
        match config.backend {
            BackendKind::Sqlite => {
                let pool = db::pool::create_pool(&config.database_url, config.max_connections).await?;
                db::pool::run_migrations(&pool).await?;
                info!(url = %config.database_url, "sqlite memory backend ready");
                Ok(Self::new(Arc::new(SqlBackend::new(pool)), config.embedding_dim))
            }
            BackendKind::InMemory => match &config.snapshot_path {
                Some(path) => Self::load_json(path, config.embedding_dim).await,
                None => Ok(Self::new(Arc::new(InMemoryBackend::new()), config.embedding_dim)),
            },
        }
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    pub fn backend(&self) -> &Arc<dyn MemoryBackend> {
        &self.backend
    }

    // -----------------------------------------------------------------------
    // Episodic
    // -----------------------------------------------------------------------

    #[instrument(skip_all, fields(episode_id = %episode.id))]
    pub async fn add_episodic(&self, episode: &Episode) -> Result<(), MemoryError> {
        self.backend.append_episode(episode).await?;
        debug!("episode recorded");
        Ok(())
    }

    pub async fn recent_episodic(&self, limit: usize) -> Result<Vec<Episode>, MemoryError> {
        self.backend.recent_episodes(limit).await
    }

    pub async fn episode_count(&self) -> Result<u64, MemoryError> {
        self.backend.episode_count().await
    }

    // -----------------------------------------------------------------------
    // Semantic
    // -----------------------------------------------------------------------

    pub async fn add_semantic(&self, concept: &Concept) -> Result<(), MemoryError> {
        self.check_dim(concept.embedding.len())?;
        self.backend.insert_concept(concept).await
    }

    /// The `top_k` concepts most similar to `query`, best first.
    pub async fn search_semantic(
        &self,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<SemanticMatch>, MemoryError> {
        self.check_dim(query.len())?;
        let concepts = self.backend.concepts().await?;
        Ok(similarity::nearest(concepts, query, top_k))
    }

    fn check_dim(&self, found: usize) -> Result<(), MemoryError> {
        if found == self.embedding_dim {
            Ok(())
        } else {
            Err(MemoryError::DimensionMismatch { expected: self.embedding_dim, found })
        }
    }

    // -----------------------------------------------------------------------
    // Procedural
    // -----------------------------------------------------------------------

    #[instrument(skip_all, fields(workflow = %run.workflow, success = run.success))]
    pub async fn record_run(&self, run: &RunRecord) -> Result<ProceduralStats, MemoryError> {
        let stats = self.backend.record_run(run).await?;
        debug!(invocations = stats.invocations, "procedural stats updated");
        Ok(stats)
    }

    pub async fn procedural(&self, name: &str) -> Result<Option<ProceduralStats>, MemoryError> {
        self.backend.procedural(name).await
    }

    pub async fn all_procedural(&self) -> Result<Vec<ProceduralStats>, MemoryError> {
        self.backend.all_procedural().await
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    pub async fn export_snapshot(&self) -> Result<MemorySnapshot, MemoryError> {
        Ok(MemorySnapshot {
            episodic: self.backend.recent_episodes(usize::MAX).await?,
            semantic: self.backend.concepts().await?,
            procedural: self.backend.all_procedural().await?,
        })
    }

    pub async fn save_json(&self, path: &Path) -> Result<(), MemoryError> {
        self.export_snapshot().await?.write(path).await
    }

    /// RAM-only memory seeded from a snapshot file (empty if it is missing).
    pub async fn load_json(path: &Path, embedding_dim: usize) -> Result<Self, MemoryError> {
        let snapshot = MemorySnapshot::read(path).await?;
        info!(
            path = %path.display(),
            episodes = snapshot.episodic.len(),
            concepts = snapshot.semantic.len(),
            "memory snapshot loaded"
        );
        let backend = InMemoryBackend::with_contents(
            snapshot.episodic,
            snapshot.semantic,
            snapshot.procedural,
        );
        Ok(Self::new(Arc::new(backend), embedding_dim))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    async fn sql_memory(dim: usize) -> HierarchicalMemory {
        let pool = db::pool::in_memory().await.expect("sqlite pool");
        HierarchicalMemory::new(Arc::new(SqlBackend::new(pool)), dim)
    }

    fn run(workflow: &str, success: bool) -> RunRecord {
        RunRecord { workflow: workflow.into(), success, cost: 1.0, duration_ms: 3 }
    }

    async fn exercise_tiers(memory: HierarchicalMemory) {
        // episodic
        for i in 0..3 {
            let episode = Episode::new(Uuid::new_v4(), json!({ "task": i }), json!({ "done": i }));
            memory.add_episodic(&episode).await.unwrap();
        }
        let recent = memory.recent_episodic(2).await.unwrap();
        assert_eq!(memory.episode_count().await.unwrap(), 3);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].input, json!({ "task": 1 }));
        assert_eq!(recent[1].input, json!({ "task": 2 }));

        // semantic
        memory.add_semantic(&Concept::new(vec![1.0, 0.0], json!("x-axis"))).await.unwrap();
        memory.add_semantic(&Concept::new(vec![0.0, 1.0], json!("y-axis"))).await.unwrap();
        let hits = memory.search_semantic(&[0.1, 0.9], 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].concept.content, json!("y-axis"));

        // procedural
        memory.record_run(&run("research", true)).await.unwrap();
        let stats = memory.record_run(&run("research", false)).await.unwrap();
        assert_eq!(stats.invocations, 2);
        assert_eq!(stats.successes, 1);
        assert_eq!(memory.procedural("research").await.unwrap(), Some(stats));
        assert_eq!(memory.procedural("unknown").await.unwrap(), None);
    }

    #[tokio::test]
    async fn in_memory_backend_supports_every_tier() {
        exercise_tiers(HierarchicalMemory::new(Arc::new(InMemoryBackend::new()), 2)).await;
    }

    #[tokio::test]
    async fn sql_backend_supports_every_tier() {
        exercise_tiers(sql_memory(2).await).await;
    }

    #[tokio::test]
    async fn wrong_embedding_dimension_is_rejected() {
        let memory = HierarchicalMemory::in_memory();
        let err = memory
            .add_semantic(&Concept::new(vec![1.0, 2.0], json!("short")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MemoryError::DimensionMismatch { expected: DEFAULT_EMBEDDING_DIM, found: 2 }
        ));
        assert!(memory.search_semantic(&[0.0; 3], 5).await.is_err());
    }

    #[tokio::test]
    async fn concurrent_runs_never_lose_increments() {
        for memory in [HierarchicalMemory::in_memory(), sql_memory(4).await] {
            let tasks: Vec<_> = (0..20)
                .map(|_| {
                    let memory = memory.clone();
                    tokio::spawn(async move { memory.record_run(&run("shared", true)).await })
                })
                .collect();
            for task in tasks {
                task.await.expect("join").expect("record");
            }

            let stats = memory.procedural("shared").await.unwrap().expect("stats");
            assert_eq!(stats.invocations, 20);
            assert_eq!(stats.successes, 20);
        }
    }

    #[tokio::test]
    async fn json_snapshot_round_trips_all_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("memory.json");

        let memory = HierarchicalMemory::new(Arc::new(InMemoryBackend::new()), 2);
        memory
            .add_episodic(&Episode::new(Uuid::new_v4(), json!("in"), json!("out")))
            .await
            .unwrap();
        memory.add_semantic(&Concept::new(vec![0.5, 0.5], json!("diag"))).await.unwrap();
        memory.record_run(&run("wf", true)).await.unwrap();
        memory.save_json(&path).await.unwrap();

        let restored = HierarchicalMemory::load_json(&path, 2).await.unwrap();
        assert_eq!(restored.export_snapshot().await.unwrap(), memory.export_snapshot().await.unwrap());
    }

    #[tokio::test]
    async fn missing_snapshot_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let memory = HierarchicalMemory::load_json(&dir.path().join("absent.json"), 2).await.unwrap();
        assert_eq!(memory.episode_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn connect_builds_sqlite_backend_from_config() {
        let config = MemoryConfig {
            backend: BackendKind::Sqlite,
            database_url: "sqlite::memory:".into(),
            max_connections: 1,
            embedding_dim: 3,
            snapshot_path: None,
        };
        let memory = HierarchicalMemory::connect(&config).await.unwrap();
        memory.record_run(&run("wf", true)).await.unwrap();
        assert_eq!(memory.all_procedural().await.unwrap().len(), 1);
        assert_eq!(memory.embedding_dim(), 3);
    }
}
