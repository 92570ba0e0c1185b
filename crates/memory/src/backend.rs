//! Storage seam behind [`HierarchicalMemory`](crate::HierarchicalMemory).

use async_trait::async_trait;

use crate::records::{Concept, Episode, ProceduralStats, RunRecord};
use crate::MemoryError;

/// Persistence primitives the three memory tiers need.
///
/// Episodic and procedural stores only ever append or increment; the
/// semantic store only inserts. `record_run` must be atomic per workflow
/// name: two concurrent runs of the same workflow both count.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    async fn append_episode(&self, episode: &Episode) -> Result<(), MemoryError>;

    /// The `limit` most recent episodes, oldest first.
    async fn recent_episodes(&self, limit: usize) -> Result<Vec<Episode>, MemoryError>;

    async fn episode_count(&self) -> Result<u64, MemoryError>;

    async fn insert_concept(&self, concept: &Concept) -> Result<(), MemoryError>;

    /// Every stored concept in insertion order.
    async fn concepts(&self) -> Result<Vec<Concept>, MemoryError>;

    /// Fold `run` into the workflow's statistics and return the new totals.
    async fn record_run(&self, run: &RunRecord) -> Result<ProceduralStats, MemoryError>;

    async fn procedural(&self, name: &str) -> Result<Option<ProceduralStats>, MemoryError>;

    /// All statistics, ordered by name.
    async fn all_procedural(&self) -> Result<Vec<ProceduralStats>, MemoryError>;
}
