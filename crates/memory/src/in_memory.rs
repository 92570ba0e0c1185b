//! Process-local backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::backend::MemoryBackend;
use crate::records::{Concept, Episode, ProceduralStats, RunRecord};
use crate::MemoryError;

/// Keeps every tier in RAM. Each tier has its own lock; increments happen
/// while holding it.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    episodes: Mutex<Vec<Episode>>,
    concepts: Mutex<Vec<Concept>>,
    procedural: Mutex<BTreeMap<String, ProceduralStats>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend pre-populated from previously exported data.
    pub fn with_contents(
        episodes: Vec<Episode>,
        concepts: Vec<Concept>,
        procedural: Vec<ProceduralStats>,
    ) -> Self {
        Self {
            episodes: Mutex::new(episodes),
            concepts: Mutex::new(concepts),
            procedural: Mutex::new(procedural.into_iter().map(|s| (s.name.clone(), s)).collect()),
        }
    }
}

#[async_trait]
impl MemoryBackend for InMemoryBackend {
    async fn append_episode(&self, episode: &Episode) -> Result<(), MemoryError> {
        self.episodes.lock().await.push(episode.clone());
        Ok(())
    }

    async fn recent_episodes(&self, limit: usize) -> Result<Vec<Episode>, MemoryError> {
        let episodes = self.episodes.lock().await;
        let start = episodes.len().saturating_sub(limit);
        Ok(episodes[start..].to_vec())
    }

    async fn episode_count(&self) -> Result<u64, MemoryError> {
        Ok(self.episodes.lock().await.len() as u64)
    }

    async fn insert_concept(&self, concept: &Concept) -> Result<(), MemoryError> {
        self.concepts.lock().await.push(concept.clone());
        Ok(())
    }

    async fn concepts(&self) -> Result<Vec<Concept>, MemoryError> {
        Ok(self.concepts.lock().await.clone())
    }

    async fn record_run(&self, run: &RunRecord) -> Result<ProceduralStats, MemoryError> {
        let mut procedural = self.procedural.lock().await;
        let stats = procedural
            .entry(run.workflow.clone())
            .or_insert_with(|| ProceduralStats::empty(run.workflow.clone()));
        stats.absorb(run, Utc::now());
        Ok(stats.clone())
    }

    async fn procedural(&self, name: &str) -> Result<Option<ProceduralStats>, MemoryError> {
        Ok(self.procedural.lock().await.get(name).cloned())
    }

    async fn all_procedural(&self) -> Result<Vec<ProceduralStats>, MemoryError> {
        Ok(self.procedural.lock().await.values().cloned().collect())
    }
}
