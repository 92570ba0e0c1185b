//! SQLite-backed backend built on the `db` repositories.

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

use db::models::{ConceptRow, EpisodeRow, ProceduralRow};
use db::repository::{concepts, episodes, procedural};
use db::DbPool;

use crate::backend::MemoryBackend;
use crate::records::{Concept, Episode, ProceduralStats, RunRecord};
use crate::MemoryError;

/// Persists every tier through a [`DbPool`]. Migrations must have been run.
#[derive(Debug, Clone)]
pub struct SqlBackend {
    pool: DbPool,
}

impl SqlBackend {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl MemoryBackend for SqlBackend {
    async fn append_episode(&self, episode: &Episode) -> Result<(), MemoryError> {
        let row = EpisodeRow {
            id: episode.id.to_string(),
            context_id: episode.context_id.to_string(),
            recorded_at: episode.recorded_at,
            input: serde_json::to_string(&episode.input)?,
            output: serde_json::to_string(&episode.output)?,
            workflows: serde_json::to_string(&episode.workflows)?,
            success: episode.success,
            fallback: episode.fallback,
        };
        episodes::append_episode(&self.pool, &row).await?;
        debug!(episode_id = %episode.id, "episode persisted");
        Ok(())
    }

    async fn recent_episodes(&self, limit: usize) -> Result<Vec<Episode>, MemoryError> {
        let limit = u32::try_from(limit).unwrap_or(u32::MAX);
        episodes::recent_episodes(&self.pool, limit)
            .await?
            .into_iter()
            .map(episode_from_row)
            .collect()
    }

    async fn episode_count(&self) -> Result<u64, MemoryError> {
        Ok(episodes::count_episodes(&self.pool).await?)
    }

    async fn insert_concept(&self, concept: &Concept) -> Result<(), MemoryError> {
        let row = ConceptRow {
            id: concept.id.to_string(),
            embedding: serde_json::to_string(&concept.embedding)?,
            content: serde_json::to_string(&concept.content)?,
            created_at: concept.created_at,
        };
        concepts::insert_concept(&self.pool, &row).await?;
        Ok(())
    }

    async fn concepts(&self) -> Result<Vec<Concept>, MemoryError> {
        concepts::list_concepts(&self.pool)
            .await?
            .into_iter()
            .map(concept_from_row)
            .collect()
    }

    async fn record_run(&self, run: &RunRecord) -> Result<ProceduralStats, MemoryError> {
        let duration_ms = i64::try_from(run.duration_ms).unwrap_or(i64::MAX);
        let row = procedural::record_run(
            &self.pool,
            &run.workflow,
            run.success,
            run.cost,
            duration_ms,
            Utc::now(),
        )
        .await?;
        Ok(stats_from_row(row))
    }

    async fn procedural(&self, name: &str) -> Result<Option<ProceduralStats>, MemoryError> {
        match procedural::get_stats(&self.pool, name).await {
            Ok(row) => Ok(Some(stats_from_row(row))),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn all_procedural(&self) -> Result<Vec<ProceduralStats>, MemoryError> {
        Ok(procedural::list_stats(&self.pool)
            .await?
            .into_iter()
            .map(stats_from_row)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Row conversion
// ---------------------------------------------------------------------------

fn episode_from_row(row: EpisodeRow) -> Result<Episode, MemoryError> {
    Ok(Episode {
        id: parse_uuid("episodes", &row.id, &row.id)?,
        context_id: parse_uuid("episodes", &row.id, &row.context_id)?,
        recorded_at: row.recorded_at,
        input: decode("episodes", &row.id, &row.input)?,
        output: decode("episodes", &row.id, &row.output)?,
        workflows: decode("episodes", &row.id, &row.workflows)?,
        success: row.success,
        fallback: row.fallback,
    })
}

fn concept_from_row(row: ConceptRow) -> Result<Concept, MemoryError> {
    Ok(Concept {
        id: parse_uuid("concepts", &row.id, &row.id)?,
        embedding: decode("concepts", &row.id, &row.embedding)?,
        content: decode("concepts", &row.id, &row.content)?,
        created_at: row.created_at,
    })
}

fn stats_from_row(row: ProceduralRow) -> ProceduralStats {
    ProceduralStats {
        name: row.name,
        invocations: row.invocations.max(0) as u64,
        successes: row.successes.max(0) as u64,
        total_cost: row.total_cost,
        total_duration_ms: row.total_duration_ms.max(0) as u64,
        last_run_at: row.last_run_at,
    }
}

fn parse_uuid(table: &'static str, id: &str, raw: &str) -> Result<Uuid, MemoryError> {
    Uuid::parse_str(raw).map_err(|e| MemoryError::Corrupt {
        table,
        id: id.to_owned(),
        message: e.to_string(),
    })
}

fn decode<T: DeserializeOwned>(table: &'static str, id: &str, raw: &str) -> Result<T, MemoryError> {
    serde_json::from_str(raw).map_err(|e| MemoryError::Corrupt {
        table,
        id: id.to_owned(),
        message: e.to_string(),
    })
}
