//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models with no domain behaviour. JSON
//! columns are kept as raw text; decoding them is the memory crate's job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// episodes
// ---------------------------------------------------------------------------

/// A persisted episodic-memory row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EpisodeRow {
    pub id: String,
    pub context_id: String,
    pub recorded_at: DateTime<Utc>,
    /// JSON-encoded task input.
    pub input: String,
    /// JSON-encoded final output.
    pub output: String,
    /// JSON array of workflow names executed for the task.
    pub workflows: String,
    pub success: bool,
    pub fallback: bool,
}

// ---------------------------------------------------------------------------
// concepts
// ---------------------------------------------------------------------------

/// A persisted semantic-memory row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConceptRow {
    pub id: String,
    /// JSON array of `f32`.
    pub embedding: String,
    /// JSON-encoded conceptual content.
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// procedural_stats
// ---------------------------------------------------------------------------

/// Running performance statistics for one workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ProceduralRow {
    pub name: String,
    pub invocations: i64,
    pub successes: i64,
    pub total_cost: f64,
    pub total_duration_ms: i64,
    pub last_run_at: Option<DateTime<Utc>>,
}
