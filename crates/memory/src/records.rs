//! Records kept by the three memory tiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Episodic
// ---------------------------------------------------------------------------

/// One completed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub id: Uuid,
    /// Context the task ran in.
    pub context_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub input: Value,
    pub output: Value,
    /// Workflows executed, in order.
    pub workflows: Vec<String>,
    pub success: bool,
    /// The overflow fallback fired during the task.
    pub fallback: bool,
}

impl Episode {
    pub fn new(context_id: Uuid, input: Value, output: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            context_id,
            recorded_at: Utc::now(),
            input,
            output,
            workflows: Vec::new(),
            success: true,
            fallback: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Semantic
// ---------------------------------------------------------------------------

/// Conceptual content keyed by an embedding vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub id: Uuid,
    pub embedding: Vec<f32>,
    pub content: Value,
    pub created_at: DateTime<Utc>,
}

impl Concept {
    pub fn new(embedding: Vec<f32>, content: Value) -> Self {
        Self { id: Uuid::new_v4(), embedding, content, created_at: Utc::now() }
    }
}

/// A nearest-neighbour hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticMatch {
    pub concept: Concept,
    /// Cosine similarity to the query, in `[-1, 1]`.
    pub score: f32,
}

// ---------------------------------------------------------------------------
// Procedural
// ---------------------------------------------------------------------------

/// Outcome of one workflow execution, folded into [`ProceduralStats`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub workflow: String,
    pub success: bool,
    pub cost: f64,
    pub duration_ms: u64,
}

/// Running performance statistics for one workflow or skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProceduralStats {
    pub name: String,
    pub invocations: u64,
    pub successes: u64,
    pub total_cost: f64,
    pub total_duration_ms: u64,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl ProceduralStats {
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            invocations: 0,
            successes: 0,
            total_cost: 0.0,
            total_duration_ms: 0,
            last_run_at: None,
        }
    }

    /// Fold one run in.
    pub fn absorb(&mut self, run: &RunRecord, at: DateTime<Utc>) {
        self.invocations += 1;
        if run.success {
            self.successes += 1;
        }
        self.total_cost += run.cost;
        self.total_duration_ms += run.duration_ms;
        self.last_run_at = Some(at);
    }

    pub fn success_rate(&self) -> f64 {
        if self.invocations == 0 {
            0.0
        } else {
            self.successes as f64 / self.invocations as f64
        }
    }

    pub fn mean_cost(&self) -> f64 {
        if self.invocations == 0 {
            0.0
        } else {
            self.total_cost / self.invocations as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absorb_accumulates() {
        let mut stats = ProceduralStats::empty("wf");
        let ok = RunRecord { workflow: "wf".into(), success: true, cost: 2.0, duration_ms: 10 };
        let bad = RunRecord { workflow: "wf".into(), success: false, cost: 1.0, duration_ms: 4 };

        stats.absorb(&ok, Utc::now());
        stats.absorb(&bad, Utc::now());

        assert_eq!(stats.invocations, 2);
        assert_eq!(stats.successes, 1);
        assert_eq!(stats.total_duration_ms, 14);
        assert!((stats.success_rate() - 0.5).abs() < f64::EPSILON);
        assert!((stats.mean_cost() - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_stats_have_zero_rates() {
        let stats = ProceduralStats::empty("idle");
        assert_eq!(stats.success_rate(), 0.0);
        assert_eq!(stats.mean_cost(), 0.0);
    }
}
