//! Task-level orchestration.
//!
//! `Orchestrator::process`:
//! 1. Creates a context (or takes the caller's) and lists it in the
//!    active-context table.
//! 2. Selects workflows by tag filter, or all of them in registry order.
//! 3. Runs them one after another on the same context, folding each result
//!    into the running accumulator with [`merge_results`].
//! 4. Records one procedural run per executed workflow and one episode per
//!    finished task.
//! 5. Turns cognitive overflow into a fallback call and a degraded result;
//!    every other error propagates.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use memory::{Episode, HierarchicalMemory, MemoryError, RunRecord};
use nodes::Context;

use crate::config::EngineConfig;
use crate::library::WorkflowLibrary;
use crate::{EngineError, Workflow};

/// Workflow registered by every orchestrator at construction.
pub const META_COGNITION: &str = "meta_cognition";

// ---------------------------------------------------------------------------
// Fallback
// ---------------------------------------------------------------------------

/// Called once per task when a workflow raises cognitive overflow.
#[async_trait]
pub trait FallbackHandler: Send + Sync {
    /// `partial` is the accumulator as it stood before the overflowing
    /// workflow. The context keeps everything logged so far.
    async fn handle(&self, ctx: &Context, error: &EngineError, partial: &Value);
}

/// Default fallback: logs and notes the reason in the context metadata.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFallback;

#[async_trait]
impl FallbackHandler for LogFallback {
    async fn handle(&self, ctx: &Context, error: &EngineError, _partial: &Value) {
        error!(context_id = %ctx.id(), %error, "cognitive overflow, falling back");
        ctx.set_metadata("fallback_reason", Value::String(error.to_string()));
    }
}

// ---------------------------------------------------------------------------
// Output of a processed task
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Processed {
    /// Final accumulator, also stored as the context's output.
    pub output: Value,
    /// Owning handle to the context; the orchestrator only keeps a weak one.
    pub context: Arc<Context>,
    pub fallback_triggered: bool,
    /// Workflows actually executed, in order.
    pub workflows: Vec<String>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Owns the workflow library and the hierarchical memory. `Send + Sync`;
/// share it through an `Arc` to serve concurrent tasks.
pub struct Orchestrator {
    library: RwLock<WorkflowLibrary>,
    memory: HierarchicalMemory,
    active_contexts: Mutex<HashMap<Uuid, Weak<Context>>>,
    fallback: Arc<dyn FallbackHandler>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("memory", &self.memory)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(memory: HierarchicalMemory) -> Self {
        let mut library = WorkflowLibrary::new();
        library.register_workflow(
            &Workflow::new(META_COGNITION)
                .with_description("Reflection over the current task; empty until nodes are added.")
                .with_tags(["meta"]),
        );

        Self {
            library: RwLock::new(library),
            memory,
            active_contexts: Mutex::new(HashMap::new()),
            fallback: Arc::new(LogFallback),
        }
    }

    /// Connect the configured memory backend and build an orchestrator on it.
    pub async fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        let memory = HierarchicalMemory::connect(&config.memory).await?;
        Ok(Self::new(memory))
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackHandler>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn memory(&self) -> &HierarchicalMemory {
        &self.memory
    }

    /// Read access to the library. Do not hold the guard across `process`
    /// calls that register workflows.
    pub async fn library(&self) -> RwLockReadGuard<'_, WorkflowLibrary> {
        self.library.read().await
    }

    /// Register a copy of `workflow`; returns its version number.
    pub async fn register_workflow(&self, workflow: &Workflow) -> u32 {
        self.library.write().await.register_workflow(workflow)
    }

    // -----------------------------------------------------------------------
    // Active contexts
    // -----------------------------------------------------------------------

    /// The context with this ID, if its owner still holds it.
    pub fn active_context(&self, id: Uuid) -> Option<Arc<Context>> {
        self.contexts().get(&id).and_then(Weak::upgrade)
    }

    /// IDs of contexts still alive. Dead entries are pruned on the way.
    pub fn active_context_ids(&self) -> Vec<Uuid> {
        let mut contexts = self.contexts();
        contexts.retain(|_, ctx| ctx.strong_count() > 0);
        contexts.keys().copied().collect()
    }

    fn track(&self, ctx: &Arc<Context>) {
        let mut contexts = self.contexts();
        contexts.retain(|_, ctx| ctx.strong_count() > 0);
        contexts.insert(ctx.id(), Arc::downgrade(ctx));
    }

    fn contexts(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Weak<Context>>> {
        self.active_contexts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Processing
    // -----------------------------------------------------------------------

    /// Run a task on a fresh context.
    ///
    /// # Errors
    /// Any workflow error other than cognitive overflow (node failures,
    /// memory conflicts, cancellation, wave limits).
    pub async fn process(&self, input: Value, filter: Option<&[String]>) -> Result<Processed, EngineError> {
        self.process_in(Arc::new(Context::new()), input, filter).await
    }

    /// Run a task on a context created by the caller, e.g. to keep its
    /// cancellation token.
    #[instrument(skip(self, ctx, input), fields(context_id = %ctx.id()))]
    pub async fn process_in(
        &self,
        ctx: Arc<Context>,
        input: Value,
        filter: Option<&[String]>,
    ) -> Result<Processed, EngineError> {
        self.track(&ctx);

        // ------------------------------------------------------------------
        // Select workflows (the lock is released before anything runs).
        // ------------------------------------------------------------------
        let selected: Vec<Arc<Workflow>> = {
            let library = self.library.read().await;
            match filter {
                Some(tags) => library.get_workflows_by_tags(tags),
                None => library.workflows(),
            }
        };

        if selected.is_empty() {
            warn!(?filter, "no workflow matches, returning input unchanged");
            ctx.set_metadata("no_matching_workflows", Value::Bool(true));
        }
        info!(workflows = selected.len(), "processing task");

        // ------------------------------------------------------------------
        // Fold the input through the workflows in order.
        // ------------------------------------------------------------------
        let mut accumulator = input.clone();
        let mut executed = Vec::with_capacity(selected.len());
        let mut fallback_triggered = false;

        for workflow in &selected {
            let charged_before = ctx.charged();
            let started = Instant::now();
            let result = workflow.execute(accumulator.clone(), &ctx).await;

            executed.push(workflow.name().to_owned());
            let run = RunRecord {
                workflow: workflow.name().to_owned(),
                success: result.is_ok(),
                cost: ctx.charged() - charged_before,
                duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            };
            if let Err(e) = self.memory.record_run(&run).await {
                note_memory_error(&ctx, &e);
            }

            match result {
                Ok(outcome) => {
                    let halted = outcome.is_halted();
                    accumulator = merge_results(accumulator, outcome.into_value(&ctx));
                    if halted {
                        info!(workflow = workflow.name(), "workflow halted the task");
                        break;
                    }
                }

                Err(err) if err.is_overflow() => {
                    warn!(workflow = workflow.name(), error = %err, "cognitive overflow");
                    ctx.set_metadata("fallback_triggered", Value::Bool(true));
                    ctx.set_metadata("last_error", Value::String(err.to_string()));
                    self.fallback.handle(&ctx, &err, &accumulator).await;
                    fallback_triggered = true;
                    break;
                }

                Err(err) => {
                    error!(workflow = workflow.name(), error = %err, "workflow failed");
                    ctx.set_metadata("last_error", Value::String(err.to_string()));
                    return Err(err);
                }
            }
        }

        // ------------------------------------------------------------------
        // Summarise into memory.
        // ------------------------------------------------------------------
        ctx.set_output(accumulator.clone());

        let mut episode = Episode::new(ctx.id(), input, accumulator.clone());
        episode.workflows = executed.clone();
        episode.fallback = fallback_triggered;
        episode.success = !fallback_triggered;
        if let Err(e) = self.memory.add_episodic(&episode).await {
            note_memory_error(&ctx, &e);
        }

        info!(workflows = ?executed, fallback_triggered, "task processed");
        Ok(Processed {
            output: accumulator,
            context: ctx,
            fallback_triggered,
            workflows: executed,
        })
    }
}

fn note_memory_error(ctx: &Context, err: &MemoryError) {
    error!(context_id = %ctx.id(), error = %err, "memory write failed");
    ctx.push_metadata("memory_errors", json!(err.to_string()));
}

/// Shallow override: keys of `new` replace keys of `accumulator` when both
/// are objects. A result without fields leaves `accumulator` as it is; any
/// other non-object pairing lets `new` replace `accumulator` outright.
pub fn merge_results(accumulator: Value, new: Value) -> Value {
    match (accumulator, new) {
        (acc, Value::Object(new)) if new.is_empty() => acc,
        (Value::Object(mut acc), Value::Object(new)) => {
            acc.extend(new);
            Value::Object(acc)
        }
        (_, new) => new,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_overrides_shallowly() {
        let merged = merge_results(
            json!({ "a": 1, "nested": { "x": 1, "y": 2 } }),
            json!({ "b": 2, "nested": { "x": 9 } }),
        );
        assert_eq!(merged, json!({ "a": 1, "b": 2, "nested": { "x": 9 } }));
    }

    #[test]
    fn non_objects_replace() {
        assert_eq!(merge_results(json!({ "a": 1 }), json!("done")), json!("done"));
        assert_eq!(merge_results(json!(3), json!({ "a": 1 })), json!({ "a": 1 }));
    }

    #[test]
    fn empty_result_keeps_accumulator() {
        assert_eq!(merge_results(json!("summarise this"), json!({})), json!("summarise this"));
        assert_eq!(merge_results(json!([1, 2]), json!({})), json!([1, 2]));
        assert_eq!(merge_results(json!({ "a": 1 }), json!({})), json!({ "a": 1 }));
    }
}
