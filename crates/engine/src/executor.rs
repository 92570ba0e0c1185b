//! Wave-based workflow execution.
//!
//! A workflow runs as a sequence of waves:
//! 1. The first frontier is the entry node (no entry: nothing runs).
//! 2. Every node of the frontier is processed against the workflow input,
//!    each on its own fork of the context so that writes of one node stay
//!    invisible to the rest of the wave.
//! 3. After the wave, forks are committed in invocation order and one log
//!    record is appended per invoked node.
//! 4. A node returning `should_continue = false` ends the workflow with its
//!    output; otherwise the union of the invoked nodes' connection targets
//!    that exist in the workflow becomes the next frontier.
//!
//! Cycles are allowed and are not bounded here: a loop whose nodes never
//! halt runs until `ExecutorConfig::max_waves` or cancellation stops it.

use async_trait::async_trait;
use futures::future::join_all;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use nodes::{Connections, Context, MemoryWrites, Node, NodeError, NodeKind, NodeOutput};

use crate::{EngineError, Workflow};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// How the nodes of one wave are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaveDispatch {
    /// One after another in frontier order; a halt skips the rest.
    #[default]
    Sequential,
    /// All at once; the first halting node in frontier order wins.
    Concurrent,
}

/// What to do when two nodes of one wave write different values to the
/// same short-term memory key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Fail the workflow with [`EngineError::MemoryConflict`].
    #[default]
    Reject,
    /// Apply writes in frontier order; the later node wins.
    LastWriterWins,
}

/// Tuning knobs for the executor.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub dispatch: WaveDispatch,
    pub conflict_policy: ConflictPolicy,
    /// Upper bound on waves per execution. `None` means unbounded.
    pub max_waves: Option<usize>,
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// How a workflow execution ended.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowOutcome {
    /// A node returned `should_continue = false`; its output is the result.
    Halted { node_id: String, output: Value },
    /// The frontier ran dry; the accumulated context is the result.
    Completed,
}

impl WorkflowOutcome {
    /// Result value as seen by a caller: the halting output, or a copy of
    /// the context's short-term memory on completion.
    pub fn into_value(self, ctx: &Context) -> Value {
        match self {
            Self::Halted { output, .. } => output,
            Self::Completed => Value::Object(ctx.memory()),
        }
    }

    pub fn is_halted(&self) -> bool {
        matches!(self, Self::Halted { .. })
    }
}

// ---------------------------------------------------------------------------
// Wave bookkeeping
// ---------------------------------------------------------------------------

struct Invocation<'a> {
    node: &'a dyn Node,
    fork: Context,
    result: Result<NodeOutput, NodeError>,
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

impl Workflow {
    /// Drive the node graph to completion against `ctx`.
    ///
    /// # Errors
    /// Node failures (including overflow) propagate after the nodes already
    /// finished in the failing wave have been committed and logged. Also
    /// [`EngineError::MemoryConflict`], [`EngineError::Cancelled`] and
    /// [`EngineError::WaveLimitExceeded`].
    #[instrument(skip(self, input, ctx), fields(workflow = %self.name, context_id = %ctx.id()))]
    pub async fn execute(&self, input: Value, ctx: &Context) -> Result<WorkflowOutcome, EngineError> {
        let Some(entry) = self.entry.as_ref() else {
            debug!("no entry node, nothing to execute");
            return Ok(WorkflowOutcome::Completed);
        };

        let mut frontier: IndexSet<String> = IndexSet::from([entry.clone()]);
        let mut wave = 0usize;

        while !frontier.is_empty() {
            if ctx.is_cancelled() {
                warn!(wave, "cancellation observed at wave boundary");
                return Err(EngineError::Cancelled { workflow: self.name.clone(), wave });
            }
            if let Some(limit) = self.config.max_waves {
                if wave >= limit {
                    return Err(EngineError::WaveLimitExceeded { workflow: self.name.clone(), limit });
                }
            }
            wave += 1;

            // Dangling IDs never enter a frontier past the first wave, but
            // skip them here as well.
            let runnable: Vec<&dyn Node> = frontier
                .iter()
                .filter_map(|id| self.nodes.get(id).map(|n| n.as_ref()))
                .collect();
            debug!(wave, nodes = ?frontier, "dispatching wave");

            let invocations = match self.config.dispatch {
                WaveDispatch::Sequential => self.run_sequential(&runnable, &input, ctx).await,
                WaveDispatch::Concurrent => self.run_concurrent(&runnable, &input, ctx).await,
            };

            self.commit_wave(&invocations, ctx)?;

            let mut next: IndexSet<String> = IndexSet::new();
            for invocation in invocations {
                let node_id = invocation.node.id();
                match invocation.result {
                    Err(err) => {
                        warn!(node_id, error = %err, "node failed");
                        return Err(EngineError::from_node(&self.name, wave, node_id, err));
                    }
                    Ok(out) if !out.should_continue => {
                        info!(node_id, wave, "workflow halted by node");
                        return Ok(WorkflowOutcome::Halted {
                            node_id: node_id.to_owned(),
                            output: out.output,
                        });
                    }
                    Ok(_) => {
                        next.extend(
                            invocation
                                .node
                                .connections()
                                .targets()
                                .filter(|target| self.nodes.contains_key(*target))
                                .map(str::to_owned),
                        );
                    }
                }
            }
            frontier = next;
        }

        info!(waves = wave, "workflow completed");
        Ok(WorkflowOutcome::Completed)
    }

    /// Frontier order, stopping after the first halt or failure.
    async fn run_sequential<'a>(
        &self,
        runnable: &[&'a dyn Node],
        input: &Value,
        ctx: &Context,
    ) -> Vec<Invocation<'a>> {
        let mut invocations = Vec::with_capacity(runnable.len());
        for &node in runnable {
            let fork = ctx.fork();
            ctx.mark_active(node.id());
            let result = node.process(input.clone(), &fork).await;
            ctx.mark_inactive(node.id());

            let stop = !matches!(result, Ok(NodeOutput { should_continue: true, .. }));
            invocations.push(Invocation { node, fork, result });
            if stop {
                break;
            }
        }
        invocations
    }

    /// Whole wave at once. Results come back in frontier order; anything
    /// after the first halt or failure is still committed since it ran.
    async fn run_concurrent<'a>(
        &self,
        runnable: &[&'a dyn Node],
        input: &Value,
        ctx: &Context,
    ) -> Vec<Invocation<'a>> {
        for node in runnable {
            ctx.mark_active(node.id());
        }
        let futures = runnable.iter().map(|&node| {
            let fork = ctx.fork();
            let input = input.clone();
            async move {
                let result = node.process(input, &fork).await;
                Invocation { node, fork, result }
            }
        });
        let invocations = join_all(futures).await;
        for node in runnable {
            ctx.mark_inactive(node.id());
        }
        invocations
    }

    /// Apply each successful invocation's writes to `ctx` in order, logging
    /// one record per invocation right after its writes land.
    fn commit_wave(&self, invocations: &[Invocation<'_>], ctx: &Context) -> Result<(), EngineError> {
        let writes: Vec<(&str, MemoryWrites)> = invocations
            .iter()
            .filter(|inv| inv.result.is_ok())
            .map(|inv| (inv.node.id(), inv.fork.take_writes()))
            .collect();

        if self.config.conflict_policy == ConflictPolicy::Reject {
            self.check_conflicts(&writes)?;
        }

        let outputs = invocations
            .iter()
            .filter_map(|inv| inv.result.as_ref().ok().map(|out| &out.output));
        for ((node_id, node_writes), output) in writes.into_iter().zip(outputs) {
            ctx.apply_writes(node_writes);
            ctx.append_record(&self.name, node_id, output);
        }
        Ok(())
    }

    fn check_conflicts(&self, writes: &[(&str, MemoryWrites)]) -> Result<(), EngineError> {
        let mut seen: IndexMap<&str, (&str, &Option<Value>)> = IndexMap::new();
        for (node_id, node_writes) in writes {
            for (key, value) in node_writes {
                match seen.get(key.as_str()) {
                    Some((first, previous)) if *previous != value => {
                        return Err(EngineError::MemoryConflict {
                            workflow: self.name.clone(),
                            key: key.clone(),
                            first: (*first).to_owned(),
                            second: (*node_id).to_owned(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        seen.insert(key.as_str(), (*node_id, value));
                    }
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Workflow as a node
// ---------------------------------------------------------------------------

#[async_trait]
impl Node for Workflow {
    fn id(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Workflow
    }

    fn connections(&self) -> &Connections {
        &self.connections
    }

    fn connections_mut(&mut self) -> &mut Connections {
        &mut self.connections
    }

    /// Halting propagates: a nested halt halts the parent as well.
    async fn process(&self, input: Value, ctx: &Context) -> Result<NodeOutput, NodeError> {
        match self.execute(input, ctx).await {
            Ok(WorkflowOutcome::Halted { output, .. }) => Ok(NodeOutput::halt(output)),
            Ok(WorkflowOutcome::Completed) => Ok(NodeOutput::next(Value::Object(ctx.memory()))),
            Err(err) => Err(err.into_node_error()),
        }
    }
}
