//! Built-in plumbing nodes.
//!
//! None of these carry domain behaviour; they move data between the
//! workflow input, short-term memory and the halt value so that graphs can
//! be wired up and exercised without external collaborators.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::{Connections, Context, Node, NodeError, NodeOutput, NodeState};

// ---------------------------------------------------------------------------
// PassThroughNode
// ---------------------------------------------------------------------------

/// Returns its input unchanged and always continues.
#[derive(Debug, Clone)]
pub struct PassThroughNode {
    id: String,
    connections: Connections,
}

impl PassThroughNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), connections: Connections::new() }
    }
}

#[async_trait]
impl Node for PassThroughNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn connections(&self) -> &Connections {
        &self.connections
    }

    fn connections_mut(&mut self) -> &mut Connections {
        &mut self.connections
    }

    async fn process(&self, input: Value, _ctx: &Context) -> Result<NodeOutput, NodeError> {
        Ok(NodeOutput::next(input))
    }
}

// ---------------------------------------------------------------------------
// EmitNode
// ---------------------------------------------------------------------------

/// Configuration accepted by [`EmitNode::from_config`].
#[derive(Debug, Clone, Deserialize)]
pub struct EmitConfig {
    #[serde(default)]
    pub output: Value,
    /// Stop the workflow after emitting.
    #[serde(default)]
    pub halt: bool,
}

/// Emits a fixed value, optionally halting the workflow with it.
#[derive(Debug, Clone)]
pub struct EmitNode {
    id: String,
    connections: Connections,
    config: EmitConfig,
}

impl EmitNode {
    pub fn new(id: impl Into<String>, output: Value, halt: bool) -> Self {
        Self {
            id: id.into(),
            connections: Connections::new(),
            config: EmitConfig { output, halt },
        }
    }

    pub fn from_config(id: impl Into<String>, config: &Value) -> Result<Self, NodeError> {
        let config: EmitConfig = serde_json::from_value(config.clone())
            .map_err(|e| NodeError::failed(format!("invalid emit config: {e}")))?;
        Ok(Self { id: id.into(), connections: Connections::new(), config })
    }
}

#[async_trait]
impl Node for EmitNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn connections(&self) -> &Connections {
        &self.connections
    }

    fn connections_mut(&mut self) -> &mut Connections {
        &mut self.connections
    }

    async fn process(&self, _input: Value, _ctx: &Context) -> Result<NodeOutput, NodeError> {
        let output = self.config.output.clone();
        if self.config.halt {
            Ok(NodeOutput::halt(output))
        } else {
            Ok(NodeOutput::next(output))
        }
    }
}

// ---------------------------------------------------------------------------
// RememberNode
// ---------------------------------------------------------------------------

/// Writes a fixed set of entries into short-term memory, then passes its
/// input through. Counts its own invocations in node-private state.
#[derive(Debug, Clone)]
pub struct RememberNode {
    id: String,
    connections: Connections,
    entries: Map<String, Value>,
    state: NodeState,
}

impl RememberNode {
    pub fn new(id: impl Into<String>, entries: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            connections: Connections::new(),
            entries,
            state: NodeState::new(),
        }
    }

    /// `config` must be a JSON object; each member becomes a memory entry.
    pub fn from_config(id: impl Into<String>, config: &Value) -> Result<Self, NodeError> {
        match config {
            Value::Object(entries) => Ok(Self::new(id, entries.clone())),
            Value::Null => Ok(Self::new(id, Map::new())),
            other => Err(NodeError::failed(format!(
                "remember config must be an object, got {other}"
            ))),
        }
    }

    /// How many times this node has run.
    pub fn runs(&self) -> u64 {
        self.state.get("runs").and_then(|v| v.as_u64()).unwrap_or(0)
    }
}

#[async_trait]
impl Node for RememberNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn connections(&self) -> &Connections {
        &self.connections
    }

    fn connections_mut(&mut self) -> &mut Connections {
        &mut self.connections
    }

    async fn process(&self, input: Value, ctx: &Context) -> Result<NodeOutput, NodeError> {
        for (key, value) in &self.entries {
            ctx.set(key.clone(), value.clone());
        }
        self.state.set("runs", Value::from(self.runs() + 1));
        debug!(node_id = %self.id, entries = self.entries.len(), "stored entries in short-term memory");
        Ok(NodeOutput::next(input))
    }
}

// ---------------------------------------------------------------------------
// FnNode
// ---------------------------------------------------------------------------

type NodeFn = dyn Fn(&Value, &Context) -> Result<NodeOutput, NodeError> + Send + Sync;

/// Leaf node backed by a synchronous closure.
#[derive(Clone)]
pub struct FnNode {
    id: String,
    connections: Connections,
    func: Arc<NodeFn>,
}

impl FnNode {
    pub fn new<F>(id: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Value, &Context) -> Result<NodeOutput, NodeError> + Send + Sync + 'static,
    {
        Self { id: id.into(), connections: Connections::new(), func: Arc::new(func) }
    }
}

impl fmt::Debug for FnNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnNode")
            .field("id", &self.id)
            .field("connections", &self.connections)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Node for FnNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn connections(&self) -> &Connections {
        &self.connections
    }

    fn connections_mut(&mut self) -> &mut Connections {
        &mut self.connections
    }

    async fn process(&self, input: Value, ctx: &Context) -> Result<NodeOutput, NodeError> {
        (self.func)(&input, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn emit_node_halts_when_configured() {
        let node = EmitNode::from_config("done", &json!({ "output": { "ok": true }, "halt": true }))
            .expect("valid config");
        let out = node.process(json!({}), &Context::new()).await.unwrap();
        assert_eq!(out, NodeOutput::halt(json!({ "ok": true })));
    }

    #[tokio::test]
    async fn remember_node_writes_memory_and_counts_runs() {
        let node = RememberNode::from_config("r", &json!({ "topic": "rust" })).unwrap();
        let ctx = Context::new();

        let out = node.process(json!("in"), &ctx).await.unwrap();
        node.process(json!("in"), &ctx).await.unwrap();

        assert_eq!(out, NodeOutput::next(json!("in")));
        assert_eq!(ctx.get("topic"), Some(json!("rust")));
        assert_eq!(node.runs(), 2);
    }

    #[test]
    fn remember_node_rejects_non_object_config() {
        assert!(RememberNode::from_config("r", &json!([1, 2])).is_err());
    }

    #[tokio::test]
    async fn fn_node_runs_closure() {
        let node = FnNode::new("double", |input, _ctx| {
            let n = input.as_i64().ok_or_else(|| NodeError::failed("not a number"))?;
            Ok(NodeOutput::next(json!(n * 2)))
        });
        let out = node.process(json!(21), &Context::new()).await.unwrap();
        assert_eq!(out.output, json!(42));
        assert!(node.process(json!("x"), &Context::new()).await.is_err());
    }
}
