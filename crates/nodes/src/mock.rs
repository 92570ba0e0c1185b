//! `MockNode` — a test double for [`Node`].
//!
//! Useful in unit and integration tests where a real node implementation is
//! either unavailable or irrelevant.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::{Connections, Context, Node, NodeError, NodeOutput};

/// Behaviour injected into `MockNode` at construction time.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Return a specific JSON value and continue.
    ReturnValue(Value),
    /// Return a specific JSON value and halt the workflow.
    Halt(Value),
    /// Fail with [`NodeError::Failed`].
    Fail(String),
    /// Raise the cognitive-overflow signal.
    Overflow(String),
}

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub input: Value,
    /// Short-term memory the node saw when it was invoked.
    pub memory: Map<String, Value>,
}

/// A mock node that records every call it receives and returns a
/// programmer-specified result.
///
/// Clones share the call recorder, so a test can keep one handle while the
/// engine works on a registered copy.
#[derive(Debug, Clone)]
pub struct MockNode {
    /// Node identifier.
    pub name: String,
    /// What the node will do when `process` is called.
    pub behaviour: MockBehaviour,
    /// Entries written to short-term memory on every call.
    pub writes: Vec<(String, Value)>,
    /// Cost charged to the context on every call.
    pub cost: f64,
    /// All calls seen by this node (in call order).
    pub calls: Arc<Mutex<Vec<MockCall>>>,
    connections: Connections,
}

impl MockNode {
    fn with_behaviour(name: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            name: name.into(),
            behaviour,
            writes: Vec::new(),
            cost: 0.0,
            calls: Arc::new(Mutex::new(Vec::new())),
            connections: Connections::new(),
        }
    }

    /// Create a mock that always continues with the given value.
    pub fn returning(name: impl Into<String>, value: Value) -> Self {
        Self::with_behaviour(name, MockBehaviour::ReturnValue(value))
    }

    /// Create a mock that halts its workflow with the given value.
    pub fn halting(name: impl Into<String>, value: Value) -> Self {
        Self::with_behaviour(name, MockBehaviour::Halt(value))
    }

    /// Create a mock that always fails.
    pub fn failing(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::Fail(msg.into()))
    }

    /// Create a mock that raises cognitive overflow.
    pub fn overflowing(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::Overflow(reason.into()))
    }

    /// Also write `key = value` into short-term memory on every call.
    pub fn writing(mut self, key: impl Into<String>, value: Value) -> Self {
        self.writes.push((key.into(), value));
        self
    }

    /// Also charge `cost` to the context on every call.
    pub fn costing(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    /// Builder-style [`Node::add_connection`].
    pub fn connected(mut self, slot: &str, target: &str) -> Self {
        self.add_connection(slot, target);
        self
    }

    /// Number of times this node has been processed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Copy of every recorded call.
    pub fn recorded_calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Node for MockNode {
    fn id(&self) -> &str {
        &self.name
    }

    fn connections(&self) -> &Connections {
        &self.connections
    }

    fn connections_mut(&mut self) -> &mut Connections {
        &mut self.connections
    }

    async fn process(&self, input: Value, ctx: &Context) -> Result<NodeOutput, NodeError> {
        self.calls.lock().unwrap().push(MockCall { input, memory: ctx.memory() });

        for (key, value) in &self.writes {
            ctx.set(key.clone(), value.clone());
        }
        if self.cost > 0.0 {
            ctx.charge(self.cost);
        }

        match &self.behaviour {
            MockBehaviour::ReturnValue(v) => Ok(NodeOutput::next(self.tagged(v))),
            MockBehaviour::Halt(v) => Ok(NodeOutput::halt(v.clone())),
            MockBehaviour::Fail(msg) => Err(NodeError::Failed(msg.clone())),
            MockBehaviour::Overflow(reason) => Err(NodeError::Overflow(reason.clone())),
        }
    }
}

impl MockNode {
    // Merge the node's own name into object outputs so tests can trace
    // which node produced a value.
    fn tagged(&self, v: &Value) -> Value {
        let mut out = json!({ "node": self.name });
        match (out.as_object_mut(), v.as_object()) {
            (Some(out_obj), Some(v_obj)) => {
                for (k, val) in v_obj {
                    out_obj.insert(k.clone(), val.clone());
                }
                out
            }
            _ => v.clone(),
        }
    }
}
