//! The `Node` trait — the contract every processing unit must fulfil.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Context, NodeError};

// ---------------------------------------------------------------------------
// NodeOutput
// ---------------------------------------------------------------------------

/// What a node hands back to the workflow driving it.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeOutput {
    /// Node result. Only surfaces as the workflow result when the node halts.
    pub output: Value,
    /// `false` stops the owning workflow immediately.
    pub should_continue: bool,
}

impl NodeOutput {
    /// Output that lets traversal carry on to the node's connections.
    pub fn next(output: Value) -> Self {
        Self { output, should_continue: true }
    }

    /// Output that ends the owning workflow and becomes its result.
    pub fn halt(output: Value) -> Self {
        Self { output, should_continue: false }
    }
}

// ---------------------------------------------------------------------------
// NodeKind
// ---------------------------------------------------------------------------

/// Variant tag for the heterogeneous things that satisfy [`Node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Plain computation.
    Leaf,
    /// Adapter around an external agent collaborator.
    Agent,
    /// A sub-graph of nodes.
    Workflow,
}

// ---------------------------------------------------------------------------
// Connections
// ---------------------------------------------------------------------------

/// Named output slots, each fanning out to an ordered list of target node IDs.
///
/// Targets are not deduplicated and are not checked against any graph:
/// an edge to a node that does not exist is inert at execution time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Connections(IndexMap<String, Vec<String>>);

impl Connections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `target` to `slot`, creating the slot on first use.
    pub fn add(&mut self, slot: impl Into<String>, target: impl Into<String>) {
        self.0.entry(slot.into()).or_default().push(target.into());
    }

    /// Targets of a single slot (empty if the slot was never used).
    pub fn slot(&self, slot: &str) -> &[String] {
        self.0.get(slot).map(Vec::as_slice).unwrap_or_default()
    }

    /// Every target across every slot, in slot insertion order.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.0.values().flatten().map(String::as_str)
    }

    /// `(slot, targets)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(slot, targets)| (slot.as_str(), targets.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }
}

impl From<IndexMap<String, Vec<String>>> for Connections {
    fn from(map: IndexMap<String, Vec<String>>) -> Self {
        Self(map)
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Structural deep copy for boxed nodes.
///
/// Blanket-implemented for every `Node + Clone`, so implementors only need
/// `#[derive(Clone)]`.
pub trait NodeClone {
    fn clone_node(&self) -> Box<dyn Node>;
}

impl<T> NodeClone for T
where
    T: Node + Clone + 'static,
{
    fn clone_node(&self) -> Box<dyn Node> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn Node> {
    fn clone(&self) -> Self {
        self.clone_node()
    }
}

/// The core node trait.
///
/// Leaf computations, agent adapters and whole workflows all implement this.
/// `process` may mutate the node's own private state and the short-term
/// memory of `ctx`; it must not reach into any other node.
#[async_trait]
pub trait Node: NodeClone + Send + Sync {
    /// Identifier, unique within the owning workflow.
    fn id(&self) -> &str;

    fn kind(&self) -> NodeKind {
        NodeKind::Leaf
    }

    fn connections(&self) -> &Connections;

    fn connections_mut(&mut self) -> &mut Connections;

    /// Append `target` to the named output slot. Repeated calls add
    /// duplicate entries.
    fn add_connection(&mut self, slot: &str, target: &str) {
        self.connections_mut().add(slot, target);
    }

    /// Run the node against the workflow input.
    async fn process(&self, input: Value, ctx: &Context) -> Result<NodeOutput, NodeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connections_keep_duplicates_in_order() {
        let mut conns = Connections::new();
        conns.add("out", "b");
        conns.add("out", "b");
        conns.add("err", "c");

        assert_eq!(conns.slot("out"), ["b", "b"]);
        assert_eq!(conns.targets().collect::<Vec<_>>(), vec!["b", "b", "c"]);
        assert!(conns.slot("missing").is_empty());
    }

    #[test]
    fn empty_slots_count_as_empty() {
        let conns = Connections::from(IndexMap::from([("out".to_string(), Vec::new())]));
        assert!(conns.is_empty());
    }
}
