//! Core domain models for the workflow engine.
//!
//! [`Workflow`] is the in-memory graph the executor drives.
//! [`WorkflowDefinition`] is its serialisable description, turned into a
//! `Workflow` through a [`NodeFactory`](crate::factory::NodeFactory).

use std::collections::BTreeSet;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use nodes::{Connections, Node};

use crate::executor::ExecutorConfig;
use crate::EngineError;

/// Schema version of [`WorkflowDefinition`] and of library snapshots.
pub const SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A node that owns a graph of nodes and drives it to completion.
///
/// `Clone` is a structural deep copy: every contained node is cloned through
/// [`Node::clone_node`].
#[derive(Clone)]
pub struct Workflow {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) connections: Connections,
    pub(crate) nodes: IndexMap<String, Box<dyn Node>>,
    pub(crate) entry: Option<String>,
    pub(crate) tags: BTreeSet<String>,
    pub(crate) version: u32,
    pub(crate) config: ExecutorConfig,
}

impl Workflow {
    /// Empty workflow. Without an entry node it is a no-op.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            connections: Connections::new(),
            nodes: IndexMap::new(),
            entry: None,
            tags: BTreeSet::new(),
            version: 0,
            config: ExecutorConfig::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a node, optionally making it the entry node.
    ///
    /// # Errors
    /// [`EngineError::DuplicateNodeId`] if the ID is already taken.
    pub fn add_node(&mut self, node: impl Node + 'static, is_entry: bool) -> Result<(), EngineError> {
        self.add_boxed_node(Box::new(node), is_entry)
    }

    pub fn add_boxed_node(&mut self, node: Box<dyn Node>, is_entry: bool) -> Result<(), EngineError> {
        let id = node.id().to_owned();
        if self.nodes.contains_key(&id) {
            return Err(EngineError::DuplicateNodeId(id));
        }
        self.nodes.insert(id.clone(), node);
        if is_entry {
            self.entry = Some(id);
        }
        Ok(())
    }

    /// Connect `from`'s `slot` to `to`. `to` does not have to exist.
    ///
    /// # Errors
    /// [`EngineError::UnknownNodeReference`] if `from` is not in the workflow.
    pub fn add_connection(&mut self, from: &str, slot: &str, to: &str) -> Result<(), EngineError> {
        let node = self.nodes.get_mut(from).ok_or_else(|| EngineError::UnknownNodeReference {
            node_id: from.to_owned(),
            side: "from",
        })?;
        node.add_connection(slot, to);
        Ok(())
    }

    /// # Errors
    /// [`EngineError::UnknownEntryNode`] if `node_id` is not in the workflow.
    pub fn set_entry(&mut self, node_id: &str) -> Result<(), EngineError> {
        if !self.nodes.contains_key(node_id) {
            return Err(EngineError::UnknownEntryNode {
                workflow: self.name.clone(),
                node_id: node_id.to_owned(),
            });
        }
        self.entry = Some(node_id.to_owned());
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn entry(&self) -> Option<&str> {
        self.entry.as_deref()
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// `true` if every tag in `required` is present.
    pub fn has_tags<S: AsRef<str>>(&self, required: &[S]) -> bool {
        required.iter().all(|tag| self.tags.contains(tag.as_ref()))
    }

    /// Version assigned by the library at registration; 0 if never registered.
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn node(&self, id: &str) -> Option<&dyn Node> {
        self.nodes.get(id).map(|n| n.as_ref())
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Box<dyn Node>> {
        self.nodes.get_mut(id)
    }

    /// Node IDs in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field("entry", &self.entry)
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("tags", &self.tags)
            .field("version", &self.version)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// WorkflowDefinition
// ---------------------------------------------------------------------------

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// A single node in a definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Unique identifier within this workflow.
    pub id: String,
    /// Factory template name, or `"workflow"` for a nested definition.
    pub template: String,
    /// Template configuration (the nested definition for `"workflow"`).
    #[serde(default)]
    pub config: Value,
    /// Output slot → target node IDs.
    #[serde(default)]
    pub connections: IndexMap<String, Vec<String>>,
}

/// Serialisable description of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub entry: Option<String>,
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
}

impl WorkflowDefinition {
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json).map_err(|e| EngineError::Config(format!("invalid workflow definition: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodes::mock::MockNode;
    use serde_json::json;

    #[test]
    fn duplicate_node_is_rejected() {
        let mut wf = Workflow::new("wf");
        wf.add_node(MockNode::returning("a", json!({})), true).unwrap();
        let err = wf.add_node(MockNode::returning("a", json!({})), false).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateNodeId(id) if id == "a"));
    }

    #[test]
    fn entry_must_exist() {
        let mut wf = Workflow::new("wf");
        assert!(matches!(wf.set_entry("ghost"), Err(EngineError::UnknownEntryNode { .. })));
        assert_eq!(wf.entry(), None);
    }

    #[test]
    fn connections_may_dangle_but_need_a_source() {
        let mut wf = Workflow::new("wf");
        wf.add_node(MockNode::returning("a", json!({})), true).unwrap();

        wf.add_connection("a", "out", "ghost").unwrap();
        assert_eq!(wf.node("a").unwrap().connections().slot("out"), ["ghost"]);

        assert!(matches!(
            wf.add_connection("ghost", "out", "a"),
            Err(EngineError::UnknownNodeReference { side: "from", .. })
        ));
    }

    #[test]
    fn clone_is_deep() {
        let mut wf = Workflow::new("wf").with_tags(["research"]);
        wf.add_node(MockNode::returning("a", json!({})), true).unwrap();

        let copy = wf.clone();
        wf.add_connection("a", "out", "b").unwrap();
        wf.tags.insert("late".into());

        assert!(copy.node("a").unwrap().connections().is_empty());
        assert!(!copy.tags().contains("late"));
    }

    #[test]
    fn definition_defaults_schema_version() {
        let def = WorkflowDefinition::from_json(r#"{ "name": "bare" }"#).unwrap();
        assert_eq!(def.schema_version, SCHEMA_VERSION);
        assert!(def.nodes.is_empty());
        assert!(WorkflowDefinition::from_json("{").is_err());
    }
}
