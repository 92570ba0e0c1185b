//! Engine-level error types.

use nodes::NodeError;
use thiserror::Error;

/// Errors produced by the workflow engine (construction + execution).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Construction errors ------

    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// A connection's source node doesn't exist in the workflow.
    #[error("connection references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference {
        node_id: String,
        side: &'static str,
    },

    /// The designated entry node is not part of the workflow.
    #[error("workflow '{workflow}' has no node '{node_id}' to use as entry")]
    UnknownEntryNode {
        workflow: String,
        node_id: String,
    },

    /// No node factory knows this template.
    #[error("unknown node template '{0}'")]
    UnknownTemplate(String),

    /// A template rejected its configuration.
    #[error("invalid config for node '{node_id}': {message}")]
    InvalidNodeConfig {
        node_id: String,
        message: String,
    },

    /// Definition or stored snapshot was produced by a different schema.
    #[error("workflow '{workflow}' uses schema v{found}, engine expects v{expected}")]
    SchemaMismatch {
        workflow: String,
        expected: u32,
        found: u32,
    },

    /// No such version in the workflow's history.
    #[error("workflow '{name}' has no version {version}")]
    VersionNotFound {
        name: String,
        version: u32,
    },

    // ------ Execution errors ------

    /// A node failed; the error is not recovered by the engine.
    #[error("node '{node_id}' failed: {message}")]
    NodeFailed {
        node_id: String,
        message: String,
    },

    /// Cognitive overflow raised by a node; caught by the orchestrator.
    #[error("cognitive overflow in node '{node_id}': {reason}")]
    Overflow {
        node_id: String,
        reason: String,
    },

    /// Two nodes of the same wave wrote different values to one key.
    #[error("nodes '{first}' and '{second}' wrote conflicting values to '{key}' in workflow '{workflow}'")]
    MemoryConflict {
        workflow: String,
        key: String,
        first: String,
        second: String,
    },

    /// Cancellation observed at a wave boundary.
    #[error("workflow '{workflow}' cancelled after {wave} completed waves")]
    Cancelled {
        workflow: String,
        wave: usize,
    },

    /// The configured wave limit was reached.
    #[error("workflow '{workflow}' exceeded its limit of {limit} waves")]
    WaveLimitExceeded {
        workflow: String,
        limit: usize,
    },

    /// Hierarchical memory failure.
    #[error("memory error: {0}")]
    Memory(#[from] memory::MemoryError),

    /// Configuration could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Attribute a node's error to `node_id`, raised while `workflow` was
    /// running its wave number `wave` (1-based).
    pub fn from_node(workflow: &str, wave: usize, node_id: &str, err: NodeError) -> Self {
        match err {
            NodeError::Overflow(reason) => Self::Overflow { node_id: node_id.to_owned(), reason },
            NodeError::Cancelled => Self::Cancelled {
                workflow: workflow.to_owned(),
                wave: wave.saturating_sub(1),
            },
            NodeError::Failed(message) => Self::NodeFailed { node_id: node_id.to_owned(), message },
        }
    }

    /// Collapse into a [`NodeError`] so a nested workflow can report through
    /// the node contract. Overflow and cancellation keep their identity.
    pub fn into_node_error(self) -> NodeError {
        match self {
            Self::Overflow { reason, .. } => NodeError::Overflow(reason),
            Self::Cancelled { .. } => NodeError::Cancelled,
            other => NodeError::Failed(other.to_string()),
        }
    }

    pub fn is_overflow(&self) -> bool {
        matches!(self, Self::Overflow { .. })
    }
}
