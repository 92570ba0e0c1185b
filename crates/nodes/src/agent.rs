//! Adapter turning an external agent collaborator into a [`Node`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::{Connections, Context, Node, NodeError, NodeKind, NodeOutput};

/// An agent as seen by the engine: something that acts on an input.
///
/// Agents do not know about connections or graphs; [`AgentNode`] supplies
/// those. Returning `NodeOutput::halt` ends the owning workflow.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    async fn act(&self, input: Value, ctx: &Context) -> Result<NodeOutput, NodeError>;
}

/// Node wrapping a shared [`Agent`].
///
/// Clones share the agent: the agent is an external collaborator, not
/// node-private state.
#[derive(Clone)]
pub struct AgentNode {
    id: String,
    connections: Connections,
    agent: Arc<dyn Agent>,
}

impl AgentNode {
    pub fn new(id: impl Into<String>, agent: Arc<dyn Agent>) -> Self {
        Self { id: id.into(), connections: Connections::new(), agent }
    }

    pub fn agent(&self) -> &Arc<dyn Agent> {
        &self.agent
    }
}

impl fmt::Debug for AgentNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentNode")
            .field("id", &self.id)
            .field("agent", &self.agent.name())
            .field("connections", &self.connections)
            .finish()
    }
}

#[async_trait]
impl Node for AgentNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Agent
    }

    fn connections(&self) -> &Connections {
        &self.connections
    }

    fn connections_mut(&mut self) -> &mut Connections {
        &mut self.connections
    }

    #[instrument(skip(self, input, ctx), fields(node_id = %self.id, agent = %self.agent.name()))]
    async fn process(&self, input: Value, ctx: &Context) -> Result<NodeOutput, NodeError> {
        let result = self.agent.act(input, ctx).await;
        debug!(ok = result.is_ok(), "agent finished");
        result
    }
}
