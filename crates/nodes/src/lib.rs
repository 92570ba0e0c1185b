//! `nodes` crate — the [`Node`] contract, the per-execution [`Context`] and
//! built-in node implementations.
//!
//! Leaf computations, agent adapters and whole workflows all implement
//! [`Node`]; the engine crate dispatches execution through this trait
//! object.

pub mod agent;
pub mod builtin;
pub mod context;
pub mod error;
pub mod mock;
pub mod state;
pub mod traits;

pub use agent::{Agent, AgentNode};
pub use builtin::{EmitNode, FnNode, PassThroughNode, RememberNode};
pub use context::{fingerprint, Context, ExecutionRecord, MemoryWrites};
pub use error::NodeError;
pub use state::NodeState;
pub use traits::{Connections, Node, NodeClone, NodeKind, NodeOutput};
