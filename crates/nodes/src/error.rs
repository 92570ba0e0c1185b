//! Node-level error type.

use thiserror::Error;

/// Errors returned by a node's `process` method.
///
/// The engine never recovers from these itself:
/// - `Failed`    — propagates to whoever drives the owning workflow.
/// - `Overflow`  — the cognitive-overflow signal; travels up unchanged until
///                 the orchestrator catches it and runs its fallback.
/// - `Cancelled` — a nested workflow observed cancellation at a wave boundary.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NodeError {
    /// The node could not produce an output.
    #[error("node failed: {0}")]
    Failed(String),

    /// Processing capacity exceeded; abort the remaining workflow sequence.
    #[error("cognitive overflow: {0}")]
    Overflow(String),

    /// Execution was cancelled between waves.
    #[error("execution cancelled")]
    Cancelled,
}

impl NodeError {
    /// Shorthand for [`NodeError::Failed`].
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    /// Shorthand for [`NodeError::Overflow`].
    pub fn overflow(reason: impl Into<String>) -> Self {
        Self::Overflow(reason.into())
    }

    /// `true` for the overflow signal.
    pub fn is_overflow(&self) -> bool {
        matches!(self, Self::Overflow(_))
    }
}
