//! `engine` crate — workflows, their wave executor, the versioned library,
//! definitions and the task-level orchestrator.

pub mod config;
pub mod dag;
pub mod error;
pub mod executor;
pub mod factory;
pub mod library;
pub mod models;
pub mod orchestrator;

pub use config::EngineConfig;
pub use dag::{inspect_workflow, validate_definition, DanglingEdge, GraphReport};
pub use error::EngineError;
pub use executor::{ConflictPolicy, ExecutorConfig, WaveDispatch, WorkflowOutcome};
pub use factory::{NodeFactory, TemplateRegistry, WORKFLOW_TEMPLATE};
pub use library::{WorkflowLibrary, WorkflowVersion};
pub use models::{NodeSpec, Workflow, WorkflowDefinition, SCHEMA_VERSION};
pub use orchestrator::{merge_results, FallbackHandler, LogFallback, Orchestrator, Processed, META_COGNITION};
