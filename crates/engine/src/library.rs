//! Versioned workflow registry.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tracing::info;

use crate::models::SCHEMA_VERSION;
use crate::{EngineError, Workflow};

/// A frozen copy of a workflow taken at registration time.
#[derive(Debug, Clone)]
pub struct WorkflowVersion {
    pub version: u32,
    /// Schema the snapshot was taken under.
    pub schema_version: u32,
    pub registered_at: DateTime<Utc>,
    pub workflow: Arc<Workflow>,
}

/// Name → current workflow, plus an append-only history per name.
///
/// Registration stores deep copies; the caller keeps its own object and may
/// go on mutating it without touching anything stored here.
#[derive(Debug, Default)]
pub struct WorkflowLibrary {
    current: IndexMap<String, Arc<Workflow>>,
    history: HashMap<String, Vec<WorkflowVersion>>,
}

impl WorkflowLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a copy of `workflow` as the current version of its name and
    /// append it to that name's history. Returns the assigned version.
    ///
    /// A name keeps its position in registry order across re-registrations.
    pub fn register_workflow(&mut self, workflow: &Workflow) -> u32 {
        let history = self.history.entry(workflow.name.clone()).or_default();
        let version = history.len() as u32 + 1;

        let mut copy = workflow.clone();
        copy.version = version;
        let copy = Arc::new(copy);

        history.push(WorkflowVersion {
            version,
            schema_version: SCHEMA_VERSION,
            registered_at: Utc::now(),
            workflow: Arc::clone(&copy),
        });
        self.current.insert(workflow.name.clone(), copy);

        info!(workflow = %workflow.name, version, "workflow registered");
        version
    }

    pub fn get_workflow(&self, name: &str) -> Option<Arc<Workflow>> {
        self.current.get(name).cloned()
    }

    /// Current workflows in registry order.
    pub fn workflows(&self) -> Vec<Arc<Workflow>> {
        self.current.values().cloned().collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.current.keys().map(String::as_str)
    }

    /// Current workflows carrying every tag in `tags`, in registry order.
    /// An empty tag list matches everything.
    pub fn get_workflows_by_tags<S: AsRef<str>>(&self, tags: &[S]) -> Vec<Arc<Workflow>> {
        self.current
            .values()
            .filter(|wf| wf.has_tags(tags))
            .cloned()
            .collect()
    }

    /// Every version ever registered under `name`, oldest first.
    pub fn history(&self, name: &str) -> &[WorkflowVersion] {
        self.history.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn get_workflow_version(&self, name: &str, version: u32) -> Option<&WorkflowVersion> {
        self.history(name).iter().find(|v| v.version == version)
    }

    pub fn latest_version(&self, name: &str) -> Option<u32> {
        self.history(name).last().map(|v| v.version)
    }

    /// Independent copy of a historical version, ready to execute or to
    /// register again. Promotion back to current is left to the caller.
    ///
    /// # Errors
    /// [`EngineError::VersionNotFound`] if there is no such version, and
    /// [`EngineError::SchemaMismatch`] if the snapshot predates the current
    /// schema.
    pub fn replay(&self, name: &str, version: u32) -> Result<Workflow, EngineError> {
        let stored = self.get_workflow_version(name, version).ok_or_else(|| {
            EngineError::VersionNotFound { name: name.to_owned(), version }
        })?;
        if stored.schema_version != SCHEMA_VERSION {
            return Err(EngineError::SchemaMismatch {
                workflow: name.to_owned(),
                expected: SCHEMA_VERSION,
                found: stored.schema_version,
            });
        }
        Ok(stored.workflow.as_ref().clone())
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn history_mut(&mut self, name: &str) -> Option<&mut Vec<WorkflowVersion>> {
        self.history.get_mut(name)
    }
}
