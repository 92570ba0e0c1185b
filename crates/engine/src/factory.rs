//! Building nodes from named templates.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use nodes::{EmitNode, Node, NodeError, PassThroughNode, RememberNode};

use crate::dag::validate_definition;
use crate::executor::ExecutorConfig;
use crate::models::WorkflowDefinition;
use crate::{EngineError, Workflow};

/// Template name reserved for nested workflow definitions.
pub const WORKFLOW_TEMPLATE: &str = "workflow";

/// Produces ready-to-connect nodes from a template name plus configuration.
pub trait NodeFactory: Send + Sync {
    fn create(&self, template: &str, id: &str, config: &Value) -> Result<Box<dyn Node>, EngineError>;
}

type Constructor = dyn Fn(&str, &Value) -> Result<Box<dyn Node>, NodeError> + Send + Sync;

/// [`NodeFactory`] backed by a map of constructor closures.
#[derive(Clone, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, Arc<Constructor>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with `pass`, `emit` and `remember`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("pass", |id, _config| Ok(Box::new(PassThroughNode::new(id))));
        registry.register("emit", |id, config| Ok(Box::new(EmitNode::from_config(id, config)?)));
        registry.register("remember", |id, config| {
            Ok(Box::new(RememberNode::from_config(id, config)?))
        });
        registry
    }

    /// Add or replace a template.
    pub fn register<F>(&mut self, template: impl Into<String>, constructor: F)
    where
        F: Fn(&str, &Value) -> Result<Box<dyn Node>, NodeError> + Send + Sync + 'static,
    {
        self.templates.insert(template.into(), Arc::new(constructor));
    }

    pub fn contains(&self, template: &str) -> bool {
        self.templates.contains_key(template)
    }

    /// Template names, sorted.
    pub fn templates(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for TemplateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateRegistry")
            .field("templates", &self.templates())
            .finish()
    }
}

impl NodeFactory for TemplateRegistry {
    fn create(&self, template: &str, id: &str, config: &Value) -> Result<Box<dyn Node>, EngineError> {
        let constructor = self
            .templates
            .get(template)
            .ok_or_else(|| EngineError::UnknownTemplate(template.to_owned()))?;
        constructor(id, config).map_err(|e| EngineError::InvalidNodeConfig {
            node_id: id.to_owned(),
            message: e.to_string(),
        })
    }
}

impl Workflow {
    /// Build a workflow from its definition.
    ///
    /// Nodes with template [`WORKFLOW_TEMPLATE`] are built recursively from
    /// the definition in their `config`; the nested workflow's name is the
    /// node's ID. `config` applies to the workflow and to every nested one.
    ///
    /// # Errors
    /// Everything [`validate_definition`] rejects, plus
    /// [`EngineError::UnknownTemplate`] and [`EngineError::InvalidNodeConfig`].
    pub fn from_definition(
        def: &WorkflowDefinition,
        factory: &dyn NodeFactory,
        config: &ExecutorConfig,
    ) -> Result<Self, EngineError> {
        validate_definition(def)?;

        let mut workflow = Workflow::new(&def.name)
            .with_tags(def.tags.iter().cloned())
            .with_config(config.clone());
        workflow.description = def.description.clone();

        for spec in &def.nodes {
            let mut node: Box<dyn Node> = if spec.template == WORKFLOW_TEMPLATE {
                let mut nested: WorkflowDefinition = serde_json::from_value(spec.config.clone())
                    .map_err(|e| EngineError::InvalidNodeConfig {
                        node_id: spec.id.clone(),
                        message: e.to_string(),
                    })?;
                nested.name = spec.id.clone();
                Box::new(Workflow::from_definition(&nested, factory, config)?)
            } else {
                factory.create(&spec.template, &spec.id, &spec.config)?
            };

            for (slot, targets) in &spec.connections {
                for target in targets {
                    node.add_connection(slot, target);
                }
            }
            workflow.add_boxed_node(node, false)?;
        }

        if let Some(entry) = &def.entry {
            workflow.set_entry(entry)?;
        }

        debug!(workflow = %workflow.name, nodes = workflow.len(), "workflow built from definition");
        Ok(workflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WorkflowOutcome;
    use nodes::{Context, NodeKind};
    use serde_json::json;

    #[test]
    fn unknown_template_is_reported() {
        let registry = TemplateRegistry::with_builtins();
        let Err(err) = registry.create("teleport", "t", &Value::Null) else {
            panic!("teleport is not a template");
        };
        assert!(matches!(err, EngineError::UnknownTemplate(t) if t == "teleport"));
    }

    #[test]
    fn bad_config_names_the_node() {
        let registry = TemplateRegistry::with_builtins();
        let Err(err) = registry.create("remember", "r1", &json!("not an object")) else {
            panic!("remember config must be an object");
        };
        assert!(matches!(err, EngineError::InvalidNodeConfig { node_id, .. } if node_id == "r1"));
    }

    #[tokio::test]
    async fn builds_and_runs_nested_definition() {
        let def = WorkflowDefinition::from_json(
            r#"{
                "name": "outer",
                "tags": ["demo"],
                "entry": "prep",
                "nodes": [
                    { "id": "prep", "template": "remember", "config": { "stage": "prep" },
                      "connections": { "out": ["inner"] } },
                    { "id": "inner", "template": "workflow", "config": {
                        "name": "ignored",
                        "entry": "finish",
                        "nodes": [
                            { "id": "finish", "template": "emit",
                              "config": { "output": { "done": true }, "halt": true } }
                        ]
                    } }
                ]
            }"#,
        )
        .unwrap();

        let workflow =
            Workflow::from_definition(&def, &TemplateRegistry::with_builtins(), &ExecutorConfig::default()).unwrap();
        assert_eq!(workflow.node("inner").unwrap().kind(), NodeKind::Workflow);
        assert!(workflow.has_tags(&["demo"]));

        let ctx = Context::new();
        let outcome = workflow.execute(json!({}), &ctx).await.unwrap();

        assert_eq!(
            outcome,
            WorkflowOutcome::Halted { node_id: "inner".into(), output: json!({ "done": true }) }
        );
        let nodes: Vec<String> = ctx.log().into_iter().map(|r| r.node_id).collect();
        assert_eq!(nodes, vec!["prep", "finish", "inner"]);
    }

    #[tokio::test]
    async fn nested_definitions_inherit_executor_config() {
        let def = WorkflowDefinition::from_json(
            r#"{
                "name": "outer",
                "entry": "inner",
                "nodes": [
                    { "id": "inner", "template": "workflow", "config": {
                        "name": "ignored",
                        "entry": "a",
                        "nodes": [
                            { "id": "a", "template": "pass", "connections": { "out": ["a"] } }
                        ]
                    } }
                ]
            }"#,
        )
        .unwrap();
        let config = ExecutorConfig { max_waves: Some(3), ..ExecutorConfig::default() };

        let workflow = Workflow::from_definition(&def, &TemplateRegistry::with_builtins(), &config).unwrap();
        assert_eq!(workflow.config(), &config);

        let ctx = Context::new();
        let err = workflow.execute(json!({}), &ctx).await.unwrap_err();

        match err {
            EngineError::NodeFailed { node_id, message } => {
                assert_eq!(node_id, "inner");
                assert!(message.contains("exceeded its limit of 3 waves"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(ctx.log_len(), 3);
    }

    #[test]
    fn custom_templates_can_be_registered() {
        let mut registry = TemplateRegistry::new();
        registry.register("noop", |id, _| Ok(Box::new(PassThroughNode::new(id))));
        assert!(registry.contains("noop"));
        assert_eq!(registry.templates(), vec!["noop"]);
        assert_eq!(registry.create("noop", "n", &Value::Null).unwrap().id(), "n");
    }
}
