//! Graph inspection for definitions and built workflows.
//!
//! Rules enforced on definitions:
//! 1. The schema version must match [`SCHEMA_VERSION`].
//! 2. Node IDs must be unique within the workflow.
//! 3. The entry node, if set, must be one of the nodes.
//!
//! Reported but never rejected:
//! - connections to node IDs that do not exist (inert at execution time);
//! - cycles (allowed, bounding them is the caller's business);
//! - nodes that cannot be reached from the entry node.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;

use crate::models::{WorkflowDefinition, SCHEMA_VERSION};
use crate::{EngineError, Workflow};

/// A connection whose target is not part of the workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DanglingEdge {
    pub from: String,
    pub slot: String,
    pub to: String,
}

/// Structural facts about a node graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphReport {
    /// Nodes reachable from the entry node, in breadth-first order.
    pub reachable: Vec<String>,
    /// Nodes never reachable from the entry node, in insertion order.
    pub unreachable: Vec<String>,
    pub dangling: Vec<DanglingEdge>,
    /// The graph (dangling edges ignored) contains a directed cycle.
    pub has_cycle: bool,
}

/// Validate a definition and describe its graph.
///
/// # Errors
/// - [`EngineError::SchemaMismatch`] for a foreign schema version.
/// - [`EngineError::DuplicateNodeId`] if two nodes share an ID.
/// - [`EngineError::UnknownEntryNode`] if the entry is not a node.
pub fn validate_definition(def: &WorkflowDefinition) -> Result<GraphReport, EngineError> {
    if def.schema_version != SCHEMA_VERSION {
        return Err(EngineError::SchemaMismatch {
            workflow: def.name.clone(),
            expected: SCHEMA_VERSION,
            found: def.schema_version,
        });
    }

    let mut seen_ids: HashSet<&str> = HashSet::new();
    for node in &def.nodes {
        if !seen_ids.insert(node.id.as_str()) {
            return Err(EngineError::DuplicateNodeId(node.id.clone()));
        }
    }

    if let Some(entry) = &def.entry {
        if !seen_ids.contains(entry.as_str()) {
            return Err(EngineError::UnknownEntryNode {
                workflow: def.name.clone(),
                node_id: entry.clone(),
            });
        }
    }

    let ids: Vec<&str> = def.nodes.iter().map(|n| n.id.as_str()).collect();
    let edges: Vec<(&str, &str, &str)> = def
        .nodes
        .iter()
        .flat_map(|n| {
            n.connections.iter().flat_map(move |(slot, targets)| {
                targets.iter().map(move |to| (n.id.as_str(), slot.as_str(), to.as_str()))
            })
        })
        .collect();

    Ok(analyze(&ids, &edges, def.entry.as_deref()))
}

/// Describe the graph of an already-built workflow.
pub fn inspect_workflow(workflow: &Workflow) -> GraphReport {
    let ids: Vec<&str> = workflow.node_ids().collect();
    let edges: Vec<(&str, &str, &str)> = ids
        .iter()
        .filter_map(|id| workflow.node(id).map(|node| (*id, node)))
        .flat_map(|(id, node)| {
            node.connections().iter().flat_map(move |(slot, targets)| {
                targets.iter().map(move |to| (id, slot, to.as_str()))
            })
        })
        .collect();

    analyze(&ids, &edges, workflow.entry())
}

fn analyze(ids: &[&str], edges: &[(&str, &str, &str)], entry: Option<&str>) -> GraphReport {
    let node_set: HashSet<&str> = ids.iter().copied().collect();

    // -----------------------------------------------------------------------
    // 1. Split dangling edges from live ones
    // -----------------------------------------------------------------------
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut dangling = Vec::new();
    for &(from, slot, to) in edges {
        if node_set.contains(to) {
            adjacency.entry(from).or_default().push(to);
        } else {
            dangling.push(DanglingEdge { from: from.to_owned(), slot: slot.to_owned(), to: to.to_owned() });
        }
    }

    // -----------------------------------------------------------------------
    // 2. Reachability (breadth-first from the entry node)
    // -----------------------------------------------------------------------
    let mut reachable: Vec<String> = Vec::new();
    let mut visited: HashSet<&str> = HashSet::new();
    if let Some(entry) = entry.filter(|e| node_set.contains(e)) {
        let mut queue: VecDeque<&str> = VecDeque::from([entry]);
        visited.insert(entry);
        while let Some(node_id) = queue.pop_front() {
            reachable.push(node_id.to_owned());
            for &next in adjacency.get(node_id).into_iter().flatten() {
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }
    }
    let unreachable = ids
        .iter()
        .filter(|id| !visited.contains(*id))
        .map(|id| (*id).to_owned())
        .collect();

    // -----------------------------------------------------------------------
    // 3. Cycle detection (Kahn's algorithm)
    // -----------------------------------------------------------------------
    let mut in_degree: HashMap<&str, usize> = ids.iter().map(|&id| (id, 0)).collect();
    for targets in adjacency.values() {
        for &to in targets {
            *in_degree.entry(to).or_insert(0) += 1;
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(&id, _)| id)
        .collect();
    let mut sorted = 0usize;

    while let Some(node_id) = queue.pop_front() {
        sorted += 1;
        for &neighbour in adjacency.get(node_id).into_iter().flatten() {
            let deg = in_degree.entry(neighbour).or_insert(0);
            *deg -= 1;
            if *deg == 0 {
                queue.push_back(neighbour);
            }
        }
    }

    GraphReport {
        reachable,
        unreachable,
        dangling,
        has_cycle: sorted != ids.len(),
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeSpec;
    use indexmap::IndexMap;
    use serde_json::Value;

    fn spec(id: &str, targets: &[&str]) -> NodeSpec {
        let mut connections = IndexMap::new();
        if !targets.is_empty() {
            connections.insert("out".to_string(), targets.iter().map(|t| t.to_string()).collect());
        }
        NodeSpec { id: id.into(), template: "pass".into(), config: Value::Null, connections }
    }

    fn definition(nodes: Vec<NodeSpec>, entry: Option<&str>) -> WorkflowDefinition {
        WorkflowDefinition {
            schema_version: SCHEMA_VERSION,
            name: "test".into(),
            description: None,
            tags: vec![],
            entry: entry.map(str::to_owned),
            nodes,
        }
    }

    #[test]
    fn linear_graph_is_fully_reachable_and_acyclic() {
        let def = definition(vec![spec("a", &["b"]), spec("b", &["c"]), spec("c", &[])], Some("a"));
        let report = validate_definition(&def).expect("valid");
        assert_eq!(report.reachable, vec!["a", "b", "c"]);
        assert!(report.unreachable.is_empty());
        assert!(!report.has_cycle);
    }

    #[test]
    fn diamond_visits_join_once() {
        //   A
        //  / \
        // B   C
        //  \ /
        //   D
        let def = definition(
            vec![spec("a", &["b", "c"]), spec("b", &["d"]), spec("c", &["d"]), spec("d", &[])],
            Some("a"),
        );
        let report = validate_definition(&def).expect("valid");
        assert_eq!(report.reachable, vec!["a", "b", "c", "d"]);
        assert!(!report.has_cycle);
    }

    #[test]
    fn cycle_is_reported_not_rejected() {
        // A → B → C → A
        let def = definition(vec![spec("a", &["b"]), spec("b", &["c"]), spec("c", &["a"])], Some("a"));
        let report = validate_definition(&def).expect("cycles are allowed");
        assert!(report.has_cycle);
    }

    #[test]
    fn dangling_edge_is_reported_not_rejected() {
        let def = definition(vec![spec("a", &["ghost"])], Some("a"));
        let report = validate_definition(&def).expect("dangling edges are allowed");
        assert_eq!(
            report.dangling,
            vec![DanglingEdge { from: "a".into(), slot: "out".into(), to: "ghost".into() }]
        );
    }

    #[test]
    fn duplicate_node_id_is_rejected() {
        let def = definition(vec![spec("a", &[]), spec("a", &[])], None);
        assert!(matches!(
            validate_definition(&def),
            Err(EngineError::DuplicateNodeId(id)) if id == "a"
        ));
    }

    #[test]
    fn unknown_entry_is_rejected() {
        let def = definition(vec![spec("a", &[])], Some("nope"));
        assert!(matches!(validate_definition(&def), Err(EngineError::UnknownEntryNode { .. })));
    }

    #[test]
    fn foreign_schema_is_rejected() {
        let mut def = definition(vec![], None);
        def.schema_version = SCHEMA_VERSION + 1;
        assert!(matches!(validate_definition(&def), Err(EngineError::SchemaMismatch { .. })));
    }

    #[test]
    fn no_entry_means_nothing_reachable() {
        let def = definition(vec![spec("solo", &[])], None);
        let report = validate_definition(&def).unwrap();
        assert!(report.reachable.is_empty());
        assert_eq!(report.unreachable, vec!["solo"]);
    }
}
