//! DAG validation — run once at `make_dispatch` time, before any workflow
//! is registered. Fails the submission synchronously; no workflow is
//! registered if validation rejects it.
//!
//! Rules enforced:
//! 1. Node ids are unique.
//! 2. Every edge references node ids that exist.
//! 3. The graph is acyclic.
//! 4. Every non-parameter node has an executor descriptor.
//! 5. `arg_index` values on a node's incoming positional edges are
//!    contiguous starting from zero and unique.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::EngineError;
use crate::models::{NodeCategory, NodeId, ParamKind, SubmittedGraph};

/// Validate the submitted graph and return node ids in topological order.
pub fn validate_submission(graph: &SubmittedGraph) -> Result<Vec<NodeId>, EngineError> {
    let mut seen_ids: HashSet<NodeId> = HashSet::new();
    for node in &graph.nodes {
        if !seen_ids.insert(node.id) {
            return Err(EngineError::Input(format!("duplicate node id {}", node.id)));
        }
        if node.category != NodeCategory::Parameter && node.executor.is_none() {
            return Err(EngineError::Input(format!(
                "node {} has no executor descriptor",
                node.id
            )));
        }
    }

    let node_set: HashSet<NodeId> = graph.nodes.iter().map(|n| n.id).collect();
    for edge in &graph.edges {
        if !node_set.contains(&edge.parent) {
            return Err(EngineError::Input(format!(
                "edge references unknown parent node {}",
                edge.parent
            )));
        }
        if !node_set.contains(&edge.child) {
            return Err(EngineError::Input(format!(
                "edge references unknown child node {}",
                edge.child
            )));
        }
    }

    validate_arg_index_contiguity(graph)?;

    // Kahn's algorithm, counting each edge instance separately so a
    // (parent, child) pair connected by several edges contributes several
    // units of in-degree, matching the Scheduler's pending-counter rule.
    let mut adjacency: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    let mut in_degree: HashMap<NodeId, usize> = HashMap::new();
    for node in &graph.nodes {
        adjacency.entry(node.id).or_default();
        in_degree.entry(node.id).or_insert(0);
    }
    for edge in &graph.edges {
        adjacency.entry(edge.parent).or_default().push(edge.child);
        *in_degree.entry(edge.child).or_insert(0) += 1;
    }

    let mut queue: VecDeque<NodeId> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut sorted = Vec::with_capacity(graph.nodes.len());
    while let Some(id) = queue.pop_front() {
        sorted.push(id);
        if let Some(children) = adjacency.get(&id) {
            for &child in children {
                let deg = in_degree.entry(child).or_insert(0);
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(child);
                }
            }
        }
    }

    if sorted.len() != graph.nodes.len() {
        return Err(EngineError::Input("workflow graph contains a cycle".into()));
    }

    Ok(sorted)
}

fn validate_arg_index_contiguity(graph: &SubmittedGraph) -> Result<(), EngineError> {
    let mut positional_by_child: HashMap<NodeId, Vec<i64>> = HashMap::new();
    for edge in &graph.edges {
        if let ParamKind::Arg { arg_index } = edge.param_kind {
            positional_by_child.entry(edge.child).or_default().push(arg_index);
        }
    }

    for (child, mut indices) in positional_by_child {
        indices.sort_unstable();
        for (expected, actual) in (0i64..).zip(indices.iter().copied()) {
            if expected != actual {
                return Err(EngineError::Input(format!(
                    "node {child}'s positional arg_index values are not contiguous from zero \
                     (got {indices:?})"
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SubmittedEdge, SubmittedNode};
    use executors::ExecutorDescriptor;

    fn task(id: NodeId) -> SubmittedNode {
        SubmittedNode {
            id,
            name: format!("node-{id}"),
            category: NodeCategory::Task,
            callable: None,
            value: None,
            executor: Some(ExecutorDescriptor::new("local")),
            deps: Default::default(),
        }
    }

    fn arg_edge(parent: NodeId, child: NodeId, arg_index: i64) -> SubmittedEdge {
        SubmittedEdge {
            parent,
            child,
            edge_name: format!("arg{arg_index}"),
            param_kind: ParamKind::Arg { arg_index },
        }
    }

    #[test]
    fn valid_linear_dag_sorts() {
        let graph = SubmittedGraph {
            nodes: vec![task(0), task(1), task(2)],
            edges: vec![arg_edge(0, 1, 0), arg_edge(1, 2, 0)],
        };
        let sorted = validate_submission(&graph).unwrap();
        assert_eq!(sorted, vec![0, 1, 2]);
    }

    #[test]
    fn duplicate_node_id_rejected() {
        let graph = SubmittedGraph { nodes: vec![task(0), task(0)], edges: vec![] };
        assert!(matches!(validate_submission(&graph), Err(EngineError::Input(_))));
    }

    #[test]
    fn cycle_rejected() {
        let graph = SubmittedGraph {
            nodes: vec![task(0), task(1)],
            edges: vec![arg_edge(0, 1, 0), arg_edge(1, 0, 0)],
        };
        assert!(matches!(validate_submission(&graph), Err(EngineError::Input(_))));
    }

    #[test]
    fn arg_index_gap_rejected() {
        let graph = SubmittedGraph {
            nodes: vec![task(0), task(1), task(2)],
            edges: vec![arg_edge(0, 2, 0), arg_edge(1, 2, 2)],
        };
        assert!(matches!(validate_submission(&graph), Err(EngineError::Input(_))));
    }

    #[test]
    fn missing_executor_on_task_node_rejected() {
        let mut node = task(0);
        node.executor = None;
        let graph = SubmittedGraph { nodes: vec![node], edges: vec![] };
        assert!(matches!(validate_submission(&graph), Err(EngineError::Input(_))));
    }
}
