//! Core domain models: the transport graph, node/edge records, and the
//! workflow ("lattice") record the Result Service owns.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use executors::ExecutorDescriptor;
use executors::deps::DepsMetadata;
use queue::NodeStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub type NodeId = i64;

/// Internal synthetic nodes (graph-building scaffolding) are named with
/// this prefix; post-processing skips them unless they're sublattice
/// nodes.
pub const INTERNAL_NODE_PREFIX: &str = ":";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    Parameter,
    Task,
    Sublattice,
    ListCollector,
    DictCollector,
}

impl NodeCategory {
    pub fn is_sublattice(self) -> bool {
        matches!(self, NodeCategory::Sublattice)
    }
}

/// The kind of a single incoming edge: positional with an `arg_index`,
/// keyword, or wait-for ordering-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParamKind {
    Arg { arg_index: i64 },
    Kwarg,
    WaitFor,
}

/// One edge instance between a (parent, child) pair. The same pair may
/// carry several of these under distinct `edge_name`s (multigraph).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub edge_name: String,
    pub param_kind: ParamKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub name: String,
    pub category: NodeCategory,
    /// Opaque serialized callable. `None` for parameter nodes, which carry
    /// their literal in `value` instead.
    pub callable: Option<Value>,
    pub value: Option<Value>,
    pub executor: ExecutorDescriptor,
    #[serde(default)]
    pub deps: DepsMetadata,
    pub status: NodeStatus,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub stdout: String,
    pub stderr: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl NodeRecord {
    pub fn is_internal(&self) -> bool {
        self.name.starts_with(INTERNAL_NODE_PREFIX) && !self.category.is_sublattice()
    }
}

/// A partial update applied by the Result Service's `update_node_result`,
/// with a sublattice's result folded into `output`.
#[derive(Debug, Clone, Default)]
pub struct NodeResultPatch {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: Option<NodeStatus>,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

/// In-memory DAG: `nodes` in a `BTreeMap` so iterating in node-id order
/// falls out of the container for free.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransportGraph {
    pub nodes: BTreeMap<NodeId, NodeRecord>,
    pub edges: HashMap<(NodeId, NodeId), Vec<EdgeRecord>>,
}

impl TransportGraph {
    pub fn node(&self, id: NodeId) -> Option<&NodeRecord> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut NodeRecord> {
        self.nodes.get_mut(&id)
    }

    /// Every edge instance between `parent` and `child`.
    pub fn edge_data(&self, parent: NodeId, child: NodeId) -> &[EdgeRecord] {
        self.edges
            .get(&(parent, child))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The set of parent node ids for `child`.
    pub fn dependencies(&self, child: NodeId) -> Vec<NodeId> {
        self.edges
            .keys()
            .filter(|(_, c)| *c == child)
            .map(|(p, _)| *p)
            .collect()
    }

    /// In-degree counting multi-edges once per edge *instance*, matching
    /// the pending-dependency counter's "decrement once per edge instance"
    /// rule.
    pub fn in_degree(&self, child: NodeId) -> usize {
        self.edges
            .iter()
            .filter(|((_, c), _)| *c == child)
            .map(|(_, edges)| edges.len())
            .sum()
    }

    /// Children reachable from `parent`, with the edge instances that
    /// connect them (possibly more than one per child).
    pub fn outgoing(&self, parent: NodeId) -> Vec<(NodeId, &[EdgeRecord])> {
        self.edges
            .iter()
            .filter(|((p, _), _)| *p == parent)
            .map(|((_, c), edges)| (*c, edges.as_slice()))
            .collect()
    }

    pub fn node_ids_in_order(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    NewObject,
    Running,
    Completed,
    Failed,
    Cancelled,
    PendingPostprocessing,
    Postprocessing,
    PostprocessingFailed,
}

impl WorkflowStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed
                | WorkflowStatus::Failed
                | WorkflowStatus::Cancelled
                | WorkflowStatus::PostprocessingFailed
        )
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkflowStatus::NewObject => "NEW_OBJECT",
            WorkflowStatus::Running => "RUNNING",
            WorkflowStatus::Completed => "COMPLETED",
            WorkflowStatus::Failed => "FAILED",
            WorkflowStatus::Cancelled => "CANCELLED",
            WorkflowStatus::PendingPostprocessing => "PENDING_POSTPROCESSING",
            WorkflowStatus::Postprocessing => "POSTPROCESSING",
            WorkflowStatus::PostprocessingFailed => "POSTPROCESSING_FAILED",
        };
        write!(f, "{s}")
    }
}

impl WorkflowStatus {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "NEW_OBJECT" => WorkflowStatus::NewObject,
            "RUNNING" => WorkflowStatus::Running,
            "COMPLETED" => WorkflowStatus::Completed,
            "FAILED" => WorkflowStatus::Failed,
            "CANCELLED" => WorkflowStatus::Cancelled,
            "PENDING_POSTPROCESSING" => WorkflowStatus::PendingPostprocessing,
            "POSTPROCESSING" => WorkflowStatus::Postprocessing,
            "POSTPROCESSING_FAILED" => WorkflowStatus::PostprocessingFailed,
            _ => return None,
        })
    }
}

/// The terminal outcome of a `run_workflow` call.
#[derive(Debug, Clone)]
pub struct WorkflowOutcome {
    pub status: WorkflowStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
}

/// A read-only snapshot suitable for `get_result_object`, whether the
/// dispatch is still live or has already been finalized.
#[derive(Debug, Clone, Serialize)]
pub struct ResultObject {
    pub dispatch_id: Uuid,
    pub status: WorkflowStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// A live workflow ("lattice") record, exclusively owned by the Result
/// Service while active.
#[derive(Debug, Clone)]
pub struct Workflow {
    pub dispatch_id: Uuid,
    pub name: String,
    pub graph: TransportGraph,
    pub workflow_function: Value,
    pub args: Value,
    pub kwargs: Value,
    pub workflow_executor: ExecutorDescriptor,
    pub status: WorkflowStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub result: Option<Value>,
    pub parent_dispatch_id: Option<Uuid>,
    pub parent_node_id: Option<NodeId>,
}

// ---------------------------------------------------------------------------
// Submission format: the serialized graph, simplified to the fields this
// workspace actually round-trips. The metadata blob's trigger/executor_data
// fields are client-SDK concerns and stay out of this engine.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmittedNode {
    pub id: NodeId,
    pub name: String,
    pub category: NodeCategory,
    #[serde(default)]
    pub callable: Option<Value>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub executor: Option<ExecutorDescriptor>,
    #[serde(default)]
    pub deps: DepsMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmittedEdge {
    pub parent: NodeId,
    pub child: NodeId,
    pub edge_name: String,
    pub param_kind: ParamKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmittedGraph {
    pub nodes: Vec<SubmittedNode>,
    pub edges: Vec<SubmittedEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSubmission {
    pub name: String,
    pub graph: SubmittedGraph,
    pub workflow_function: Value,
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub kwargs: Value,
    pub workflow_executor: ExecutorDescriptor,
}
