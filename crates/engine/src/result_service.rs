//! Result Service: the only writer of live `Workflow` state, and the
//! bridge to the durable [`db::Store`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use db::{ElectronPatch, ElectronRecord, LatticePatch, LatticeRecord, Store};
use executors::ExecutorDescriptor;
use queue::{DispatchRegistry, NodeStatus, StatusEvent, StatusQueue, StatusQueueReceiver};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::dag::validate_submission;
use crate::error::EngineError;
use crate::models::{
    EdgeRecord, NodeCategory, NodeId, NodeRecord, NodeResultPatch, TransportGraph, Workflow,
    WorkflowStatus, WorkflowSubmission,
};
use crate::webhook::WebhookClient;

pub struct ResultService {
    registry: DispatchRegistry<Workflow>,
    /// Status-queue receivers live here between `make_dispatch` (which
    /// allocates them) and the Scheduler picking them up to drive its
    /// loop — the registry itself only keeps the sender half.
    pending_receivers: Mutex<HashMap<Uuid, StatusQueueReceiver>>,
    store: Arc<dyn Store>,
    webhook: Option<WebhookClient>,
}

impl ResultService {
    pub fn new(store: Arc<dyn Store>, webhook: Option<WebhookClient>) -> Self {
        Self {
            registry: DispatchRegistry::new(),
            pending_receivers: Mutex::new(HashMap::new()),
            store,
            webhook,
        }
    }

    /// Validate, build the in-memory graph, persist the new workflow, and
    /// register it live.
    #[instrument(skip(self, submission))]
    pub async fn make_dispatch(
        &self,
        submission: WorkflowSubmission,
        parent: Option<(Uuid, NodeId)>,
    ) -> Result<Uuid, EngineError> {
        validate_submission(&submission.graph)?;

        let dispatch_id = Uuid::new_v4();

        let mut nodes = std::collections::BTreeMap::new();
        for node in &submission.graph.nodes {
            // Parameter nodes stay NEW_OBJECT here; the Scheduler
            // synthesizes their COMPLETED transition on first pop, keeping
            // a single code path responsible for every node's status
            // transition and event publication.
            nodes.insert(
                node.id,
                NodeRecord {
                    id: node.id,
                    name: node.name.clone(),
                    category: node.category,
                    callable: node.callable.clone(),
                    value: node.value.clone(),
                    executor: node.executor.clone().unwrap_or_else(|| ExecutorDescriptor::new("local")),
                    deps: node.deps.clone(),
                    status: NodeStatus::NewObject,
                    output: None,
                    error: None,
                    stdout: String::new(),
                    stderr: String::new(),
                    start_time: None,
                    end_time: None,
                },
            );
        }

        let mut edges: HashMap<(NodeId, NodeId), Vec<EdgeRecord>> = HashMap::new();
        for edge in &submission.graph.edges {
            edges.entry((edge.parent, edge.child)).or_default().push(EdgeRecord {
                edge_name: edge.edge_name.clone(),
                param_kind: edge.param_kind.clone(),
            });
        }

        let graph = TransportGraph { nodes, edges };

        let workflow = Workflow {
            dispatch_id,
            name: submission.name.clone(),
            graph,
            workflow_function: submission.workflow_function.clone(),
            args: submission.args.clone(),
            kwargs: submission.kwargs.clone(),
            workflow_executor: submission.workflow_executor.clone(),
            status: WorkflowStatus::NewObject,
            start_time: None,
            end_time: None,
            error: None,
            result: None,
            parent_dispatch_id: parent.map(|p| p.0),
            parent_node_id: parent.map(|p| p.1),
        };

        self.persist_new(&workflow, &submission).await?;

        let electrons: Vec<ElectronRecord> = workflow
            .graph
            .nodes
            .values()
            .map(|n| ElectronRecord {
                dispatch_id,
                node_id: n.id,
                name: n.name.clone(),
                status: n.status.to_string(),
                start_time: n.start_time,
                end_time: n.end_time,
                output: n.output.clone(),
                error: n.error.clone(),
                stdout: None,
                stderr: None,
            })
            .collect();
        self.store.insert_electrons(electrons).await?;

        let dependencies = submission
            .graph
            .edges
            .iter()
            .map(|edge| db::ElectronDependencyRecord {
                dispatch_id,
                parent_node_id: edge.parent,
                child_node_id: edge.child,
                edge_name: edge.edge_name.clone(),
                param_kind: param_kind_label(&edge.param_kind),
                arg_index: arg_index_of(&edge.param_kind),
            })
            .collect();
        self.store.insert_dependencies(dependencies).await?;

        let receiver = self.registry.register(dispatch_id, workflow).await;
        self.pending_receivers.lock().await.insert(dispatch_id, receiver);

        info!(%dispatch_id, "dispatch registered");
        Ok(dispatch_id)
    }

    async fn persist_new(&self, workflow: &Workflow, submission: &WorkflowSubmission) -> Result<(), EngineError> {
        self.store
            .insert_lattice(LatticeRecord {
                dispatch_id: workflow.dispatch_id,
                name: workflow.name.clone(),
                status: workflow.status.to_string(),
                start_time: None,
                end_time: None,
                error: None,
                result: None,
                parent_dispatch_id: workflow.parent_dispatch_id,
                parent_node_id: workflow.parent_node_id,
                workflow_function: submission.workflow_function.clone(),
                args: submission.args.clone(),
                kwargs: submission.kwargs.clone(),
                created_at: Utc::now(),
            })
            .await?;
        Ok(())
    }

    /// Claim the status-queue receiver allocated by `make_dispatch`. Can
    /// only be taken once; the Scheduler owns it for the life of the run.
    pub async fn take_status_receiver(&self, dispatch_id: Uuid) -> Result<StatusQueueReceiver, EngineError> {
        self.pending_receivers
            .lock()
            .await
            .remove(&dispatch_id)
            .ok_or(EngineError::UnknownDispatch(dispatch_id))
    }

    pub async fn status_queue(&self, dispatch_id: Uuid) -> Result<StatusQueue, EngineError> {
        self.registry
            .status_queue(dispatch_id)
            .await
            .map_err(|_| EngineError::UnknownDispatch(dispatch_id))
    }

    pub async fn workflow(&self, dispatch_id: Uuid) -> Result<Arc<Mutex<Workflow>>, EngineError> {
        self.registry
            .get(dispatch_id)
            .await
            .map_err(|_| EngineError::UnknownDispatch(dispatch_id))
    }

    pub async fn is_live(&self, dispatch_id: Uuid) -> bool {
        self.registry.is_live(dispatch_id).await
    }

    /// Apply a partial update, persist it, and publish the resulting
    /// status exactly once. If persistence fails the node is forced to
    /// FAILED before the event is published.
    #[instrument(skip(self, patch), fields(%dispatch_id, node_id))]
    pub async fn update_node_result(
        &self,
        dispatch_id: Uuid,
        node_id: NodeId,
        mut patch: NodeResultPatch,
    ) -> Result<NodeStatus, EngineError> {
        let workflow = self.workflow(dispatch_id).await?;
        let mut guard = workflow.lock().await;
        let node = guard
            .graph
            .node_mut(node_id)
            .ok_or(EngineError::UnknownNode { dispatch_id, node_id })?;

        if let Some(start_time) = patch.start_time {
            node.start_time = Some(start_time);
        }
        if let Some(end_time) = patch.end_time {
            node.end_time = Some(end_time);
        }
        if let Some(output) = patch.output.take() {
            node.output = Some(output);
        }
        if let Some(error) = patch.error.take() {
            node.error = Some(error);
        }
        if let Some(stdout) = patch.stdout.take() {
            node.stdout = stdout;
        }
        if let Some(stderr) = patch.stderr.take() {
            node.stderr = stderr;
        }
        if let Some(status) = patch.status {
            node.status = status;
        }

        let db_patch = ElectronPatch {
            start_time: node.start_time,
            end_time: node.end_time,
            status: Some(node.status.to_string()),
            output: node.output.clone(),
            error: node.error.clone(),
            stdout: Some(node.stdout.clone()),
            stderr: Some(node.stderr.clone()),
        };
        let mut final_status = node.status;

        if let Err(err) = self.store.update_electron(dispatch_id, node_id, db_patch).await {
            warn!(%dispatch_id, node_id, %err, "persistence failed, forcing node to FAILED");
            let node = guard.graph.node_mut(node_id).expect("checked above");
            node.status = NodeStatus::Failed;
            node.error = Some(format!("store error: {err}"));
            final_status = NodeStatus::Failed;
        }

        drop(guard);

        let queue = self.status_queue(dispatch_id).await?;
        queue.publish(StatusEvent { node_id, status: final_status });

        Ok(final_status)
    }

    /// Flush the workflow-level fields to the durable store.
    pub async fn persist_result(&self, dispatch_id: Uuid) -> Result<(), EngineError> {
        let workflow = self.workflow(dispatch_id).await?;
        let guard = workflow.lock().await;
        self.store
            .update_lattice(
                dispatch_id,
                LatticePatch {
                    status: Some(guard.status.to_string()),
                    start_time: guard.start_time,
                    end_time: guard.end_time,
                    error: guard.error.clone(),
                    result: guard.result.clone(),
                },
            )
            .await?;
        Ok(())
    }

    /// Flush, then drop the dispatch from the live registries.
    pub async fn finalize_dispatch(&self, dispatch_id: Uuid) -> Result<(), EngineError> {
        self.persist_result(dispatch_id).await?;
        self.registry.finalize(dispatch_id).await;
        Ok(())
    }

    /// Read a single node field, through the live graph if the dispatch
    /// is still active, otherwise from the store.
    pub async fn get_electron_attribute(
        &self,
        dispatch_id: Uuid,
        node_id: NodeId,
        key: &str,
    ) -> Result<Value, EngineError> {
        if self.is_live(dispatch_id).await {
            let workflow = self.workflow(dispatch_id).await?;
            let guard = workflow.lock().await;
            let node = guard
                .graph
                .node(node_id)
                .ok_or(EngineError::UnknownNode { dispatch_id, node_id })?;
            return Ok(match key {
                "name" => Value::String(node.name.clone()),
                "status" => Value::String(node.status.to_string()),
                "output" => node.output.clone().unwrap_or(Value::Null),
                "error" => node.error.clone().map(Value::String).unwrap_or(Value::Null),
                "stdout" => Value::String(node.stdout.clone()),
                "stderr" => Value::String(node.stderr.clone()),
                other => {
                    return Err(EngineError::Input(format!("unknown electron attribute '{other}'")));
                }
            });
        }

        Ok(self.store.get_electron_field(dispatch_id, node_id, key).await?)
    }

    pub async fn notify_webhook(&self, dispatch_id: Uuid, status: WorkflowStatus) {
        if let Some(webhook) = &self.webhook {
            webhook.notify(dispatch_id, status).await;
        }
    }

    /// Fallback path for `get_result_object` once a dispatch has been
    /// finalized and dropped from the live registry.
    pub async fn get_lattice(&self, dispatch_id: Uuid) -> Result<LatticeRecord, EngineError> {
        Ok(self.store.get_lattice(dispatch_id).await?)
    }
}

fn param_kind_label(kind: &crate::models::ParamKind) -> String {
    match kind {
        crate::models::ParamKind::Arg { .. } => "arg".to_string(),
        crate::models::ParamKind::Kwarg => "kwarg".to_string(),
        crate::models::ParamKind::WaitFor => "wait_for".to_string(),
    }
}

fn arg_index_of(kind: &crate::models::ParamKind) -> Option<i32> {
    match kind {
        crate::models::ParamKind::Arg { arg_index } => Some(*arg_index as i32),
        _ => None,
    }
}
