//! Post-Processor: re-run the workflow function with node outputs
//! substituted at call sites.

use std::sync::Arc;

use chrono::Utc;
use executors::{CallArgs, ExecutionContext, CLIENT_EXECUTOR};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::instrument;
use uuid::Uuid;

use crate::error::EngineError;
use crate::executor_cache::ExecutorCache;
use crate::models::{Workflow, WorkflowOutcome, WorkflowStatus};
use crate::EngineHandle;

/// Run post-processing for a workflow whose nodes have all completed.
/// Honors the "client" executor opt-out: when the workflow executor's
/// short name is `client`, post-processing is left to the submitting
/// client and the dispatch parks at PENDING_POSTPROCESSING.
#[instrument(skip(engine, cache), fields(%dispatch_id))]
pub async fn run(engine: &EngineHandle, cache: &Arc<ExecutorCache>, dispatch_id: Uuid) -> Result<WorkflowOutcome, EngineError> {
    let workflow = engine.results().workflow(dispatch_id).await?;

    let (workflow_executor, workflow_function, opts_out) = {
        let guard = workflow.lock().await;
        let opts_out = guard.workflow_executor.short_name == CLIENT_EXECUTOR;
        (guard.workflow_executor.clone(), guard.workflow_function.clone(), opts_out)
    };

    if opts_out {
        let mut guard = workflow.lock().await;
        guard.status = WorkflowStatus::PendingPostprocessing;
        guard.end_time = Some(Utc::now());
        return Ok(WorkflowOutcome { status: guard.status, result: guard.result.clone(), error: guard.error.clone() });
    }

    {
        let mut guard = workflow.lock().await;
        guard.status = WorkflowStatus::Postprocessing;
    }

    // Ordered outputs, skipping internal synthetic nodes unless they are
    // sublattice nodes.
    let node_outputs: Vec<Value> = {
        let guard = workflow.lock().await;
        guard
            .graph
            .node_ids_in_order()
            .filter_map(|id| {
                let node = guard.graph.node(id)?;
                if node.is_internal() {
                    return None;
                }
                Some(node.output.clone().unwrap_or(Value::Null))
            })
            .collect()
    };

    let handle = match cache.resolve(&workflow_executor).await {
        Ok(handle) => handle,
        Err(err) => return Ok(mark_failed(&workflow, format!("failed to construct post-processing executor: {err}")).await),
    };

    let ctx = ExecutionContext { dispatch_id, node_id: None };
    let call_args = CallArgs { args: vec![Value::Array(node_outputs)], kwargs: Default::default() };
    let result = handle.execute(&workflow_function, &call_args, &ctx).await;
    cache.release(&workflow_executor, &handle).await;

    let outcome = match result {
        Ok(output) => {
            let mut guard = workflow.lock().await;
            guard.status = WorkflowStatus::Completed;
            guard.result = Some(output.output);
            guard.end_time = Some(Utc::now());
            WorkflowOutcome { status: guard.status, result: guard.result.clone(), error: None }
        }
        Err(err) => mark_failed(&workflow, format!("post-processing failed: {err}")).await,
    };

    Ok(outcome)
}

async fn mark_failed(workflow: &Arc<Mutex<Workflow>>, message: String) -> WorkflowOutcome {
    let mut guard = workflow.lock().await;
    guard.status = WorkflowStatus::PostprocessingFailed;
    guard.error = Some(message.clone());
    guard.end_time = Some(Utc::now());
    WorkflowOutcome { status: guard.status, result: None, error: Some(message) }
}
