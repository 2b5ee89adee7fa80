//! Task Runner: input assembly, dependency materialisation, executor
//! dispatch, and sublattice re-entry for a single ready node.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use executors::deps::{materialize, Hook};
use executors::{CallArgs, ExecutionContext, ExecutorDescriptor, ExecutorError, ExecutorHandle};
use queue::NodeStatus;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::executor_cache::ExecutorCache;
use crate::models::{EdgeRecord, NodeCategory, NodeId, NodeResultPatch, ParamKind, WorkflowStatus, WorkflowSubmission};
use crate::EngineHandle;

/// Execute a single non-parameter node end to end: assemble its inputs,
/// materialise and run its dependency hooks, resolve its executor, run
/// the callable (or, for a sublattice node, recurse into a child
/// workflow), and record the outcome.
#[instrument(skip(engine, cache), fields(%dispatch_id, node_id))]
pub async fn run_node(
    engine: &EngineHandle,
    cache: &Arc<ExecutorCache>,
    dispatch_id: Uuid,
    node_id: NodeId,
) -> Result<(), EngineError> {
    let running_status = engine
        .results()
        .update_node_result(
            dispatch_id,
            node_id,
            NodeResultPatch {
                status: Some(NodeStatus::Running),
                start_time: Some(Utc::now()),
                ..Default::default()
            },
        )
        .await?;

    if running_status.is_terminal() {
        // The store write that should have landed RUNNING failed, and the
        // Result Service already forced this node to a terminal status and
        // published its event. Running the callable now would flip an
        // already-terminal node and publish a second terminal event.
        return Ok(());
    }

    let (category, callable, descriptor, deps, workflow_executor, parents) = {
        let workflow = engine.results().workflow(dispatch_id).await?;
        let guard = workflow.lock().await;
        let node = guard
            .graph
            .node(node_id)
            .ok_or(EngineError::UnknownNode { dispatch_id, node_id })?;

        let mut parents = Vec::new();
        for parent_id in guard.graph.dependencies(node_id) {
            let output = guard.graph.node(parent_id).and_then(|p| p.output.clone());
            for edge in guard.graph.edge_data(parent_id, node_id) {
                parents.push((parent_id, edge.clone(), output.clone()));
            }
        }

        (
            node.category,
            node.callable.clone(),
            node.executor.clone(),
            node.deps.clone(),
            guard.workflow_executor.clone(),
            parents,
        )
    };

    if category == NodeCategory::Sublattice {
        return run_sublattice_node(engine, cache, dispatch_id, node_id, callable, workflow_executor).await;
    }

    let call_args = assemble_inputs(category, &parents);
    let (before, after) = materialize(&deps);
    let ctx = ExecutionContext { dispatch_id, node_id: Some(node_id) };

    let handle = match cache.resolve(&descriptor).await {
        Ok(handle) => handle,
        Err(err) => {
            return fail_node(engine, dispatch_id, node_id, format!("failed to construct executor: {err}")).await;
        }
    };

    for hook in &before {
        if let Err(err) = run_hook(&handle, hook, &ctx).await {
            cache.release(&descriptor, &handle).await;
            return fail_node(engine, dispatch_id, node_id, format!("call_before hook failed: {err}")).await;
        }
    }

    let callable = match callable {
        Some(callable) => callable,
        None => {
            cache.release(&descriptor, &handle).await;
            return fail_node(engine, dispatch_id, node_id, "task node has no callable".to_string()).await;
        }
    };

    let result = handle.execute(&callable, &call_args, &ctx).await;

    for hook in &after {
        if let Err(err) = run_hook(&handle, hook, &ctx).await {
            warn!(%dispatch_id, node_id, %err, "call_after hook failed, ignoring");
        }
    }

    cache.release(&descriptor, &handle).await;

    match result {
        Ok(output) => {
            engine
                .results()
                .update_node_result(
                    dispatch_id,
                    node_id,
                    NodeResultPatch {
                        status: Some(NodeStatus::Completed),
                        output: Some(output.output),
                        stdout: Some(output.stdout),
                        stderr: Some(output.stderr),
                        end_time: Some(Utc::now()),
                        ..Default::default()
                    },
                )
                .await?;
            Ok(())
        }
        Err(err) => fail_node(engine, dispatch_id, node_id, err.to_string()).await,
    }
}

/// Assemble call arguments per node category.
fn assemble_inputs(category: NodeCategory, parents: &[(NodeId, EdgeRecord, Option<Value>)]) -> CallArgs {
    match category {
        NodeCategory::ListCollector => {
            let mut ordered: Vec<&(NodeId, EdgeRecord, Option<Value>)> = parents.iter().collect();
            ordered.sort_by_key(|(id, _, _)| *id);
            let values = ordered.into_iter().map(|(_, _, out)| out.clone().unwrap_or(Value::Null)).collect();
            CallArgs { args: vec![Value::Array(values)], kwargs: HashMap::new() }
        }
        NodeCategory::DictCollector => {
            let mut map = serde_json::Map::new();
            for (_, edge, out) in parents {
                map.insert(edge.edge_name.clone(), out.clone().unwrap_or(Value::Null));
            }
            CallArgs { args: vec![Value::Object(map)], kwargs: HashMap::new() }
        }
        NodeCategory::Task | NodeCategory::Sublattice | NodeCategory::Parameter => {
            let mut positional: Vec<(i64, Value)> = Vec::new();
            let mut kwargs = HashMap::new();
            for (_, edge, out) in parents {
                match &edge.param_kind {
                    ParamKind::Arg { arg_index } => positional.push((*arg_index, out.clone().unwrap_or(Value::Null))),
                    ParamKind::Kwarg => {
                        kwargs.insert(edge.edge_name.clone(), out.clone().unwrap_or(Value::Null));
                    }
                    ParamKind::WaitFor => {}
                }
            }
            positional.sort_by_key(|(index, _)| *index);
            let args = positional.into_iter().map(|(_, value)| value).collect();
            CallArgs { args, kwargs }
        }
    }
}

async fn run_hook(handle: &ExecutorHandle, hook: &Hook, ctx: &ExecutionContext) -> Result<(), ExecutorError> {
    match hook {
        Hook::Shell { command } => {
            debug!(%command, "skipping shell dependency, no sandboxed shell in this runtime");
            Ok(())
        }
        Hook::Pip { packages } => {
            debug!(?packages, "skipping package dependency, no sandboxed install in this runtime");
            Ok(())
        }
        Hook::Call { callable } => handle.execute(callable, &CallArgs::default(), ctx).await.map(|_| ()),
    }
}

async fn fail_node(engine: &EngineHandle, dispatch_id: Uuid, node_id: NodeId, message: String) -> Result<(), EngineError> {
    engine
        .results()
        .update_node_result(
            dispatch_id,
            node_id,
            NodeResultPatch {
                status: Some(NodeStatus::Failed),
                error: Some(message),
                end_time: Some(Utc::now()),
                ..Default::default()
            },
        )
        .await?;
    Ok(())
}

/// Sublattice re-entry: build the child graph on the workflow's own
/// executor, then recurse into a full nested `run_workflow` for it.
/// `Box::pin` breaks the otherwise-infinite
/// `run_workflow -> run_node -> run_workflow` type.
async fn run_sublattice_node(
    engine: &EngineHandle,
    cache: &Arc<ExecutorCache>,
    dispatch_id: Uuid,
    node_id: NodeId,
    callable: Option<Value>,
    workflow_executor: ExecutorDescriptor,
) -> Result<(), EngineError> {
    let build_handle = match cache.resolve(&workflow_executor).await {
        Ok(handle) => handle,
        Err(err) => {
            return fail_node(engine, dispatch_id, node_id, format!("failed to construct sublattice build executor: {err}")).await;
        }
    };

    let build_ctx = ExecutionContext { dispatch_id, node_id: None };
    let callable = callable.unwrap_or(Value::Null);
    let built = build_handle.execute(&callable, &CallArgs::default(), &build_ctx).await;
    cache.release(&workflow_executor, &build_handle).await;

    let output = match built {
        Ok(output) => output,
        Err(err) => {
            return fail_node(engine, dispatch_id, node_id, format!("failed to build sublattice graph: {err}")).await;
        }
    };

    let submission: WorkflowSubmission = match serde_json::from_value(output.output) {
        Ok(submission) => submission,
        Err(err) => {
            return fail_node(engine, dispatch_id, node_id, format!("malformed sublattice graph: {err}")).await;
        }
    };

    let child_dispatch_id = match engine.make_sub_dispatch(submission, (dispatch_id, node_id)).await {
        Ok(id) => id,
        Err(err) => {
            return fail_node(engine, dispatch_id, node_id, format!("failed to dispatch sublattice: {err}")).await;
        }
    };

    let outcome = engine.run_workflow(child_dispatch_id).await?;

    match outcome.status {
        WorkflowStatus::Completed => {
            engine
                .results()
                .update_node_result(
                    dispatch_id,
                    node_id,
                    NodeResultPatch {
                        status: Some(NodeStatus::Completed),
                        output: Some(outcome.result.unwrap_or(Value::Null)),
                        end_time: Some(Utc::now()),
                        ..Default::default()
                    },
                )
                .await?;
            Ok(())
        }
        _ => fail_node(engine, dispatch_id, node_id, "Sublattice workflow failed to complete".to_string()).await,
    }
}
