//! Scheduler: the topological, dependency-counting driver.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use queue::{NodeStatus, ReadyQueue, ReadySignal};
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::executor_cache::ExecutorCache;
use crate::models::{NodeCategory, NodeId, NodeResultPatch, WorkflowOutcome, WorkflowStatus};
use crate::task_runner;
use crate::EngineHandle;

/// Drive `dispatch_id` to a terminal status.
///
/// Boxed (rather than a plain `async fn`) because sublattice nodes
/// re-enter the scheduler via `EngineHandle::run_workflow`, and an
/// opaque `impl Future` return type here would make that recursion's
/// `Send`-ness unresolvable at compile time.
pub fn run(
    engine: EngineHandle,
    dispatch_id: Uuid,
) -> Pin<Box<dyn Future<Output = Result<WorkflowOutcome, EngineError>> + Send>> {
    Box::pin(run_inner(engine, dispatch_id))
}

#[instrument(skip(engine), fields(%dispatch_id))]
async fn run_inner(engine: EngineHandle, dispatch_id: Uuid) -> Result<WorkflowOutcome, EngineError> {
    let workflow_arc = engine.results().workflow(dispatch_id).await?;
    let mut status_rx = engine.results().take_status_receiver(dispatch_id).await?;
    let (ready_tx, mut ready_rx) = ReadyQueue::new();
    engine.register_ready_queue(dispatch_id, ready_tx.clone()).await;

    let cache = Arc::new(ExecutorCache::new(engine.executor_registry()));

    // ------------------------------------------------------------------
    // Initialization: seed pending counters and the ready queue; plan
    // executor-cache instance counts; transition to RUNNING.
    // ------------------------------------------------------------------
    let mut pending: HashMap<NodeId, usize> = HashMap::new();
    let total_nodes;
    {
        let mut guard = workflow_arc.lock().await;
        guard.status = WorkflowStatus::Running;
        guard.start_time = Some(Utc::now());

        total_nodes = guard.graph.nodes.len();

        // Plan every use of a shared instance the graph lets us predict up
        // front: each task node's own executor, each sublattice node's
        // build step (always run on the *workflow* executor), and the
        // eventual post-processing call (skipped only for the "client"
        // opt-out) — see executor_cache's doc comment for why this must
        // all be known before the loop starts.
        let mut planned: HashMap<String, usize> = HashMap::new();
        for node in guard.graph.nodes.values() {
            match node.category {
                NodeCategory::Parameter => {}
                NodeCategory::Sublattice => {
                    *planned.entry(guard.workflow_executor.instance_id().to_string()).or_default() += 1;
                }
                NodeCategory::Task | NodeCategory::ListCollector | NodeCategory::DictCollector => {
                    *planned.entry(node.executor.instance_id().to_string()).or_default() += 1;
                }
            }
        }
        if guard.workflow_executor.short_name != executors::CLIENT_EXECUTOR {
            *planned.entry(guard.workflow_executor.instance_id().to_string()).or_default() += 1;
        }
        for (instance_id, count) in &planned {
            cache.plan(instance_id, *count).await;
        }

        for id in guard.graph.node_ids_in_order().collect::<Vec<_>>() {
            let degree = guard.graph.in_degree(id);
            pending.insert(id, degree);
            if degree == 0 {
                ready_tx.push(ReadySignal::Node(id));
            }
        }
    }
    engine.results().persist_result(dispatch_id).await?;
    engine.results().notify_webhook(dispatch_id, WorkflowStatus::Running).await;

    // ------------------------------------------------------------------
    // Main loop.
    // ------------------------------------------------------------------
    let mut in_flight: JoinSet<()> = JoinSet::new();
    let mut completed_count = 0usize;
    let mut stopped = false;

    loop {
        if !stopped && completed_count == total_nodes {
            break;
        }

        tokio::select! {
            ready = ready_rx.recv() => {
                match ready {
                    None => break,
                    Some(ReadySignal::Stop) => {
                        stopped = true;
                        finalize_stop(&engine, dispatch_id).await?;
                        break;
                    }
                    Some(ReadySignal::Node(node_id)) => {
                        dispatch_ready_node(&engine, &cache, dispatch_id, node_id, &mut in_flight).await?;
                    }
                }
            }

            Some(event) = status_rx.recv() => {
                if stopped {
                    continue;
                }
                match event.status {
                    NodeStatus::Completed => {
                        completed_count += 1;
                        advance_children(&workflow_arc, &ready_tx, &mut pending, event.node_id).await;
                    }
                    NodeStatus::Failed => {
                        fail_workflow(&engine, &workflow_arc, dispatch_id, event.node_id, &ready_tx).await?;
                    }
                    NodeStatus::Cancelled => {
                        // A node surrendering as CANCELLED after an
                        // external cancel request; the workflow-level
                        // transition is handled when the Stop sentinel
                        // itself is observed (see `finalize_stop`).
                    }
                    NodeStatus::Running | NodeStatus::NewObject => {}
                }
            }
        }
    }

    // Drain any remaining in-flight node tasks; their results are still
    // persisted via `update_node_result` but no longer drive scheduling
    // decisions.
    while in_flight.join_next().await.is_some() {}

    engine.unregister_ready_queue(dispatch_id).await;

    let final_status = workflow_arc.lock().await.status;
    let outcome = if final_status == WorkflowStatus::Running {
        // All nodes completed without failure — hand off to post-processing.
        crate::postprocessor::run(&engine, &cache, dispatch_id).await?
    } else {
        let guard = workflow_arc.lock().await;
        WorkflowOutcome { status: guard.status, result: guard.result.clone(), error: guard.error.clone() }
    };
    cache.finalize_all().await;

    engine.results().persist_result(dispatch_id).await?;
    engine.results().notify_webhook(dispatch_id, outcome.status).await;
    engine.results().finalize_dispatch(dispatch_id).await?;
    info!(%dispatch_id, status = %outcome.status, "workflow run finished");
    Ok(outcome)
}

async fn dispatch_ready_node(
    engine: &EngineHandle,
    cache: &Arc<ExecutorCache>,
    dispatch_id: Uuid,
    node_id: NodeId,
    in_flight: &mut JoinSet<()>,
) -> Result<(), EngineError> {
    let category = {
        let workflow = engine.results().workflow(dispatch_id).await?;
        let guard = workflow.lock().await;
        guard
            .graph
            .node(node_id)
            .ok_or(EngineError::UnknownNode { dispatch_id, node_id })?
            .category
    };

    if category == NodeCategory::Parameter {
        // Parameter nodes carry their value already; synthesize the
        // COMPLETED transition directly, no executor dispatch needed.
        let value = {
            let workflow = engine.results().workflow(dispatch_id).await?;
            let guard = workflow.lock().await;
            guard.graph.node(node_id).and_then(|n| n.value.clone())
        };
        let now = Utc::now();
        engine
            .results()
            .update_node_result(
                dispatch_id,
                node_id,
                NodeResultPatch {
                    status: Some(NodeStatus::Completed),
                    output: value,
                    start_time: Some(now),
                    end_time: Some(now),
                    ..Default::default()
                },
            )
            .await?;
        return Ok(());
    }

    let engine = engine.clone();
    let cache = cache.clone();
    in_flight.spawn(async move {
        if let Err(err) = task_runner::run_node(&engine, &cache, dispatch_id, node_id).await {
            error!(%dispatch_id, node_id, %err, "task runner failed to execute node");
        }
    });
    Ok(())
}

async fn advance_children(
    workflow_arc: &Arc<tokio::sync::Mutex<crate::models::Workflow>>,
    ready_tx: &ReadyQueue,
    pending: &mut HashMap<NodeId, usize>,
    completed_node: NodeId,
) {
    let children = {
        let guard = workflow_arc.lock().await;
        guard
            .graph
            .outgoing(completed_node)
            .into_iter()
            .map(|(child, edges)| (child, edges.len()))
            .collect::<Vec<_>>()
    };

    for (child, edge_count) in children {
        if let Some(remaining) = pending.get_mut(&child) {
            *remaining = remaining.saturating_sub(edge_count);
            if *remaining == 0 {
                ready_tx.push(ReadySignal::Node(child));
            }
        }
    }
}

async fn fail_workflow(
    engine: &EngineHandle,
    workflow_arc: &Arc<tokio::sync::Mutex<crate::models::Workflow>>,
    dispatch_id: Uuid,
    failed_node: NodeId,
    ready_tx: &ReadyQueue,
) -> Result<(), EngineError> {
    let mut guard = workflow_arc.lock().await;
    if guard.status.is_terminal() {
        return Ok(());
    }
    let node_error = guard
        .graph
        .node(failed_node)
        .and_then(|n| n.error.clone())
        .unwrap_or_else(|| "no error detail".to_string());
    guard.status = WorkflowStatus::Failed;
    guard.end_time = Some(Utc::now());
    guard.error = Some(format!("node {failed_node} failed: {node_error}"));
    drop(guard);

    warn!(%dispatch_id, failed_node, "workflow failing");
    engine.results().persist_result(dispatch_id).await?;
    ready_tx.push(ReadySignal::Stop);
    Ok(())
}

/// Reached when the Stop sentinel is popped from the ready queue. If the
/// workflow isn't already FAILED (set by `fail_workflow`), this must be
/// an external cancellation.
async fn finalize_stop(engine: &EngineHandle, dispatch_id: Uuid) -> Result<(), EngineError> {
    let workflow = engine.results().workflow(dispatch_id).await?;
    let mut guard = workflow.lock().await;
    if guard.status == WorkflowStatus::Running {
        guard.status = WorkflowStatus::Cancelled;
        guard.end_time = Some(Utc::now());
    }
    drop(guard);
    engine.results().persist_result(dispatch_id).await?;
    Ok(())
}
