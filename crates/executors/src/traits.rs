//! The Executor contract — the seam between the engine and pluggable
//! task runtimes.
//!
//! Executors come in two flavours, both accepted by the Task Runner:
//! [`AsyncExecutor`] runs on the event loop directly; [`SyncExecutor`]
//! blocks the calling thread and is dispatched through `spawn_blocking`
//! so the scheduler's loop is never stalled.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::ExecutorError;

/// Identifies the node (or unplanned task) an executor call belongs to.
/// `node_id` is `None` for unplanned tasks (sublattice graph builds,
/// post-processing) that have no corresponding transport-graph node.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub dispatch_id: Uuid,
    pub node_id: Option<i64>,
}

/// Positional and keyword arguments assembled by the Task Runner from a
/// node's resolved parent outputs.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    pub args: Vec<Value>,
    pub kwargs: HashMap<String, Value>,
}

/// `(output, stdout, stderr)` captured from one executor call; a raised
/// exception collapses onto `Result::Err` rather than a separate flag,
/// since Rust already has a typed error channel.
#[derive(Debug, Clone, Default)]
pub struct ExecutorOutput {
    pub output: Value,
    pub stdout: String,
    pub stderr: String,
}

#[async_trait]
pub trait AsyncExecutor: Send + Sync {
    async fn execute(
        &self,
        callable: &Value,
        call_args: &CallArgs,
        ctx: &ExecutionContext,
    ) -> Result<ExecutorOutput, ExecutorError>;

    /// Graceful teardown of a shared instance, called once per constructed
    /// instance when its owning workflow terminates.
    async fn teardown(&self) {}

    fn short_name(&self) -> &'static str;

    /// Whether instances of this executor are cached and reused across
    /// nodes within a workflow (keyed by `instance_id`).
    fn shared(&self) -> bool {
        false
    }
}

pub trait SyncExecutor: Send + Sync {
    fn execute(
        &self,
        callable: &Value,
        call_args: &CallArgs,
        ctx: &ExecutionContext,
    ) -> Result<ExecutorOutput, ExecutorError>;

    fn teardown(&self) {}

    fn short_name(&self) -> &'static str;

    fn shared(&self) -> bool {
        false
    }
}

/// A constructed executor instance, erased over the sync/async split so
/// the Task Runner's executor cache can hold a single handle type
/// regardless of which flavour a node's descriptor resolves to.
#[derive(Clone)]
pub enum ExecutorHandle {
    Async(Arc<dyn AsyncExecutor + Send + Sync>),
    Sync(Arc<dyn SyncExecutor + Send + Sync>),
}

impl ExecutorHandle {
    pub fn short_name(&self) -> &'static str {
        match self {
            ExecutorHandle::Async(e) => e.short_name(),
            ExecutorHandle::Sync(e) => e.short_name(),
        }
    }

    pub fn shared(&self) -> bool {
        match self {
            ExecutorHandle::Async(e) => e.shared(),
            ExecutorHandle::Sync(e) => e.shared(),
        }
    }

    pub async fn execute(
        &self,
        callable: &Value,
        call_args: &CallArgs,
        ctx: &ExecutionContext,
    ) -> Result<ExecutorOutput, ExecutorError> {
        match self {
            ExecutorHandle::Async(e) => e.execute(callable, call_args, ctx).await,
            ExecutorHandle::Sync(e) => {
                let e = e.clone();
                let callable = callable.clone();
                let call_args = call_args.clone();
                let ctx = ctx.clone();
                tokio::task::spawn_blocking(move || e.execute(&callable, &call_args, &ctx))
                    .await
                    .map_err(|join_err| ExecutorError::Failed(join_err.to_string()))?
            }
        }
    }

    pub async fn teardown(&self) {
        match self {
            ExecutorHandle::Async(e) => e.teardown().await,
            ExecutorHandle::Sync(e) => {
                let e = e.clone();
                let _ = tokio::task::spawn_blocking(move || e.teardown()).await;
            }
        }
    }
}
