//! `engine` crate — the dispatch engine: Graph Store, Result Service,
//! Scheduler, Task Runner and Post-Processor, wired together behind a
//! single [`EngineHandle`]. Process-wide state is encapsulated there with
//! explicit construction, so tests can build a fresh engine per case.

pub mod dag;
pub mod error;
pub mod executor_cache;
pub mod models;
pub mod postprocessor;
pub mod result_service;
pub mod scheduler;
pub mod task_runner;
pub mod webhook;

use std::collections::HashMap;
use std::sync::Arc;

use db::Store;
use executors::ExecutorRegistry;
use queue::{ReadyQueue, ReadySignal};
use tokio::sync::Mutex;
use uuid::Uuid;

pub use error::EngineError;
pub use models::{
    NodeId, ResultObject, Workflow, WorkflowOutcome, WorkflowStatus, WorkflowSubmission,
};
pub use result_service::ResultService;
pub use webhook::WebhookClient;

struct Inner {
    results: ResultService,
    executor_registry: ExecutorRegistry,
    /// One entry per in-flight `run_workflow` call, so `cancel_workflow`
    /// can push the stop sentinel onto the right dispatch's ready queue.
    ready_queues: Mutex<HashMap<Uuid, ReadyQueue>>,
}

/// The engine's single external handle. Cheap to clone — internally an
/// `Arc` — so it can be threaded into spawned node tasks and recursive
/// sublattice dispatches alike.
#[derive(Clone)]
pub struct EngineHandle(Arc<Inner>);

impl EngineHandle {
    pub fn new(store: Arc<dyn Store>, executor_registry: ExecutorRegistry, webhook: Option<WebhookClient>) -> Self {
        Self(Arc::new(Inner {
            results: ResultService::new(store, webhook),
            executor_registry,
            ready_queues: Mutex::new(HashMap::new()),
        }))
    }

    /// A fresh engine over an in-memory store with the built-in executors
    /// registered — what tests and the CLI's default run mode construct.
    pub fn with_memstore() -> Self {
        Self::new(Arc::new(db::MemStore::new()), ExecutorRegistry::with_builtins(), None)
    }

    pub fn results(&self) -> &ResultService {
        &self.0.results
    }

    pub(crate) fn executor_registry(&self) -> ExecutorRegistry {
        self.0.executor_registry.clone()
    }

    /// Register a top-level submission and return its new dispatch id.
    pub async fn make_dispatch(&self, submission: WorkflowSubmission) -> Result<Uuid, EngineError> {
        self.0.results.make_dispatch(submission, None).await
    }

    /// Register a sublattice's child workflow, linked back to the parent
    /// node that spawned it.
    pub(crate) async fn make_sub_dispatch(
        &self,
        submission: WorkflowSubmission,
        parent: (Uuid, NodeId),
    ) -> Result<Uuid, EngineError> {
        self.0.results.make_dispatch(submission, Some(parent)).await
    }

    /// Drive a registered dispatch to a terminal status.
    pub async fn run_workflow(&self, dispatch_id: Uuid) -> Result<WorkflowOutcome, EngineError> {
        scheduler::run(self.clone(), dispatch_id).await
    }

    /// Insert the stop sentinel into the dispatch's ready queue. Returns an
    /// error if the dispatch isn't currently running.
    pub async fn cancel_workflow(&self, dispatch_id: Uuid) -> Result<(), EngineError> {
        let queues = self.0.ready_queues.lock().await;
        match queues.get(&dispatch_id) {
            Some(queue) => {
                queue.push(ReadySignal::Stop);
                Ok(())
            }
            None => Err(EngineError::UnknownDispatch(dispatch_id)),
        }
    }

    /// A snapshot of the workflow's terminal (or in-flight) state, whether
    /// it's still live or has already been finalized.
    pub async fn get_result_object(&self, dispatch_id: Uuid) -> Result<ResultObject, EngineError> {
        if self.0.results.is_live(dispatch_id).await {
            let workflow = self.0.results.workflow(dispatch_id).await?;
            let guard = workflow.lock().await;
            return Ok(ResultObject {
                dispatch_id,
                status: guard.status,
                result: guard.result.clone(),
                error: guard.error.clone(),
                start_time: guard.start_time,
                end_time: guard.end_time,
            });
        }

        let lattice = self.0.results.get_lattice(dispatch_id).await?;
        Ok(ResultObject {
            dispatch_id,
            status: WorkflowStatus::parse(&lattice.status).unwrap_or(WorkflowStatus::Failed),
            result: lattice.result,
            error: lattice.error,
            start_time: lattice.start_time,
            end_time: lattice.end_time,
        })
    }

    /// Read a single field off one node without pulling the whole workflow
    /// record.
    pub async fn get_electron_attribute(
        &self,
        dispatch_id: Uuid,
        node_id: NodeId,
        key: &str,
    ) -> Result<serde_json::Value, EngineError> {
        self.0.results.get_electron_attribute(dispatch_id, node_id, key).await
    }

    pub(crate) async fn register_ready_queue(&self, dispatch_id: Uuid, queue: ReadyQueue) {
        self.0.ready_queues.lock().await.insert(dispatch_id, queue);
    }

    pub(crate) async fn unregister_ready_queue(&self, dispatch_id: Uuid) {
        self.0.ready_queues.lock().await.remove(&dispatch_id);
    }
}
