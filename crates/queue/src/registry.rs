//! Process-wide registries: live workflows and their status queues, keyed
//! by `dispatch_id`.
//!
//! Generic over the live-workflow payload type so this crate doesn't need
//! to know about the engine's domain model — it only owns the concurrency
//! primitives the engine builds on. A fresh `DispatchRegistry` is cheap
//! enough to construct per test.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::channels::{StatusQueue, StatusQueueReceiver};

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("no live dispatch registered for {0}")]
    UnknownDispatch(Uuid),
}

/// A live workflow record plus the lock guarding it. `W` is the engine's
/// `Workflow` type; wrapping it in an `Arc<Mutex<_>>` gives the "at most
/// one writer per workflow" discipline.
pub struct DispatchRegistry<W> {
    workflows: Mutex<HashMap<Uuid, Arc<Mutex<W>>>>,
    status_queues: Mutex<HashMap<Uuid, StatusQueue>>,
}

impl<W> Default for DispatchRegistry<W> {
    fn default() -> Self {
        Self {
            workflows: Mutex::new(HashMap::new()),
            status_queues: Mutex::new(HashMap::new()),
        }
    }
}

impl<W> DispatchRegistry<W> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly-constructed live workflow, allocating its status
    /// queue.
    pub async fn register(&self, dispatch_id: Uuid, workflow: W) -> StatusQueueReceiver {
        let (queue, receiver) = StatusQueue::new();
        self.workflows
            .lock()
            .await
            .insert(dispatch_id, Arc::new(Mutex::new(workflow)));
        self.status_queues.lock().await.insert(dispatch_id, queue);
        receiver
    }

    pub async fn get(&self, dispatch_id: Uuid) -> Result<Arc<Mutex<W>>, RegistryError> {
        self.workflows
            .lock()
            .await
            .get(&dispatch_id)
            .cloned()
            .ok_or(RegistryError::UnknownDispatch(dispatch_id))
    }

    pub async fn status_queue(&self, dispatch_id: Uuid) -> Result<StatusQueue, RegistryError> {
        self.status_queues
            .lock()
            .await
            .get(&dispatch_id)
            .cloned()
            .ok_or(RegistryError::UnknownDispatch(dispatch_id))
    }

    /// Remove a workflow and its status queue from the live registries.
    pub async fn finalize(&self, dispatch_id: Uuid) {
        self.workflows.lock().await.remove(&dispatch_id);
        self.status_queues.lock().await.remove(&dispatch_id);
    }

    pub async fn is_live(&self, dispatch_id: Uuid) -> bool {
        self.workflows.lock().await.contains_key(&dispatch_id)
    }
}
