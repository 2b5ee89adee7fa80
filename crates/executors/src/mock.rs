//! `MockExecutor` — a test double for [`crate::AsyncExecutor`].
//!
//! Useful for exercising the engine's executor-cache and shared-instance
//! accounting without a real runtime.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ExecutorError;
use crate::traits::{AsyncExecutor, CallArgs, ExecutionContext, ExecutorOutput};

/// Behaviour injected into `MockExecutor` at construction time.
pub enum MockBehaviour {
    ReturnValue(Value),
    Fail(String),
}

/// Shared counters so tests can assert how many times an instance was
/// constructed, executed, and torn down — even after it's been cloned
/// into an `Arc<dyn AsyncExecutor>` and handed to the engine's cache.
#[derive(Default)]
pub struct MockCounters {
    pub executions: AtomicUsize,
    pub teardowns: AtomicUsize,
}

pub struct MockExecutor {
    pub behaviour: MockBehaviour,
    pub shared: bool,
    pub calls: Arc<std::sync::Mutex<Vec<Value>>>,
    pub counters: Arc<MockCounters>,
}

impl MockExecutor {
    pub fn returning(value: Value) -> Self {
        Self {
            behaviour: MockBehaviour::ReturnValue(value),
            shared: false,
            calls: Arc::new(std::sync::Mutex::new(Vec::new())),
            counters: Arc::new(MockCounters::default()),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            behaviour: MockBehaviour::Fail(message.into()),
            shared: false,
            calls: Arc::new(std::sync::Mutex::new(Vec::new())),
            counters: Arc::new(MockCounters::default()),
        }
    }

    pub fn shared(mut self) -> Self {
        self.shared = true;
        self
    }

    pub fn counters(&self) -> Arc<MockCounters> {
        self.counters.clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl AsyncExecutor for MockExecutor {
    async fn execute(
        &self,
        _callable: &Value,
        call_args: &CallArgs,
        _ctx: &ExecutionContext,
    ) -> Result<ExecutorOutput, ExecutorError> {
        self.calls.lock().unwrap().push(serde_json::to_value(&call_args.args).unwrap_or(Value::Null));
        self.counters.executions.fetch_add(1, Ordering::SeqCst);

        match &self.behaviour {
            MockBehaviour::ReturnValue(v) => Ok(ExecutorOutput {
                output: v.clone(),
                stdout: String::new(),
                stderr: String::new(),
            }),
            MockBehaviour::Fail(msg) => Err(ExecutorError::Failed(msg.clone())),
        }
    }

    async fn teardown(&self) {
        self.counters.teardowns.fetch_add(1, Ordering::SeqCst);
    }

    fn short_name(&self) -> &'static str {
        "mock"
    }

    fn shared(&self) -> bool {
        self.shared
    }
}
