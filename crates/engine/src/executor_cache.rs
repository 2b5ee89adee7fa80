//! Per-workflow executor cache.
//!
//! Keyed by `instance_id`. Shared executors are constructed once, reused
//! across every node that names the same instance id, and torn down
//! exactly once when the last planned task against that instance
//! completes. Non-shared executors are constructed fresh per node, used
//! once, and torn down immediately.
//!
//! The planned count for an instance must include every use the
//! Scheduler can predict from the graph up front: its task nodes,
//! sublattice build steps (which run against the *workflow* executor),
//! and the eventual post-processing call — all computed once before the
//! Scheduler's main loop starts, so `tasks_left` never reaches zero
//! before the instance's real last use.

use std::collections::HashMap;

use executors::{ExecutorDescriptor, ExecutorError, ExecutorHandle, ExecutorRegistry};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Default)]
struct Slot {
    handle: Option<ExecutorHandle>,
    tasks_left: usize,
}

pub struct ExecutorCache {
    registry: ExecutorRegistry,
    slots: Mutex<HashMap<String, Slot>>,
}

impl ExecutorCache {
    pub fn new(registry: ExecutorRegistry) -> Self {
        Self { registry, slots: Mutex::new(HashMap::new()) }
    }

    /// Register the number of planned tasks for a shared instance,
    /// computed once from the graph before the Scheduler starts.
    pub async fn plan(&self, instance_id: &str, count: usize) {
        if count == 0 {
            return;
        }
        let mut slots = self.slots.lock().await;
        slots.entry(instance_id.to_string()).or_default().tasks_left += count;
    }

    /// Resolve (constructing on cache miss) the executor for `descriptor`.
    pub async fn resolve(
        &self,
        descriptor: &ExecutorDescriptor,
    ) -> Result<ExecutorHandle, ExecutorError> {
        if !descriptor.requests_shared() {
            debug!(short_name = %descriptor.short_name, "constructing non-shared executor");
            return self.registry.build(descriptor);
        }

        let instance_id = descriptor.instance_id().to_string();
        let mut slots = self.slots.lock().await;
        let slot = slots.entry(instance_id.clone()).or_default();
        if let Some(handle) = &slot.handle {
            return Ok(handle.clone());
        }

        debug!(%instance_id, "constructing shared executor");
        let handle = self.registry.build(descriptor)?;
        slot.handle = Some(handle.clone());
        Ok(handle)
    }

    /// Release one task's claim on `descriptor`'s executor. For shared
    /// executors this decrements the remaining-task counter and tears
    /// down the instance once it hits zero, so teardown is called exactly
    /// once per constructed instance. For non-shared executors the handle
    /// is torn down unconditionally since nothing else holds it.
    pub async fn release(&self, descriptor: &ExecutorDescriptor, handle: &ExecutorHandle) {
        if !descriptor.requests_shared() {
            handle.teardown().await;
            return;
        }

        let instance_id = descriptor.instance_id();
        let mut slots = self.slots.lock().await;
        let finished = match slots.get_mut(instance_id) {
            Some(slot) if slot.tasks_left > 0 => {
                slot.tasks_left -= 1;
                slot.tasks_left == 0
            }
            _ => false,
        };
        if finished {
            if let Some(slot) = slots.remove(instance_id) {
                drop(slots);
                if let Some(handle) = slot.handle {
                    handle.teardown().await;
                }
            }
        }
    }

    /// Tear down every remaining cached instance — called when a
    /// workflow ends FAILED or CANCELLED.
    pub async fn finalize_all(&self) {
        let mut slots = self.slots.lock().await;
        for (_, slot) in slots.drain() {
            if let Some(handle) = slot.handle {
                handle.teardown().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use executors::mock::MockExecutor;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn shared_executor_constructed_once_and_torn_down_once() {
        let mut registry = ExecutorRegistry::new();
        let mock = Arc::new(MockExecutor::returning(json!(1)).shared());
        let counters = mock.counters();
        registry.register("mock", move |_d| Ok(ExecutorHandle::Async(mock.clone())));

        let cache = ExecutorCache::new(registry);
        cache.plan("shared-1", 4).await;

        let descriptor = ExecutorDescriptor::new("mock").with_instance_id("shared-1").with_shared(true);

        for _ in 0..4 {
            let handle = cache.resolve(&descriptor).await.unwrap();
            handle
                .execute(
                    &json!(null),
                    &Default::default(),
                    &executors::ExecutionContext { dispatch_id: uuid::Uuid::new_v4(), node_id: None },
                )
                .await
                .unwrap();
            cache.release(&descriptor, &handle).await;
        }

        assert_eq!(counters.executions.load(Ordering::SeqCst), 4);
        assert_eq!(counters.teardowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_shared_executor_torn_down_every_use() {
        let mut registry = ExecutorRegistry::new();
        registry.register("mock", |_d| {
            Ok(ExecutorHandle::Async(Arc::new(MockExecutor::returning(json!(1)))))
        });
        let cache = ExecutorCache::new(registry);
        let descriptor = ExecutorDescriptor::new("mock");

        let handle = cache.resolve(&descriptor).await.unwrap();
        cache.release(&descriptor, &handle).await;
        // No panic, no leaked shared slot.
        cache.finalize_all().await;
    }
}
