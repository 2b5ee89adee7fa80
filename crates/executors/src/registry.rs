//! Executor discovery: executors are looked up by short name in a
//! registry rather than hard-wired into the engine.

use std::collections::HashMap;
use std::sync::Arc;

use crate::descriptor::ExecutorDescriptor;
use crate::error::ExecutorError;
use crate::traits::ExecutorHandle;

type Factory = Arc<dyn Fn(&ExecutorDescriptor) -> Result<ExecutorHandle, ExecutorError> + Send + Sync>;

/// Maps executor short names to factories that build a fresh instance
/// from a descriptor.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    factories: HashMap<String, Factory>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        short_name: impl Into<String>,
        factory: impl Fn(&ExecutorDescriptor) -> Result<ExecutorHandle, ExecutorError> + Send + Sync + 'static,
    ) {
        self.factories.insert(short_name.into(), Arc::new(factory));
    }

    pub fn build(&self, descriptor: &ExecutorDescriptor) -> Result<ExecutorHandle, ExecutorError> {
        let factory = self
            .factories
            .get(&descriptor.short_name)
            .ok_or_else(|| ExecutorError::UnknownExecutor(descriptor.short_name.clone()))?;
        factory(descriptor)
    }

    /// A registry pre-populated with the in-tree executors, the way a
    /// fresh engine handle is expected to be constructed for tests and
    /// for the CLI's default `local` runtime.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("local", |_descriptor| {
            Ok(ExecutorHandle::Async(Arc::new(crate::local::LocalExecutor::new())))
        });
        registry.register("shell", |descriptor| {
            Ok(ExecutorHandle::Sync(Arc::new(crate::shell::ShellExecutor::from_descriptor(descriptor)?)))
        });
        registry
    }
}
