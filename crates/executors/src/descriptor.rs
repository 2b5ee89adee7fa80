//! Executor descriptors — the data half of an executor.
//!
//! A descriptor is a `(short_name, attribute-map)` pair produced by the
//! client SDK when a workflow is built. Instances are constructed lazily
//! by the Task Runner (`engine::task_runner`) via the [`crate::ExecutorRegistry`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A two-tuple `(short_name, attributes)` identifying an executor
/// configuration. `attributes.instance_id` identifies shared instances
/// across nodes within the same workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutorDescriptor {
    pub short_name: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl ExecutorDescriptor {
    pub fn new(short_name: impl Into<String>) -> Self {
        Self {
            short_name: short_name.into(),
            attributes: Map::new(),
        }
    }

    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.attributes
            .insert("instance_id".to_string(), Value::String(instance_id.into()));
        self
    }

    pub fn with_shared(mut self, shared: bool) -> Self {
        self.attributes.insert("shared".to_string(), Value::Bool(shared));
        self
    }

    /// The cache key used by the workflow-scoped executor cache. Falls
    /// back to the short name itself when no `instance_id` is set, which
    /// makes every such executor implicitly "use once" (no two nodes
    /// share a cache slot unless they agree on an explicit instance id).
    pub fn instance_id(&self) -> &str {
        self.attributes
            .get("instance_id")
            .and_then(Value::as_str)
            .unwrap_or(self.short_name.as_str())
    }

    pub fn requests_shared(&self) -> bool {
        self.attributes
            .get("shared")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// The "client" sentinel short name used for post-processing executors
/// that mean "finish this on the client side".
pub const CLIENT_EXECUTOR: &str = "client";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_id_falls_back_to_short_name() {
        let d = ExecutorDescriptor::new("local");
        assert_eq!(d.instance_id(), "local");
    }

    #[test]
    fn explicit_instance_id_wins() {
        let d = ExecutorDescriptor::new("local").with_instance_id("shared-1");
        assert_eq!(d.instance_id(), "shared-1");
    }
}
