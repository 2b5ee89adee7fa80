//! Executor-level error type.

use thiserror::Error;

/// Errors returned by an executor's `execute`, `teardown`, or `from_dict`.
///
/// Per the engine's error taxonomy there is no "retryable" variant: the
/// engine does not auto-retry, so every failure here maps directly to a
/// FAILED node result.
#[derive(Debug, Error, Clone)]
pub enum ExecutorError {
    /// The callable raised, or the executor itself could not run it.
    #[error("{0}")]
    Failed(String),

    /// `from_dict` was given attributes the executor doesn't understand.
    #[error("invalid executor attributes: {0}")]
    InvalidAttributes(String),

    /// No executor is registered under the requested short name.
    #[error("unknown executor '{0}'")]
    UnknownExecutor(String),
}
