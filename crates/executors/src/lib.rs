//! `executors` crate — the Executor contract, a discovery registry, and
//! the in-tree executors used by the engine's tests and CLI.

pub mod deps;
pub mod descriptor;
pub mod error;
pub mod local;
pub mod mock;
pub mod registry;
pub mod shell;
pub mod traits;

pub use descriptor::{ExecutorDescriptor, CLIENT_EXECUTOR};
pub use error::ExecutorError;
pub use local::{LocalExecutor, TaskExpr};
pub use registry::ExecutorRegistry;
pub use shell::ShellExecutor;
pub use traits::{AsyncExecutor, CallArgs, ExecutionContext, ExecutorHandle, ExecutorOutput, SyncExecutor};
