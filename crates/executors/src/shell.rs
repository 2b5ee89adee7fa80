//! `shell` executor — runs a literal shell command synchronously.
//!
//! Unlike `local`, which evaluates its callable in-process on the async
//! runtime, this one shells out via `std::process::Command`, which
//! blocks the calling thread for the duration of the subprocess. It's
//! the concrete reason `ExecutorHandle::Sync` exists and why it's
//! dispatched through `tokio::task::spawn_blocking` rather than awaited
//! directly on the scheduler's loop.

use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::descriptor::ExecutorDescriptor;
use crate::error::ExecutorError;
use crate::traits::{CallArgs, ExecutionContext, ExecutorOutput, SyncExecutor};

/// Evaluates a command string against `sh -c`. The callable is the
/// command text itself; positional args are appended as `$1`, `$2`, ...
pub struct ShellExecutor {
    shared: bool,
    timeout_secs: Option<u64>,
}

impl ShellExecutor {
    pub fn from_descriptor(descriptor: &ExecutorDescriptor) -> Result<Self, ExecutorError> {
        let timeout_secs = match descriptor.attributes.get("timeout_secs") {
            None => None,
            Some(Value::Number(n)) => Some(n.as_u64().ok_or_else(|| {
                ExecutorError::InvalidAttributes(format!(
                    "timeout_secs must be a non-negative integer, got {n}"
                ))
            })?),
            Some(other) => {
                return Err(ExecutorError::InvalidAttributes(format!(
                    "timeout_secs must be a number, got {other}"
                )));
            }
        };

        Ok(Self { shared: descriptor.requests_shared(), timeout_secs })
    }
}

impl SyncExecutor for ShellExecutor {
    fn execute(
        &self,
        callable: &Value,
        call_args: &CallArgs,
        _ctx: &ExecutionContext,
    ) -> Result<ExecutorOutput, ExecutorError> {
        let command = callable
            .as_str()
            .ok_or_else(|| ExecutorError::Failed(format!("malformed callable, expected a command string: {callable}")))?;

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).arg("sh");
        for arg in &call_args.args {
            match arg {
                Value::String(s) => {
                    cmd.arg(s);
                }
                other => {
                    cmd.arg(other.to_string());
                }
            }
        }
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| ExecutorError::Failed(format!("failed to spawn shell command: {e}")))?;

        if let Some(timeout_secs) = self.timeout_secs {
            let deadline = Instant::now() + Duration::from_secs(timeout_secs);
            loop {
                match child.try_wait() {
                    Ok(Some(_)) => break,
                    Ok(None) => {
                        if Instant::now() >= deadline {
                            let _ = child.kill();
                            let _ = child.wait();
                            return Err(ExecutorError::Failed(format!(
                                "command exceeded {timeout_secs}s timeout"
                            )));
                        }
                        std::thread::sleep(Duration::from_millis(20));
                    }
                    Err(e) => return Err(ExecutorError::Failed(format!("failed to poll child: {e}"))),
                }
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|e| ExecutorError::Failed(format!("failed to collect shell output: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(ExecutorError::Failed(format!(
                "command exited with {}: {stderr}",
                output.status
            )));
        }

        Ok(ExecutorOutput { output: Value::String(stdout.trim_end().to_string()), stdout, stderr })
    }

    fn short_name(&self) -> &'static str {
        "shell"
    }

    fn shared(&self) -> bool {
        self.shared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ExecutorHandle;
    use std::sync::Arc;
    use uuid::Uuid;

    fn ctx() -> ExecutionContext {
        ExecutionContext { dispatch_id: Uuid::new_v4(), node_id: Some(0) }
    }

    #[test]
    fn captures_stdout() {
        let exec = ShellExecutor::from_descriptor(&ExecutorDescriptor::new("shell")).unwrap();
        let out = exec
            .execute(&Value::String("echo hello".into()), &CallArgs::default(), &ctx())
            .unwrap();
        assert_eq!(out.output, Value::String("hello".into()));
    }

    #[test]
    fn nonzero_exit_is_failed() {
        let exec = ShellExecutor::from_descriptor(&ExecutorDescriptor::new("shell")).unwrap();
        let err = exec
            .execute(&Value::String("exit 3".into()), &CallArgs::default(), &ctx())
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Failed(_)));
    }

    #[test]
    fn non_numeric_timeout_attribute_is_rejected_at_construction() {
        let mut descriptor = ExecutorDescriptor::new("shell");
        descriptor.attributes.insert("timeout_secs".to_string(), Value::String("soon".into()));
        let err = ShellExecutor::from_descriptor(&descriptor).unwrap_err();
        assert!(matches!(err, ExecutorError::InvalidAttributes(_)));
    }

    #[test]
    fn slow_command_is_killed_on_timeout() {
        let mut descriptor = ExecutorDescriptor::new("shell");
        descriptor.attributes.insert("timeout_secs".to_string(), Value::from(0u64));
        let exec = ShellExecutor::from_descriptor(&descriptor).unwrap();
        let err = exec
            .execute(&Value::String("sleep 5".into()), &CallArgs::default(), &ctx())
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Failed(msg) if msg.contains("timeout")));
    }

    #[tokio::test]
    async fn executor_handle_sync_dispatches_through_spawn_blocking() {
        let exec = ShellExecutor::from_descriptor(&ExecutorDescriptor::new("shell")).unwrap();
        let handle = ExecutorHandle::Sync(Arc::new(exec));

        let out = handle
            .execute(&Value::String("echo from-handle".into()), &CallArgs::default(), &ctx())
            .await
            .unwrap();
        assert_eq!(out.output, Value::String("from-handle".into()));

        handle.teardown().await;
    }
}
