//! `local` executor — runs callables in-process.
//!
//! A fully general callable would ship arbitrary serialized code. This
//! workspace has no language runtime to host that, so node callables here
//! are a small interpreted expression tree (`TaskExpr`), serialized the
//! same opaque way a real callable would be. The Task Runner never looks
//! inside it — only the executor does.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ExecutorError;
use crate::traits::{AsyncExecutor, CallArgs, ExecutionContext, ExecutorOutput};

/// The interpreted callable body `local` understands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TaskExpr {
    /// Return the single positional argument unchanged.
    Identity,
    /// Return `args[0] + addend`.
    AddConst { addend: f64 },
    /// Return `args[0] * factor`.
    MulConst { factor: f64 },
    /// Sum every element of the single positional argument, which must be
    /// a JSON array (used by list-collector nodes).
    SumList,
    /// Sum the named kwargs (used by dict-collector nodes and fan-in nodes
    /// like the diamond scenario's `D = b + c`).
    SumKwargs { keys: Vec<String> },
    /// Return the literal value verbatim — used for a sublattice's graph-
    /// build step, where "building" a pre-serialized sub-graph is just
    /// handing it back.
    Literal { value: Value },
    /// Return the last entry of `node_outputs` passed to post-processing,
    /// the common case where the workflow function's last statement is a
    /// `return` of its final electron call.
    LastOutput,
    /// Return `node_outputs[index]`.
    OutputAt { index: usize },
    /// Sum `node_outputs` at the given indices.
    SumOutputsAt { indices: Vec<usize> },
    /// Always fail with the given message (used by seed scenario 3).
    Fail { message: String },
}

fn as_f64(value: &Value, what: &str) -> Result<f64, ExecutorError> {
    value
        .as_f64()
        .ok_or_else(|| ExecutorError::Failed(format!("{what} is not a number: {value}")))
}

impl TaskExpr {
    fn eval(&self, call_args: &CallArgs) -> Result<Value, ExecutorError> {
        match self {
            TaskExpr::Identity => call_args
                .args
                .first()
                .cloned()
                .ok_or_else(|| ExecutorError::Failed("identity: missing argument".into())),

            TaskExpr::AddConst { addend } => {
                let arg = call_args
                    .args
                    .first()
                    .ok_or_else(|| ExecutorError::Failed("add_const: missing argument".into()))?;
                Ok(Value::from(as_f64(arg, "add_const argument")? + addend))
            }

            TaskExpr::MulConst { factor } => {
                let arg = call_args
                    .args
                    .first()
                    .ok_or_else(|| ExecutorError::Failed("mul_const: missing argument".into()))?;
                Ok(Value::from(as_f64(arg, "mul_const argument")? * factor))
            }

            TaskExpr::SumList => {
                let arg = call_args
                    .args
                    .first()
                    .ok_or_else(|| ExecutorError::Failed("sum_list: missing argument".into()))?;
                let items = arg
                    .as_array()
                    .ok_or_else(|| ExecutorError::Failed("sum_list: argument is not a list".into()))?;
                let mut total = 0.0;
                for item in items {
                    total += as_f64(item, "sum_list element")?;
                }
                Ok(Value::from(total))
            }

            TaskExpr::SumKwargs { keys } => {
                let mut total = 0.0;
                for key in keys {
                    let value = call_args
                        .kwargs
                        .get(key)
                        .ok_or_else(|| ExecutorError::Failed(format!("sum_kwargs: missing key '{key}'")))?;
                    total += as_f64(value, &format!("sum_kwargs[{key}]"))?;
                }
                Ok(Value::from(total))
            }

            TaskExpr::Literal { value } => Ok(value.clone()),

            TaskExpr::LastOutput => {
                let outputs = node_outputs(call_args)?;
                outputs
                    .last()
                    .cloned()
                    .ok_or_else(|| ExecutorError::Failed("last_output: no node outputs".into()))
            }

            TaskExpr::OutputAt { index } => {
                let outputs = node_outputs(call_args)?;
                outputs
                    .get(*index)
                    .cloned()
                    .ok_or_else(|| ExecutorError::Failed(format!("output_at: index {index} out of range")))
            }

            TaskExpr::SumOutputsAt { indices } => {
                let outputs = node_outputs(call_args)?;
                let mut total = 0.0;
                for index in indices {
                    let value = outputs
                        .get(*index)
                        .ok_or_else(|| ExecutorError::Failed(format!("sum_outputs_at: index {index} out of range")))?;
                    total += as_f64(value, &format!("sum_outputs_at[{index}]"))?;
                }
                Ok(Value::from(total))
            }

            TaskExpr::Fail { message } => Err(ExecutorError::Failed(message.clone())),
        }
    }
}

/// Post-processing calls the workflow function with a single positional
/// argument: the ordered list of substituted node outputs.
/// `LastOutput`/`OutputAt`/`SumOutputsAt` read from it.
fn node_outputs(call_args: &CallArgs) -> Result<&Vec<Value>, ExecutorError> {
    call_args
        .args
        .first()
        .and_then(Value::as_array)
        .ok_or_else(|| ExecutorError::Failed("expected node_outputs array as first argument".into()))
}

/// The default in-tree executor: evaluates a [`TaskExpr`] against the
/// assembled call arguments. Stands in for a real sandboxed task runtime.
#[derive(Debug, Default)]
pub struct LocalExecutor;

impl LocalExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AsyncExecutor for LocalExecutor {
    async fn execute(
        &self,
        callable: &Value,
        call_args: &CallArgs,
        _ctx: &ExecutionContext,
    ) -> Result<ExecutorOutput, ExecutorError> {
        let expr: TaskExpr = serde_json::from_value(callable.clone())
            .map_err(|e| ExecutorError::Failed(format!("malformed callable: {e}")))?;

        let output = expr.eval(call_args)?;

        Ok(ExecutorOutput {
            output,
            stdout: String::new(),
            stderr: String::new(),
        })
    }

    fn short_name(&self) -> &'static str {
        "local"
    }

    fn shared(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn ctx() -> ExecutionContext {
        ExecutionContext { dispatch_id: Uuid::new_v4(), node_id: Some(0) }
    }

    #[tokio::test]
    async fn add_const_adds_to_first_arg() {
        let exec = LocalExecutor::new();
        let callable = serde_json::to_value(TaskExpr::AddConst { addend: 1.0 }).unwrap();
        let call_args = CallArgs { args: vec![json!(3.0)], kwargs: Default::default() };
        let out = exec.execute(&callable, &call_args, &ctx()).await.unwrap();
        assert_eq!(out.output, json!(4.0));
    }

    #[tokio::test]
    async fn sum_kwargs_sums_named_entries() {
        let exec = LocalExecutor::new();
        let callable = serde_json::to_value(TaskExpr::SumKwargs { keys: vec!["b".into(), "c".into()] }).unwrap();
        let mut kwargs = std::collections::HashMap::new();
        kwargs.insert("b".to_string(), json!(4.0));
        kwargs.insert("c".to_string(), json!(6.0));
        let call_args = CallArgs { args: vec![], kwargs };
        let out = exec.execute(&callable, &call_args, &ctx()).await.unwrap();
        assert_eq!(out.output, json!(10.0));
    }

    #[tokio::test]
    async fn fail_propagates_as_executor_error() {
        let exec = LocalExecutor::new();
        let callable = serde_json::to_value(TaskExpr::Fail { message: "boom".into() }).unwrap();
        let call_args = CallArgs::default();
        let err = exec.execute(&callable, &call_args, &ctx()).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Failed(msg) if msg == "boom"));
    }
}
