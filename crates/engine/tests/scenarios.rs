//! End-to-end scenarios driving a full `EngineHandle` through
//! `make_dispatch` / `run_workflow` with the in-tree executors.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use engine::models::{
    NodeCategory, ParamKind, SubmittedEdge, SubmittedGraph, SubmittedNode, WorkflowSubmission,
};
use engine::{EngineHandle, WorkflowStatus};
use executors::{
    AsyncExecutor, CallArgs, ExecutionContext, ExecutorDescriptor, ExecutorError, ExecutorHandle,
    ExecutorOutput, ExecutorRegistry, TaskExpr,
};
use serde_json::json;

fn local() -> ExecutorDescriptor {
    ExecutorDescriptor::new("local")
}

fn param(id: i64, value: serde_json::Value) -> SubmittedNode {
    SubmittedNode {
        id,
        name: format!("param-{id}"),
        category: NodeCategory::Parameter,
        callable: None,
        value: Some(value),
        executor: None,
        deps: Default::default(),
    }
}

fn task(id: i64, name: &str, expr: TaskExpr, executor: ExecutorDescriptor) -> SubmittedNode {
    SubmittedNode {
        id,
        name: name.to_string(),
        category: NodeCategory::Task,
        callable: Some(serde_json::to_value(expr).unwrap()),
        value: None,
        executor: Some(executor),
        deps: Default::default(),
    }
}

fn arg_edge(parent: i64, child: i64, arg_index: i64) -> SubmittedEdge {
    SubmittedEdge {
        parent,
        child,
        edge_name: format!("arg{arg_index}"),
        param_kind: ParamKind::Arg { arg_index },
    }
}

fn kwarg_edge(parent: i64, child: i64, name: &str) -> SubmittedEdge {
    SubmittedEdge { parent, child, edge_name: name.to_string(), param_kind: ParamKind::Kwarg }
}

#[tokio::test]
async fn linear_chain_runs_end_to_end() {
    // param(5) -> add_const(+3) -> mul_const(*2), workflow function returns
    // the last electron's output: (5 + 3) * 2 = 16.
    let submission = WorkflowSubmission {
        name: "linear".into(),
        graph: SubmittedGraph {
            nodes: vec![
                param(0, json!(5.0)),
                task(1, "add3", TaskExpr::AddConst { addend: 3.0 }, local()),
                task(2, "mul2", TaskExpr::MulConst { factor: 2.0 }, local()),
            ],
            edges: vec![arg_edge(0, 1, 0), arg_edge(1, 2, 0)],
        },
        workflow_function: serde_json::to_value(TaskExpr::LastOutput).unwrap(),
        args: json!(null),
        kwargs: json!(null),
        workflow_executor: local(),
    };

    let engine = EngineHandle::with_memstore();
    let dispatch_id = engine.make_dispatch(submission).await.unwrap();
    let outcome = engine.run_workflow(dispatch_id).await.unwrap();

    assert_eq!(outcome.status, WorkflowStatus::Completed);
    assert_eq!(outcome.result, Some(json!(16.0)));
}

#[tokio::test]
async fn diamond_fan_in_combines_via_kwargs() {
    // A(2) -> B = A*3, A -> C = A+5, D = sum_kwargs(b, c). 2*3=6, 2+5=7, 6+7=13.
    let submission = WorkflowSubmission {
        name: "diamond".into(),
        graph: SubmittedGraph {
            nodes: vec![
                param(0, json!(2.0)),
                task(1, "b", TaskExpr::MulConst { factor: 3.0 }, local()),
                task(2, "c", TaskExpr::AddConst { addend: 5.0 }, local()),
                task(
                    3,
                    "d",
                    TaskExpr::SumKwargs { keys: vec!["b".into(), "c".into()] },
                    local(),
                ),
            ],
            edges: vec![
                arg_edge(0, 1, 0),
                arg_edge(0, 2, 0),
                kwarg_edge(1, 3, "b"),
                kwarg_edge(2, 3, "c"),
            ],
        },
        workflow_function: serde_json::to_value(TaskExpr::LastOutput).unwrap(),
        args: json!(null),
        kwargs: json!(null),
        workflow_executor: local(),
    };

    let engine = EngineHandle::with_memstore();
    let dispatch_id = engine.make_dispatch(submission).await.unwrap();
    let outcome = engine.run_workflow(dispatch_id).await.unwrap();

    assert_eq!(outcome.status, WorkflowStatus::Completed);
    assert_eq!(outcome.result, Some(json!(13.0)));
}

#[tokio::test]
async fn failing_middle_node_fails_the_whole_workflow() {
    let submission = WorkflowSubmission {
        name: "failing".into(),
        graph: SubmittedGraph {
            nodes: vec![
                param(0, json!(1.0)),
                task(1, "boom", TaskExpr::Fail { message: "kaboom".into() }, local()),
                task(2, "unreachable", TaskExpr::Identity, local()),
            ],
            edges: vec![arg_edge(0, 1, 0), arg_edge(1, 2, 0)],
        },
        workflow_function: serde_json::to_value(TaskExpr::LastOutput).unwrap(),
        args: json!(null),
        kwargs: json!(null),
        workflow_executor: local(),
    };

    let engine = EngineHandle::with_memstore();
    let dispatch_id = engine.make_dispatch(submission).await.unwrap();
    let outcome = engine.run_workflow(dispatch_id).await.unwrap();

    assert_eq!(outcome.status, WorkflowStatus::Failed);
    assert!(outcome.error.unwrap().contains("kaboom"));

    // The node downstream of the failure never ran.
    let unreachable_status =
        engine.get_electron_attribute(dispatch_id, 2, "status").await.unwrap();
    assert_eq!(unreachable_status, json!("NEW_OBJECT"));
}

/// A trivial async executor double, distinct from `executors::mock`, used
/// only to assert the cache's shared-instance accounting across task
/// nodes *and* the post-processing call that shares the same instance id.
struct CountingExecutor {
    executions: Arc<AtomicUsize>,
    teardowns: Arc<AtomicUsize>,
}

#[async_trait]
impl AsyncExecutor for CountingExecutor {
    async fn execute(
        &self,
        _callable: &serde_json::Value,
        _call_args: &CallArgs,
        _ctx: &ExecutionContext,
    ) -> Result<ExecutorOutput, ExecutorError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        Ok(ExecutorOutput { output: json!("ok"), stdout: String::new(), stderr: String::new() })
    }

    async fn teardown(&self) {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
    }

    fn short_name(&self) -> &'static str {
        "counting"
    }

    fn shared(&self) -> bool {
        true
    }
}

#[tokio::test]
async fn shared_executor_is_constructed_once_and_torn_down_once() {
    let executions = Arc::new(AtomicUsize::new(0));
    let teardowns = Arc::new(AtomicUsize::new(0));

    let mut registry = ExecutorRegistry::new();
    {
        let executions = executions.clone();
        let teardowns = teardowns.clone();
        registry.register("counting", move |_descriptor| {
            Ok(ExecutorHandle::Async(Arc::new(CountingExecutor {
                executions: executions.clone(),
                teardowns: teardowns.clone(),
            })))
        });
    }

    let shared = ExecutorDescriptor::new("counting").with_instance_id("shared-1").with_shared(true);

    let submission = WorkflowSubmission {
        name: "shared".into(),
        graph: SubmittedGraph {
            nodes: vec![
                param(0, json!(1.0)),
                task(1, "t1", TaskExpr::Identity, shared.clone()),
                task(2, "t2", TaskExpr::Identity, shared.clone()),
                task(3, "t3", TaskExpr::Identity, shared.clone()),
            ],
            edges: vec![arg_edge(0, 1, 0), arg_edge(0, 2, 0), arg_edge(0, 3, 0)],
        },
        workflow_function: json!(null),
        args: json!(null),
        kwargs: json!(null),
        workflow_executor: shared,
    };

    let engine = EngineHandle::new(Arc::new(db::MemStore::new()), registry, None);
    let dispatch_id = engine.make_dispatch(submission).await.unwrap();
    let outcome = engine.run_workflow(dispatch_id).await.unwrap();

    assert_eq!(outcome.status, WorkflowStatus::Completed);
    // 3 task nodes + 1 post-processing call against the same instance id.
    assert_eq!(executions.load(Ordering::SeqCst), 4);
    assert_eq!(teardowns.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn sublattice_node_recurses_into_a_child_dispatch() {
    // The child graph is itself a two-node linear chain: param(10) -> +5.
    let child = WorkflowSubmission {
        name: "child".into(),
        graph: SubmittedGraph {
            nodes: vec![
                param(0, json!(10.0)),
                task(1, "plus5", TaskExpr::AddConst { addend: 5.0 }, local()),
            ],
            edges: vec![arg_edge(0, 1, 0)],
        },
        workflow_function: serde_json::to_value(TaskExpr::LastOutput).unwrap(),
        args: json!(null),
        kwargs: json!(null),
        workflow_executor: local(),
    };
    let child_value = serde_json::to_value(&child).unwrap();

    let build_sublattice = SubmittedNode {
        id: 0,
        name: "sublattice:build".into(),
        category: NodeCategory::Sublattice,
        callable: Some(serde_json::to_value(TaskExpr::Literal { value: child_value }).unwrap()),
        value: None,
        executor: Some(local()),
        deps: Default::default(),
    };

    let submission = WorkflowSubmission {
        name: "parent".into(),
        graph: SubmittedGraph { nodes: vec![build_sublattice], edges: vec![] },
        workflow_function: serde_json::to_value(TaskExpr::LastOutput).unwrap(),
        args: json!(null),
        kwargs: json!(null),
        workflow_executor: local(),
    };

    let engine = EngineHandle::with_memstore();
    let dispatch_id = engine.make_dispatch(submission).await.unwrap();
    let outcome = engine.run_workflow(dispatch_id).await.unwrap();

    assert_eq!(outcome.status, WorkflowStatus::Completed);
    assert_eq!(outcome.result, Some(json!(15.0)));
}

/// An executor that sleeps long enough for a `cancel_workflow` call to
/// land while it's mid-flight.
struct SlowExecutor;

#[async_trait]
impl AsyncExecutor for SlowExecutor {
    async fn execute(
        &self,
        _callable: &serde_json::Value,
        _call_args: &CallArgs,
        _ctx: &ExecutionContext,
    ) -> Result<ExecutorOutput, ExecutorError> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(ExecutorOutput { output: json!("done"), stdout: String::new(), stderr: String::new() })
    }

    fn short_name(&self) -> &'static str {
        "slow"
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn cancellation_mid_flight_stops_the_workflow() {
    let mut registry = ExecutorRegistry::new();
    registry.register("slow", |_descriptor| Ok(ExecutorHandle::Async(Arc::new(SlowExecutor))));

    let slow = ExecutorDescriptor::new("slow");
    let submission = WorkflowSubmission {
        name: "cancel-me".into(),
        graph: SubmittedGraph {
            nodes: vec![param(0, json!(1.0)), task(1, "slow-task", TaskExpr::Identity, slow.clone())],
            edges: vec![arg_edge(0, 1, 0)],
        },
        workflow_function: json!(null),
        args: json!(null),
        kwargs: json!(null),
        workflow_executor: slow,
    };

    let engine = EngineHandle::new(Arc::new(db::MemStore::new()), registry, None);
    let dispatch_id = engine.make_dispatch(submission).await.unwrap();

    let run_engine = engine.clone();
    let handle = tokio::spawn(async move { run_engine.run_workflow(dispatch_id).await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    engine.cancel_workflow(dispatch_id).await.unwrap();

    let outcome = handle.await.unwrap().unwrap();
    assert_eq!(outcome.status, WorkflowStatus::Cancelled);
}
