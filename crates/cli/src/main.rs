//! `dispatcher` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`    — start the API server backed by the dispatch engine.
//! - `dispatch` — submit and run a workflow graph file end to end, locally.
//! - `validate` — validate a workflow graph JSON file without running it.
//! - `migrate`  — run pending database migrations.
//! - `status`   — fetch a dispatch's result object from a running server.
//! - `cancel`   — cancel a running dispatch on a running server.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use engine::{EngineHandle, WebhookClient, WorkflowSubmission};
use executors::ExecutorRegistry;
use tracing::info;

#[derive(Parser)]
#[command(name = "dispatcher", about = "DAG-based workflow dispatch engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log filter passed to `tracing_subscriber::EnvFilter` (e.g. "info", "debug,engine=trace").
    #[arg(long, env = "LOG_FILTER", default_value = "info", global = true)]
    log_filter: String,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server.
    Serve {
        #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
        bind: String,
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
        /// Best-effort status-change webhook target.
        #[arg(long, env = "WEBHOOK_URL")]
        webhook_url: Option<String>,
    },
    /// Submit and run a workflow graph file end to end, printing its result.
    Dispatch {
        /// Path to a serialized `WorkflowSubmission` JSON file.
        path: std::path::PathBuf,
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
    },
    /// Validate a workflow graph JSON file without running it.
    Validate {
        path: std::path::PathBuf,
    },
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Fetch a dispatch's result object from a running server.
    Status {
        dispatch_id: uuid::Uuid,
        #[arg(long, env = "DISPATCHER_URL", default_value = "http://localhost:8080")]
        server_url: String,
    },
    /// Cancel a running dispatch on a running server.
    Cancel {
        dispatch_id: uuid::Uuid,
        #[arg(long, env = "DISPATCHER_URL", default_value = "http://localhost:8080")]
        server_url: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(cli.log_filter.clone()))
        .init();

    match cli.command {
        Command::Serve { bind, database_url, webhook_url } => {
            info!("starting API server on {bind}");
            let pool = db::pool::create_pool(&database_url, 10).await.expect("failed to connect to database");
            db::pool::run_migrations(&pool).await.expect("migration failed");
            let store = Arc::new(db::PostgresStore::new(pool));
            let webhook = webhook_url.map(WebhookClient::new);
            let engine = EngineHandle::new(store, ExecutorRegistry::with_builtins(), webhook);
            api::serve(&bind, engine).await.expect("server exited with an error");
        }
        Command::Dispatch { path, database_url } => {
            let content = std::fs::read_to_string(&path)
                .unwrap_or_else(|e| panic!("cannot read file {}: {e}", path.display()));
            let submission: WorkflowSubmission =
                serde_json::from_str(&content).unwrap_or_else(|e| panic!("invalid JSON: {e}"));

            let engine = match database_url {
                Some(database_url) => {
                    let pool = db::pool::create_pool(&database_url, 5).await.expect("failed to connect to database");
                    db::pool::run_migrations(&pool).await.expect("migration failed");
                    EngineHandle::new(Arc::new(db::PostgresStore::new(pool)), ExecutorRegistry::with_builtins(), None)
                }
                None => EngineHandle::with_memstore(),
            };

            let dispatch_id = engine.make_dispatch(submission).await.unwrap_or_else(|e| {
                eprintln!("dispatch rejected: {e}");
                std::process::exit(1);
            });
            info!(%dispatch_id, "dispatch registered, running");

            let outcome = engine.run_workflow(dispatch_id).await.unwrap_or_else(|e| {
                eprintln!("run_workflow failed: {e}");
                std::process::exit(1);
            });

            println!("{}", serde_json::to_string_pretty(&serde_json::json!({
                "dispatch_id": dispatch_id,
                "status": outcome.status.to_string(),
                "result": outcome.result,
                "error": outcome.error,
            })).unwrap());
        }
        Command::Validate { path } => {
            let content = std::fs::read_to_string(&path)
                .unwrap_or_else(|e| panic!("cannot read file {}: {e}", path.display()));
            let submission: WorkflowSubmission =
                serde_json::from_str(&content).unwrap_or_else(|e| panic!("invalid JSON: {e}"));

            match engine::dag::validate_submission(&submission.graph) {
                Ok(order) => println!("workflow is valid, execution order: {order:?}"),
                Err(e) => {
                    eprintln!("validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::Migrate { database_url } => {
            info!("running migrations against {database_url}");
            let pool = db::pool::create_pool(&database_url, 2).await.expect("failed to connect to database");
            db::pool::run_migrations(&pool).await.expect("migration failed");
            info!("migrations applied successfully");
        }
        Command::Status { dispatch_id, server_url } => {
            let url = format!("{server_url}/api/v1/dispatches/{dispatch_id}");
            let response = reqwest::get(&url).await.unwrap_or_else(|e| panic!("request failed: {e}"));
            let body = response.text().await.unwrap_or_default();
            println!("{body}");
        }
        Command::Cancel { dispatch_id, server_url } => {
            let url = format!("{server_url}/api/v1/dispatches/{dispatch_id}/cancel");
            let client = reqwest::Client::new();
            let response = client.post(&url).send().await.unwrap_or_else(|e| panic!("request failed: {e}"));
            println!("cancel request returned {}", response.status());
        }
    }
}
