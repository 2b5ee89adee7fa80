//! `api` crate — HTTP front-end over the dispatch engine.
//!
//! Exposes:
//!   POST   /api/v1/dispatches                          make_dispatch
//!   POST   /api/v1/dispatches/:id/run                   run_workflow
//!   POST   /api/v1/dispatches/:id/cancel                cancel_workflow
//!   GET    /api/v1/dispatches/:id                       get_result_object
//!   GET    /api/v1/dispatches/:id/nodes/:node_id/:key   get_electron_attribute

pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use engine::EngineHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
}

pub async fn serve(bind: &str, engine: EngineHandle) -> Result<(), std::io::Error> {
    let state = AppState { engine };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_router = Router::new()
        .route("/dispatches", post(handlers::workflows::make_dispatch))
        .route("/dispatches/:id", get(handlers::workflows::get_result))
        .route("/dispatches/:id/run", post(handlers::executions::run))
        .route("/dispatches/:id/cancel", post(handlers::executions::cancel))
        .route(
            "/dispatches/:id/nodes/:node_id/:key",
            get(handlers::workflows::get_electron_attribute),
        );

    let app = Router::new()
        .nest("/api/v1", api_router)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await
}
