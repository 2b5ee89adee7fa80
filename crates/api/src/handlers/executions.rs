//! HTTP handlers for `run_workflow` and `cancel_workflow`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use engine::EngineError;
use serde_json::{json, Value};
use uuid::Uuid;

use super::AppState;

/// Kicks off `run_workflow` in the background and returns immediately;
/// the client polls `GET /dispatches/:id` for the terminal status.
pub async fn run(
    Path(dispatch_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    if !state.engine.results().is_live(dispatch_id).await {
        return Err(StatusCode::NOT_FOUND);
    }

    let engine = state.engine.clone();
    tokio::spawn(async move {
        if let Err(err) = engine.run_workflow(dispatch_id).await {
            tracing::error!(%dispatch_id, %err, "run_workflow failed");
        }
    });

    Ok((StatusCode::ACCEPTED, Json(json!({ "dispatch_id": dispatch_id }))))
}

pub async fn cancel(
    Path(dispatch_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, StatusCode> {
    match state.engine.cancel_workflow(dispatch_id).await {
        Ok(()) => Ok(StatusCode::ACCEPTED),
        Err(EngineError::UnknownDispatch(_)) => Err(StatusCode::NOT_FOUND),
        Err(err) => {
            tracing::warn!(%err, "cancel_workflow failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
