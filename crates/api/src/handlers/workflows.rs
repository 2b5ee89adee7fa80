//! HTTP handlers for `make_dispatch`, `get_result_object`, and
//! `get_electron_attribute`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use engine::{EngineError, NodeId, ResultObject, WorkflowSubmission};
use serde_json::Value;
use uuid::Uuid;

use super::AppState;

pub async fn make_dispatch(
    State(state): State<AppState>,
    Json(submission): Json<WorkflowSubmission>,
) -> Result<(StatusCode, Json<Uuid>), StatusCode> {
    match state.engine.make_dispatch(submission).await {
        Ok(dispatch_id) => Ok((StatusCode::CREATED, Json(dispatch_id))),
        Err(EngineError::Input(_)) => Err(StatusCode::BAD_REQUEST),
        Err(err) => {
            tracing::warn!(%err, "make_dispatch failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub async fn get_result(
    Path(dispatch_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<ResultObject>, StatusCode> {
    match state.engine.get_result_object(dispatch_id).await {
        Ok(result) => Ok(Json(result)),
        Err(EngineError::UnknownDispatch(_)) => Err(StatusCode::NOT_FOUND),
        Err(err) => {
            tracing::warn!(%err, "get_result_object failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub async fn get_electron_attribute(
    Path((dispatch_id, node_id, key)): Path<(Uuid, NodeId, String)>,
    State(state): State<AppState>,
) -> Result<Json<Value>, StatusCode> {
    match state.engine.get_electron_attribute(dispatch_id, node_id, &key).await {
        Ok(value) => Ok(Json(value)),
        Err(EngineError::UnknownDispatch(_) | EngineError::UnknownNode { .. }) => Err(StatusCode::NOT_FOUND),
        Err(EngineError::Input(_)) => Err(StatusCode::BAD_REQUEST),
        Err(err) => {
            tracing::warn!(%err, "get_electron_attribute failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
