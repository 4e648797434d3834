use crate::coordinator::{LifecycleSnapshot, StatusCheck};
use crate::error::CoordinatorError;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::server::ApiState;

pub async fn health_handler() -> &'static str {
    "OK"
}

pub async fn snapshot_handler(State(state): State<ApiState>) -> Json<LifecycleSnapshot> {
    Json(state.lifecycle.snapshot())
}

pub async fn check_handler(State(state): State<ApiState>) -> Json<StatusCheck> {
    let check = state.lifecycle.check_status().await;
    debug!("Manual status check: {} (success: {})", check.status, check.success);
    Json(check)
}

/// 202 while the coordinator boots, 200 when it was already running
pub async fn wake_handler(State(state): State<ApiState>) -> impl IntoResponse {
    match state.lifecycle.wake().await {
        Ok(result) => {
            let code = if result.already_running {
                StatusCode::OK
            } else {
                StatusCode::ACCEPTED
            };
            info!(
                "Wake accepted via API (already running: {}, estimate: {}s)",
                result.already_running, result.estimated_ready_seconds
            );
            (code, Json(json!({ "success": true, "result": result })))
        }
        Err(e) => {
            let code = if e == CoordinatorError::AlreadyWaking {
                StatusCode::CONFLICT
            } else {
                warn!("Wake via API failed: {}", e);
                StatusCode::BAD_GATEWAY
            };
            (
                code,
                Json(json!({
                    "success": false,
                    "error": e.to_string(),
                    "retryable": e.is_retryable(),
                })),
            )
        }
    }
}

pub async fn stop_handler(State(state): State<ApiState>) -> StatusCode {
    state.lifecycle.stop_polling();
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
pub struct RouteQuery {
    path: String,
    required: Option<bool>,
}

pub async fn route_handler(
    State(state): State<ApiState>,
    Query(query): Query<RouteQuery>,
) -> impl IntoResponse {
    let snapshot = state.lifecycle.snapshot();
    let render = state
        .gate
        .decide(&query.path, &snapshot, query.required.unwrap_or(true));

    Json(json!({
        "path": query.path,
        "class": state.gate.classify(&query.path),
        "render": render,
        "error": snapshot.error,
    }))
}
