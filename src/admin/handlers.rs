use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::http::response::ApiError;
use crate::http::server::AppState;

pub async fn get_status(State(state): State<AppState>) -> Response {
    Json(state.orchestrator.status()).into_response()
}

pub async fn get_services(State(state): State<AppState>) -> Result<Response, ApiError> {
    let services = state.orchestrator.service_statuses().await?;
    Ok(Json(services).into_response())
}

pub async fn get_service_history(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    match state.orchestrator.health_history(&name).await? {
        Some(history) => Ok(Json(history).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({"error": "not_found", "message": format!("unknown service '{name}'")})),
        )
            .into_response()),
    }
}

pub async fn get_usage(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Result<Response, ApiError> {
    let usage = state.orchestrator.usage(&tenant_id).await?;
    Ok(Json(usage).into_response())
}

pub async fn get_events(State(state): State<AppState>) -> Result<Response, ApiError> {
    let stats = state.orchestrator.event_stats().await?;
    Ok(Json(stats).into_response())
}
