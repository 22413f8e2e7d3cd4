//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the orchestration, health and admin routes
//! - Wire up middleware (tracing, timeout, body limit, request ID, response headers)
//! - Turn inbound JSON into an `OrchestrationRequest`
//! - Serve until the shutdown future resolves

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use axum::http::header::{HeaderValue, CACHE_CONTROL, X_CONTENT_TYPE_OPTIONS};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::admin::setup_admin_router;
use crate::error::GatewayError;
use crate::http::request::{
    header_str, propagate_request_id_layer, set_request_id_layer, X_REQUEST_ID, X_SESSION_ID, X_TENANT_ID,
};
use crate::http::response::ApiError;
use crate::orchestrator::{OrchestrationRequest, OrchestrationResponse, Orchestrator};
use crate::routing::ServiceType;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

/// Inbound body of `POST /api/v1/orchestrate`.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestrateBody {
    pub service_type: ServiceType,
    pub payload: Value,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    orchestrator: Arc<Orchestrator>,
}

impl HttpServer {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        let router = Self::build_router(orchestrator.clone());
        Self { router, orchestrator }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(orchestrator: Arc<Orchestrator>) -> Router {
        let config = orchestrator.config();
        let state = AppState { orchestrator };

        let mut router = Router::new()
            .route("/api/v1/orchestrate", post(orchestrate_handler))
            .route("/api/v1/services/health", get(services_health_handler))
            .route("/healthz", get(healthz_handler))
            .with_state(state.clone());

        if config.admin.enabled {
            router = router.merge(setup_admin_router(state));
        }

        router
            .layer(DefaultBodyLimit::disable())
            .layer(RequestBodyLimitLayer::new(config.listener.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(config.listener.request_timeout_secs)))
            .layer(propagate_request_id_layer())
            .layer(SetResponseHeaderLayer::if_not_present(
                X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ))
            .layer(SetResponseHeaderLayer::if_not_present(
                CACHE_CONTROL,
                HeaderValue::from_static("no-store"),
            ))
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` resolves, then drain connections.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        if let Err(e) = self.orchestrator.initialize().await {
            tracing::error!(error = %e, "Orchestrator failed to initialize");
            return Err(std::io::Error::other(e.to_string()));
        }

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn orchestrate_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<OrchestrateBody>, JsonRejection>,
) -> Response {
    let header_request_id = header_str(&headers, X_REQUEST_ID).map(str::to_string);

    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            let request_id = header_request_id.unwrap_or_else(|| Uuid::new_v4().to_string());
            let error = GatewayError::InvalidPayload {
                service_type: "unknown".to_string(),
                reason: rejection.body_text(),
            };
            return OrchestrationResponse::failure(request_id, None, &error, Duration::ZERO).into_response();
        }
    };

    let request_id = body
        .request_id
        .or(header_request_id)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let Some(tenant_id) = body
        .tenant_id
        .or_else(|| header_str(&headers, X_TENANT_ID).map(str::to_string))
    else {
        let error = GatewayError::InvalidPayload {
            service_type: body.service_type.to_string(),
            reason: "missing tenant_id (body field or x-tenant-id header)".to_string(),
        };
        return OrchestrationResponse::failure(request_id, None, &error, Duration::ZERO).into_response();
    };

    let session_id = body
        .session_id
        .or_else(|| header_str(&headers, X_SESSION_ID).map(str::to_string))
        .unwrap_or_default();

    let mut request = OrchestrationRequest::new(body.service_type, body.payload, tenant_id, session_id)
        .with_request_id(request_id);
    if let Some(ms) = body.timeout_ms {
        request = request.with_timeout(Duration::from_millis(ms));
    }

    state.orchestrator.orchestrate(request).await.into_response()
}

async fn services_health_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    let statuses = state.orchestrator.health_statuses().await?;
    Ok(Json(statuses).into_response())
}

async fn healthz_handler(State(state): State<AppState>) -> Response {
    if state.orchestrator.is_shutting_down() {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"status": "shutting_down"}))).into_response()
    } else {
        Json(json!({"status": "ok"})).into_response()
    }
}
