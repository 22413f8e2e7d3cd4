//! Response mapping for the HTTP surface.
//!
//! # Responsibilities
//! - Map gateway error codes to HTTP status codes
//! - Serialize orchestration responses with that status
//! - Render errors from non-orchestration routes in the same vocabulary
//!
//! # Design Decisions
//! - Failures the caller can fix are 4xx; backend failures are 502/504
//! - Temporary gateway-side refusals are 503
//! - The JSON body is identical whatever the status

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::{ErrorKind, GatewayError};
use crate::orchestrator::OrchestrationResponse;

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ConfigurationError | ErrorKind::InvalidPayload => StatusCode::BAD_REQUEST,
        ErrorKind::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        ErrorKind::QuotaUnavailable
        | ErrorKind::ServiceUnavailable
        | ErrorKind::CircuitOpen
        | ErrorKind::Overloaded
        | ErrorKind::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::ConnectionError
        | ErrorKind::AuthError
        | ErrorKind::PermissionError
        | ErrorKind::RouteNotFound
        | ErrorKind::ServiceError => StatusCode::BAD_GATEWAY,
        ErrorKind::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for OrchestrationResponse {
    fn into_response(self) -> Response {
        let status = match self.error {
            Some(kind) => status_for(kind),
            None => StatusCode::OK,
        };
        (status, Json(self)).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorKind,
    message: String,
}

/// A [`GatewayError`] returned from a plain JSON route.
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(error: GatewayError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let body = ErrorBody {
            error: kind,
            message: self.0.to_string(),
        };
        (status_for(kind), Json(body)).into_response()
    }
}
