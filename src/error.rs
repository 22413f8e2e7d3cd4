//! Gateway error taxonomy.
//!
//! Every failure an orchestration can end in is one [`GatewayError`]
//! variant. The orchestrator converts it into the uniform response exactly
//! once; nothing below it formats responses.

use serde::{Deserialize, Serialize};

/// Errors produced while admitting, checking or dispatching a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid payload for '{service_type}': {reason}")]
    InvalidPayload { service_type: String, reason: String },

    #[error("tenant '{tenant_id}' exceeded its quota ({used}/{limit} calls this period)")]
    QuotaExceeded {
        tenant_id: String,
        used: u64,
        limit: u64,
    },

    #[error("quota store unavailable: {0}")]
    QuotaUnavailable(String),

    #[error("service '{service}' is unavailable")]
    ServiceUnavailable { service: String },

    #[error("circuit open for service '{service}'")]
    CircuitOpen { service: String },

    #[error("payload of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("service '{service}' timed out after {timeout_ms}ms")]
    Timeout { service: String, timeout_ms: u64 },

    #[error("connection to service '{service}' failed: {message}")]
    Connection { service: String, message: String },

    #[error("service '{service}' rejected the gateway credentials")]
    Auth { service: String },

    #[error("service '{service}' denied the request")]
    Permission { service: String },

    #[error("service '{service}' has no route at '{path}'")]
    RouteNotFound { service: String, path: String },

    #[error("service '{service}' returned status {status}: {message}")]
    Service {
        service: String,
        status: u16,
        message: String,
    },

    #[error("no admission slot became free within {0}ms")]
    Overloaded(u64),

    #[error("gateway is shutting down")]
    ShuttingDown,

    #[error("internal error: {0}")]
    Internal(String),
}

/// Stable machine-readable error codes carried by responses and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConfigurationError,
    InvalidPayload,
    QuotaExceeded,
    QuotaUnavailable,
    ServiceUnavailable,
    CircuitOpen,
    PayloadTooLarge,
    Timeout,
    ConnectionError,
    AuthError,
    PermissionError,
    RouteNotFound,
    ServiceError,
    Overloaded,
    ShuttingDown,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConfigurationError => "configuration_error",
            ErrorKind::InvalidPayload => "invalid_payload",
            ErrorKind::QuotaExceeded => "quota_exceeded",
            ErrorKind::QuotaUnavailable => "quota_unavailable",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::PayloadTooLarge => "payload_too_large",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ConnectionError => "connection_error",
            ErrorKind::AuthError => "auth_error",
            ErrorKind::PermissionError => "permission_error",
            ErrorKind::RouteNotFound => "route_not_found",
            ErrorKind::ServiceError => "service_error",
            ErrorKind::Overloaded => "overloaded",
            ErrorKind::ShuttingDown => "shutting_down",
            ErrorKind::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Configuration(_) => ErrorKind::ConfigurationError,
            GatewayError::InvalidPayload { .. } => ErrorKind::InvalidPayload,
            GatewayError::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            GatewayError::QuotaUnavailable(_) => ErrorKind::QuotaUnavailable,
            GatewayError::ServiceUnavailable { .. } => ErrorKind::ServiceUnavailable,
            GatewayError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            GatewayError::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            GatewayError::Timeout { .. } => ErrorKind::Timeout,
            GatewayError::Connection { .. } => ErrorKind::ConnectionError,
            GatewayError::Auth { .. } => ErrorKind::AuthError,
            GatewayError::Permission { .. } => ErrorKind::PermissionError,
            GatewayError::RouteNotFound { .. } => ErrorKind::RouteNotFound,
            GatewayError::Service { .. } => ErrorKind::ServiceError,
            GatewayError::Overloaded(_) => ErrorKind::Overloaded,
            GatewayError::ShuttingDown => ErrorKind::ShuttingDown,
            GatewayError::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// Stable snake_case code, e.g. `"quota_exceeded"`.
    pub fn error_code(&self) -> &'static str {
        self.kind().as_str()
    }

    /// The call was attempted against the backend, so the outcome feeds the
    /// service's circuit breaker.
    pub fn counts_as_circuit_failure(&self) -> bool {
        matches!(
            self,
            GatewayError::Timeout { .. }
                | GatewayError::Connection { .. }
                | GatewayError::Auth { .. }
                | GatewayError::Permission { .. }
                | GatewayError::RouteNotFound { .. }
                | GatewayError::Service { .. }
        )
    }

    /// The request reached the backend and consumed its capacity, so the
    /// tenant is charged for it even though it failed.
    pub fn consumed_backend_capacity(&self) -> bool {
        matches!(
            self,
            GatewayError::Timeout { .. }
                | GatewayError::Auth { .. }
                | GatewayError::Permission { .. }
                | GatewayError::RouteNotFound { .. }
                | GatewayError::Service { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pre_dispatch_errors_do_not_touch_backend_accounting() {
        let errors = [
            GatewayError::Configuration("missing".into()),
            GatewayError::QuotaExceeded {
                tenant_id: "t1".into(),
                used: 10,
                limit: 10,
            },
            GatewayError::ServiceUnavailable { service: "a".into() },
            GatewayError::CircuitOpen { service: "a".into() },
            GatewayError::PayloadTooLarge { size: 11, max: 10 },
        ];
        for err in errors {
            assert!(!err.counts_as_circuit_failure(), "{err}");
            assert!(!err.consumed_backend_capacity(), "{err}");
        }
    }

    #[test]
    fn test_connection_failure_trips_breaker_without_charging() {
        let err = GatewayError::Connection {
            service: "a".into(),
            message: "refused".into(),
        };
        assert!(err.counts_as_circuit_failure());
        assert!(!err.consumed_backend_capacity());

        let err = GatewayError::Timeout {
            service: "a".into(),
            timeout_ms: 100,
        };
        assert!(err.counts_as_circuit_failure());
        assert!(err.consumed_backend_capacity());
    }

    #[test]
    fn test_kind_serializes_as_code() {
        let kind = GatewayError::QuotaExceeded {
            tenant_id: "t1".into(),
            used: 1,
            limit: 1,
        }
        .kind();
        assert_eq!(serde_json::to_string(&kind).unwrap(), "\"quota_exceeded\"");
        assert_eq!(kind.to_string(), "quota_exceeded");
    }
}
