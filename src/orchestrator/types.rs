//! Orchestration request and response envelopes.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ErrorKind, GatewayError};
use crate::health::ServiceHealth;
use crate::resilience::CircuitBreakerState;
use crate::routing::ServiceType;

/// A normalized call to one guard service type on behalf of a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationRequest {
    pub request_id: String,
    pub tenant_id: String,
    pub session_id: String,
    pub service_type: ServiceType,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_override_ms: Option<u64>,
}

impl OrchestrationRequest {
    /// Create a request with a fresh UUID v4 request id.
    pub fn new(
        service_type: impl Into<ServiceType>,
        payload: Value,
        tenant_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            session_id: session_id.into(),
            service_type: service_type.into(),
            payload,
            timeout_override_ms: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_override_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn timeout_override(&self) -> Option<Duration> {
        self.timeout_override_ms.map(Duration::from_millis)
    }
}

/// The single return contract of every orchestration, success or failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationResponse {
    pub request_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    /// Human-readable detail for `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub service_used: Option<String>,
    pub processing_time_ms: u64,
}

impl OrchestrationResponse {
    pub fn success(
        request_id: impl Into<String>,
        service_used: impl Into<String>,
        data: Value,
        elapsed: Duration,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            success: true,
            data: Some(data),
            error: None,
            message: None,
            service_used: Some(service_used.into()),
            processing_time_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn failure(
        request_id: impl Into<String>,
        service_used: Option<String>,
        error: &GatewayError,
        elapsed: Duration,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            success: false,
            data: None,
            error: Some(error.kind()),
            message: Some(error.to_string()),
            service_used,
            processing_time_ms: elapsed.as_millis() as u64,
        }
    }
}

/// Configuration, cached health and breaker state of one service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceStatus {
    pub name: String,
    pub service_type: ServiceType,
    pub base_url: String,
    pub enabled: bool,
    pub priority: u32,
    pub health: Option<ServiceHealth>,
    pub circuit: Option<CircuitBreakerState>,
}

/// Gateway-wide status for operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub services: usize,
    pub in_flight: usize,
    pub max_concurrent: usize,
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failure_shape() {
        let err = GatewayError::QuotaExceeded {
            tenant_id: "t1".into(),
            used: 1000,
            limit: 1000,
        };
        let response = OrchestrationResponse::failure("req-1", None, &err, Duration::from_millis(3));
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["success"], json!(false));
        assert_eq!(value["error"], json!("quota_exceeded"));
        assert_eq!(value["request_id"], json!("req-1"));
        assert_eq!(value["processing_time_ms"], json!(3));
        assert!(value.get("data").is_none());
    }

    #[test]
    fn test_request_builder() {
        let request = OrchestrationRequest::new("toxicity", json!({"text": "hi"}), "t1", "s1")
            .with_request_id("req-9")
            .with_timeout(Duration::from_millis(250));

        assert_eq!(request.service_type, ServiceType::Toxicity);
        assert_eq!(request.request_id, "req-9");
        assert_eq!(request.timeout_override(), Some(Duration::from_millis(250)));
    }
}
