//! Bounded HTTP dispatch to guard services.
//!
//! # Responsibilities
//! - Transform and size-check the payload before any network call
//! - POST it with the standard headers under an explicit deadline
//! - Classify the outcome into the gateway error taxonomy
//!
//! # Design Decisions
//! - One shared `reqwest::Client` (connection pooling across services)
//! - Deadline = min(request override or service default, system maximum)
//! - No retries; a failed call is reported once and the caller decides
//! - Only `200` with a JSON body counts as success

use std::time::{Duration, Instant};

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::Value;

use crate::config::{DispatchConfig, ServiceConfig};
use crate::error::GatewayError;
use crate::http::{X_REQUEST_ID, X_SESSION_ID, X_TENANT_ID};
use crate::observability::metrics;
use crate::orchestrator::OrchestrationRequest;
use crate::routing::endpoints::{determine_endpoint, join_url};
use crate::routing::payload::transform_payload;

const MAX_ERROR_MESSAGE_LEN: usize = 256;

/// A successful guard service call.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub data: Value,
    pub latency: Duration,
    pub payload_bytes: usize,
}

/// Resolves, transforms and dispatches requests to guard services.
#[derive(Debug, Clone)]
pub struct RequestRouter {
    client: reqwest::Client,
    min_timeout: Duration,
    max_timeout: Duration,
    max_payload_bytes: usize,
}

impl RequestRouter {
    /// Create a router with its own pooled HTTP client.
    pub fn new(config: &DispatchConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .user_agent(concat!("guard-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, config))
    }

    /// Create a router around an existing client.
    pub fn with_client(client: reqwest::Client, config: &DispatchConfig) -> Self {
        Self {
            client,
            min_timeout: Duration::from_millis(config.min_timeout_ms),
            max_timeout: Duration::from_millis(config.max_timeout_ms),
            max_payload_bytes: config.max_payload_bytes,
        }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Reject timeout overrides too short to reach a backend. Such a call
    /// would time out locally and be booked against the service's breaker.
    pub fn check_timeout_override(&self, request: &OrchestrationRequest) -> Result<(), GatewayError> {
        match request.timeout_override() {
            Some(timeout) if timeout < self.min_timeout => Err(GatewayError::InvalidPayload {
                service_type: request.service_type.to_string(),
                reason: format!(
                    "timeout_ms must be at least {}ms, got {}ms",
                    self.min_timeout.as_millis(),
                    timeout.as_millis()
                ),
            }),
            _ => Ok(()),
        }
    }

    /// The deadline applied to a dispatch.
    pub fn dispatch_deadline(&self, request: &OrchestrationRequest, service: &ServiceConfig) -> Duration {
        request
            .timeout_override()
            .unwrap_or_else(|| service.default_timeout())
            .min(self.max_timeout)
    }

    /// Send a request to a guard service and classify the result.
    pub async fn route(
        &self,
        request: &OrchestrationRequest,
        service: &ServiceConfig,
    ) -> Result<DispatchOutcome, GatewayError> {
        self.check_timeout_override(request)?;
        let payload = transform_payload(request)?;
        let body = payload.to_bytes()?;
        let payload_bytes = body.len();

        if payload_bytes > self.max_payload_bytes {
            return Err(GatewayError::PayloadTooLarge {
                size: payload_bytes,
                max: self.max_payload_bytes,
            });
        }

        let path = determine_endpoint(request, service);
        let url = join_url(&service.base_url, path);
        let deadline = self.dispatch_deadline(request, service);

        let mut builder = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(X_REQUEST_ID, &request.request_id)
            .header(X_TENANT_ID, &request.tenant_id)
            .header(X_SESSION_ID, &request.session_id)
            .body(body);
        if let Some(token) = &service.auth_token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        tracing::debug!(
            request_id = %request.request_id,
            service = %service.name,
            url = %url,
            deadline_ms = deadline.as_millis() as u64,
            payload_bytes,
            "Dispatching to guard service"
        );

        let start = Instant::now();
        let exchange = async {
            let response = builder.send().await?;
            let status = response.status();
            let bytes = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, bytes))
        };

        let result = match tokio::time::timeout(deadline, exchange).await {
            Ok(Ok((status, bytes))) => classify_response(&service.name, path, status, &bytes),
            Ok(Err(e)) => Err(classify_transport_error(&service.name, deadline, &e)),
            Err(_) => Err(GatewayError::Timeout {
                service: service.name.clone(),
                timeout_ms: deadline.as_millis() as u64,
            }),
        };
        let latency = start.elapsed();

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.error_code(),
        };
        metrics::record_dispatch(&service.name, outcome, latency, payload_bytes);

        result.map(|data| DispatchOutcome {
            data,
            latency,
            payload_bytes,
        })
    }
}

/// Map a completed HTTP exchange to success or an error kind.
pub fn classify_response(
    service: &str,
    path: &str,
    status: StatusCode,
    body: &[u8],
) -> Result<Value, GatewayError> {
    match status {
        StatusCode::OK => serde_json::from_slice(body).map_err(|_| GatewayError::Service {
            service: service.to_string(),
            status: status.as_u16(),
            message: "response body is not valid JSON".to_string(),
        }),
        StatusCode::UNAUTHORIZED => Err(GatewayError::Auth {
            service: service.to_string(),
        }),
        StatusCode::FORBIDDEN => Err(GatewayError::Permission {
            service: service.to_string(),
        }),
        StatusCode::NOT_FOUND => Err(GatewayError::RouteNotFound {
            service: service.to_string(),
            path: path.to_string(),
        }),
        other => Err(GatewayError::Service {
            service: service.to_string(),
            status: other.as_u16(),
            message: extract_error_message(body).unwrap_or_else(|| format!("HTTP {}", other.as_u16())),
        }),
    }
}

fn classify_transport_error(service: &str, deadline: Duration, error: &reqwest::Error) -> GatewayError {
    if error.is_timeout() {
        GatewayError::Timeout {
            service: service.to_string(),
            timeout_ms: deadline.as_millis() as u64,
        }
    } else {
        GatewayError::Connection {
            service: service.to_string(),
            message: error.to_string(),
        }
    }
}

/// Pull a human-readable message out of an error body.
///
/// Recognizes `{"error": "..."}`, `{"error": {"message": "..."}}`,
/// `{"message": "..."}` and `{"detail": "..."}`; otherwise uses short text.
pub fn extract_error_message(body: &[u8]) -> Option<String> {
    if body.is_empty() {
        return None;
    }

    if let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(body) {
        let found = match map.get("error") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Object(inner)) => inner
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        }
        .or_else(|| map.get("message").and_then(Value::as_str).map(str::to_string))
        .or_else(|| map.get("detail").and_then(Value::as_str).map(str::to_string));
        return found.map(|m| truncate(&m));
    }

    let text = std::str::from_utf8(body).ok()?.trim();
    if text.is_empty() {
        None
    } else {
        Some(truncate(text))
    }
}

fn truncate(message: &str) -> String {
    message.chars().take(MAX_ERROR_MESSAGE_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::ServiceType;
    use serde_json::json;

    fn router(max_timeout_ms: u64, max_payload_bytes: usize) -> RequestRouter {
        RequestRouter::with_client(
            reqwest::Client::new(),
            &DispatchConfig {
                max_timeout_ms,
                min_timeout_ms: 50,
                max_payload_bytes,
                connect_timeout_ms: 100,
            },
        )
    }

    #[test]
    fn test_deadline_clamped_to_system_maximum() {
        let router = router(5_000, 1024);
        let mut service = ServiceConfig::new("tox", ServiceType::Toxicity, "http://127.0.0.1:1");
        service.default_timeout_ms = 2_000;

        let request = OrchestrationRequest::new("toxicity", json!({"text": "x"}), "t", "s");
        assert_eq!(router.dispatch_deadline(&request, &service), Duration::from_millis(2_000));

        let request = request.with_timeout(Duration::from_secs(60));
        assert_eq!(router.dispatch_deadline(&request, &service), Duration::from_millis(5_000));

        let request = OrchestrationRequest::new("toxicity", json!({"text": "x"}), "t", "s")
            .with_timeout(Duration::from_millis(150));
        assert_eq!(router.dispatch_deadline(&request, &service), Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_oversized_payload_rejected_before_network() {
        let router = router(1_000, 64);
        // Port 1 is never listening; reaching the network would yield a connection error.
        let service = ServiceConfig::new("tox", ServiceType::Toxicity, "http://127.0.0.1:1");
        let request = OrchestrationRequest::new(
            "toxicity",
            json!({"text": "x".repeat(500)}),
            "t",
            "s",
        );

        let err = router.route(&request, &service).await.unwrap_err();
        assert!(matches!(err, GatewayError::PayloadTooLarge { max: 64, .. }));
    }

    #[tokio::test]
    async fn test_too_short_timeout_rejected_before_network() {
        let router = router(1_000, 1024);
        let service = ServiceConfig::new("tox", ServiceType::Toxicity, "http://127.0.0.1:1");

        for timeout in [Duration::ZERO, Duration::from_millis(49)] {
            let request = OrchestrationRequest::new("toxicity", json!({"text": "x"}), "t", "s")
                .with_timeout(timeout);
            let err = router.route(&request, &service).await.unwrap_err();
            assert!(matches!(err, GatewayError::InvalidPayload { .. }), "{err}");
            assert!(!err.counts_as_circuit_failure());
        }

        let request = OrchestrationRequest::new("toxicity", json!({"text": "x"}), "t", "s")
            .with_timeout(Duration::from_millis(50));
        assert!(router.check_timeout_override(&request).is_ok());
    }

    #[tokio::test]
    async fn test_invalid_payload_rejected_before_network() {
        let router = router(1_000, 1024);
        let service = ServiceConfig::new("tox", ServiceType::Toxicity, "http://127.0.0.1:1");
        let request = OrchestrationRequest::new("toxicity", json!({"body": "x"}), "t", "s");

        let err = router.route(&request, &service).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidPayload { .. }));
    }

    #[test]
    fn test_classify_statuses() {
        let ok = classify_response("a", "/p", StatusCode::OK, br#"{"score": 0.1}"#).unwrap();
        assert_eq!(ok, json!({"score": 0.1}));

        assert!(matches!(
            classify_response("a", "/p", StatusCode::OK, b"not json"),
            Err(GatewayError::Service { status: 200, .. })
        ));
        assert!(matches!(
            classify_response("a", "/p", StatusCode::UNAUTHORIZED, b""),
            Err(GatewayError::Auth { .. })
        ));
        assert!(matches!(
            classify_response("a", "/p", StatusCode::FORBIDDEN, b""),
            Err(GatewayError::Permission { .. })
        ));
        assert_eq!(
            classify_response("a", "/p", StatusCode::NOT_FOUND, b""),
            Err(GatewayError::RouteNotFound {
                service: "a".into(),
                path: "/p".into()
            })
        );
        assert_eq!(
            classify_response("a", "/p", StatusCode::SERVICE_UNAVAILABLE, b""),
            Err(GatewayError::Service {
                service: "a".into(),
                status: 503,
                message: "HTTP 503".into()
            })
        );
        assert!(matches!(
            classify_response("a", "/p", StatusCode::CREATED, b"{}"),
            Err(GatewayError::Service { status: 201, .. })
        ));
    }

    #[test]
    fn test_extract_error_message() {
        assert_eq!(
            extract_error_message(br#"{"error": "model not loaded"}"#).as_deref(),
            Some("model not loaded")
        );
        assert_eq!(
            extract_error_message(br#"{"error": {"message": "bad input"}}"#).as_deref(),
            Some("bad input")
        );
        assert_eq!(
            extract_error_message(br#"{"detail": "validation failed"}"#).as_deref(),
            Some("validation failed")
        );
        assert_eq!(extract_error_message(br#"{"code": 7}"#), None);
        assert_eq!(extract_error_message(b"  upstream exploded \n").as_deref(), Some("upstream exploded"));
        assert_eq!(extract_error_message(b""), None);
        assert_eq!(extract_error_message("x".repeat(1000).as_bytes()).map(|m| m.len()), Some(256));
    }
}
