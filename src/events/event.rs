//! Gateway event payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::health::HealthStatus;

/// Something observable that happened while orchestrating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GatewayEvent {
    ServiceRouted {
        request_id: String,
        tenant_id: String,
        service: String,
        service_type: String,
        latency_ms: u64,
    },
    ServiceFailed {
        request_id: String,
        tenant_id: String,
        service: Option<String>,
        service_type: String,
        error_code: ErrorKind,
        message: String,
    },
    CircuitOpened {
        service: String,
        failure_count: u32,
    },
    CircuitClosed {
        service: String,
    },
    QuotaExceeded {
        tenant_id: String,
        tier: String,
        used: u64,
        limit: u64,
    },
    HealthChanged {
        service: String,
        from: HealthStatus,
        to: HealthStatus,
    },
}

impl GatewayEvent {
    pub fn name(&self) -> &'static str {
        match self {
            GatewayEvent::ServiceRouted { .. } => "service_routed",
            GatewayEvent::ServiceFailed { .. } => "service_failed",
            GatewayEvent::CircuitOpened { .. } => "circuit_opened",
            GatewayEvent::CircuitClosed { .. } => "circuit_closed",
            GatewayEvent::QuotaExceeded { .. } => "quota_exceeded",
            GatewayEvent::HealthChanged { .. } => "health_changed",
        }
    }
}

/// An event stamped at publication time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: GatewayEvent,
}

impl EventRecord {
    pub fn now(event: GatewayEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_is_flat_and_tagged() {
        let record = EventRecord::now(GatewayEvent::ServiceFailed {
            request_id: "r1".into(),
            tenant_id: "t1".into(),
            service: Some("tox".into()),
            service_type: "toxicity".into(),
            error_code: ErrorKind::Timeout,
            message: "timed out".into(),
        });
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["event"], json!("service_failed"));
        assert_eq!(value["error_code"], json!("timeout"));
        assert!(value["timestamp"].is_string());
        assert_eq!(record.event.name(), "service_failed");
    }
}
