//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (orchestrations, dispatches, health, circuits, quota)
//! - Expose Prometheus-compatible metrics endpoint
//! - Track per-service and aggregate metrics
//!
//! # Metrics
//! - `gateway_orchestrations_total` (counter): by service type, outcome
//! - `gateway_orchestration_duration_seconds` (histogram)
//! - `gateway_dispatch_total` (counter): by service, outcome
//! - `gateway_dispatch_duration_seconds` (histogram): by service
//! - `gateway_dispatch_payload_bytes` (histogram): by service
//! - `gateway_service_health` (gauge): 2=healthy, 1=degraded, 0=unhealthy
//! - `gateway_circuit_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `gateway_quota_rejections_total` (counter): by tier
//! - `gateway_quota_store_errors_total` (counter): by operation
//! - `gateway_admission_in_flight` (gauge)
//! - `gateway_events_dropped_total` (counter): by event
//!
//! # Design Decisions
//! - The `metrics` facade is a no-op until a recorder is installed, so
//!   library code and tests record unconditionally

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::health::HealthStatus;
use crate::resilience::CircuitState;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_orchestration(service_type: &str, outcome: &str, elapsed: Duration) {
    counter!(
        "gateway_orchestrations_total",
        "service_type" => service_type.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    histogram!(
        "gateway_orchestration_duration_seconds",
        "service_type" => service_type.to_string()
    )
    .record(elapsed.as_secs_f64());
}

pub fn record_dispatch(service: &str, outcome: &str, latency: Duration, payload_bytes: usize) {
    counter!(
        "gateway_dispatch_total",
        "service" => service.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    histogram!("gateway_dispatch_duration_seconds", "service" => service.to_string())
        .record(latency.as_secs_f64());
    histogram!("gateway_dispatch_payload_bytes", "service" => service.to_string())
        .record(payload_bytes as f64);
}

pub fn record_service_health(service: &str, status: HealthStatus) {
    let value = match status {
        HealthStatus::Healthy | HealthStatus::Unknown => 2.0,
        HealthStatus::Degraded => 1.0,
        HealthStatus::Unhealthy => 0.0,
    };
    gauge!("gateway_service_health", "service" => service.to_string()).set(value);
}

pub fn record_probe_latency(service: &str, latency: Duration) {
    histogram!("gateway_health_probe_duration_seconds", "service" => service.to_string())
        .record(latency.as_secs_f64());
}

pub fn record_circuit_state(service: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    gauge!("gateway_circuit_state", "service" => service.to_string()).set(value);
}

pub fn record_quota_rejection(tier: &str) {
    counter!("gateway_quota_rejections_total", "tier" => tier.to_string()).increment(1);
}

pub fn record_quota_store_error(operation: &'static str) {
    counter!("gateway_quota_store_errors_total", "operation" => operation).increment(1);
}

pub fn record_in_flight(count: usize) {
    gauge!("gateway_admission_in_flight").set(count as f64);
}

pub fn record_event_dropped(event: &'static str) {
    counter!("gateway_events_dropped_total", "event" => event).increment(1);
}
