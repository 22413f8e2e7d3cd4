//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::routing::ServiceType;

/// Root configuration for the guard gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Guard service registry.
    pub services: Vec<ServiceConfig>,

    /// Health check settings.
    pub health_check: HealthCheckConfig,

    /// Outbound dispatch limits.
    pub dispatch: DispatchConfig,

    /// Global circuit breaker defaults.
    pub circuit_breaker: CircuitBreakerSettings,

    /// Admission control.
    pub admission: AdmissionConfig,

    /// Tenant quota enforcement.
    pub quota: QuotaConfig,

    /// Event channel settings.
    pub events: EventsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,

    pub shutdown: ShutdownConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Total time allowed for an inbound HTTP request in seconds.
    pub request_timeout_secs: u64,

    /// Maximum inbound body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 75,
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

/// A single guard service registry entry.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Unique service identifier for logging/metrics.
    pub name: String,

    /// Analysis function this service performs.
    pub service_type: ServiceType,

    /// Base URL (e.g., "http://toxicity:8000").
    pub base_url: String,

    /// Path probed by the health monitor.
    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// Overrides the static dispatch path table for this service.
    #[serde(default)]
    pub dispatch_path: Option<String>,

    /// Dispatch timeout used when the request carries no override.
    #[serde(default = "default_service_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Selection priority among services of the same type (higher = preferred).
    #[serde(default)]
    pub priority: u32,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Internal bearer token sent to services in the same trust domain.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Per-service circuit breaker override.
    #[serde(default)]
    pub circuit_breaker: Option<CircuitBreakerSettings>,
}

impl ServiceConfig {
    /// Create a service entry with defaults for every optional field.
    pub fn new(name: impl Into<String>, service_type: ServiceType, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            service_type,
            base_url: base_url.into(),
            health_path: default_health_path(),
            dispatch_path: None,
            default_timeout_ms: default_service_timeout_ms(),
            priority: 0,
            enabled: true,
            auth_token: None,
            circuit_breaker: None,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_service_timeout_ms() -> u64 {
    10_000
}

fn default_enabled() -> bool {
    true
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active health checks.
    pub enabled: bool,

    /// Probe round interval in seconds.
    pub interval_secs: u64,

    /// Per-probe timeout in seconds.
    pub timeout_secs: u64,

    /// A 2xx slower than this is reported as degraded.
    pub latency_budget_ms: u64,

    /// Number of probe results retained per service.
    pub history_size: usize,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 15,
            timeout_secs: 5,
            latency_budget_ms: 1_000,
            history_size: 100,
        }
    }
}

/// Outbound dispatch limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Upper bound applied to every dispatch deadline.
    pub max_timeout_ms: u64,

    /// Smallest per-request timeout override accepted.
    pub min_timeout_ms: u64,

    /// Maximum serialized backend payload size.
    pub max_payload_bytes: usize,

    /// Connection establishment timeout.
    pub connect_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_timeout_ms: 30_000,
            min_timeout_ms: 50,
            max_payload_bytes: 10 * 1024 * 1024,
            connect_timeout_ms: 2_000,
        }
    }
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// Seconds an open circuit waits before admitting a trial call.
    pub recovery_timeout_secs: u64,
}

impl CircuitBreakerSettings {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 60,
        }
    }
}

/// Admission control configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Maximum concurrent in-flight orchestrations.
    pub max_concurrent: usize,

    /// How long a request may wait for a slot before it is rejected.
    pub acquire_timeout_ms: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 100,
            acquire_timeout_ms: 30_000,
        }
    }
}

/// Billing period granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodKind {
    Monthly,
    Daily,
    Hourly,
}

/// Behaviour when the quota store cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreFailurePolicy {
    /// Reject the call.
    FailClosed,
    /// Allow the call and log the degradation.
    FailOpen,
}

/// When usage is recorded relative to the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordMode {
    /// Increment before replying.
    Inline,
    /// Increment on a spawned task (eventually consistent).
    Background,
}

/// A subscription tier.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TierConfig {
    /// Calls allowed per period; absent means unlimited.
    #[serde(default)]
    pub limit: Option<u64>,
}

/// Tenant quota configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Enable quota enforcement.
    pub enabled: bool,

    pub period: PeriodKind,

    pub store_failure_policy: StoreFailurePolicy,

    pub record_mode: RecordMode,

    /// Deadline for a single quota store operation.
    pub store_timeout_ms: u64,

    /// Tier applied to tenants without an explicit assignment.
    pub default_tier: String,

    /// Tier name -> tier.
    pub tiers: BTreeMap<String, TierConfig>,

    /// Tenant id -> tier name.
    pub tenants: BTreeMap<String, String>,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        let mut tiers = BTreeMap::new();
        tiers.insert("free".to_string(), TierConfig { limit: Some(1_000) });
        tiers.insert("pro".to_string(), TierConfig { limit: Some(100_000) });
        tiers.insert("enterprise".to_string(), TierConfig { limit: None });

        Self {
            enabled: true,
            period: PeriodKind::Monthly,
            store_failure_policy: StoreFailurePolicy::FailClosed,
            record_mode: RecordMode::Inline,
            store_timeout_ms: 500,
            default_tier: "free".to_string(),
            tiers,
            tenants: BTreeMap::new(),
        }
    }
}

/// Event channel configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Bounded channel capacity; events beyond it are dropped and counted.
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1_024,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin routes.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}

/// Shutdown behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Time allowed for in-flight calls to drain.
    pub grace_period_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let toml_str = r#"
            [[services]]
            name = "toxicity-primary"
            service_type = "toxicity"
            base_url = "http://127.0.0.1:9000"
        "#;

        let config: GatewayConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.services.len(), 1);

        let service = &config.services[0];
        assert_eq!(service.service_type, ServiceType::Toxicity);
        assert_eq!(service.health_path, "/health");
        assert_eq!(service.default_timeout_ms, 10_000);
        assert!(service.enabled);
        assert!(service.circuit_breaker.is_none());

        assert_eq!(config.admission.max_concurrent, 100);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.circuit_breaker.recovery_timeout_secs, 60);
        assert_eq!(config.quota.store_failure_policy, StoreFailurePolicy::FailClosed);
        assert_eq!(config.dispatch.max_payload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.dispatch.min_timeout_ms, 50);
    }

    #[test]
    fn test_quota_section_parses() {
        let toml_str = r#"
            [quota]
            period = "daily"
            store_failure_policy = "fail_open"
            record_mode = "background"
            default_tier = "basic"

            [quota.tiers.basic]
            limit = 50

            [quota.tiers.unlimited]

            [quota.tenants]
            acme = "unlimited"
        "#;

        let config: GatewayConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.quota.period, PeriodKind::Daily);
        assert_eq!(config.quota.store_failure_policy, StoreFailurePolicy::FailOpen);
        assert_eq!(config.quota.record_mode, RecordMode::Background);
        assert_eq!(config.quota.tiers["basic"].limit, Some(50));
        assert_eq!(config.quota.tiers["unlimited"].limit, None);
        assert_eq!(config.quota.tenants["acme"], "unlimited");
    }
}
