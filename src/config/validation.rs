//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (tenants reference existing tiers)
//! - Validate value ranges (timeouts > 0, thresholds > 0)
//! - Detect duplicate service names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use url::Url;

use crate::config::schema::{CircuitBreakerSettings, GatewayConfig};

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("duplicate service name '{0}'")]
    DuplicateService(String),

    #[error("service '{name}' has invalid base_url '{url}'")]
    InvalidBaseUrl { name: String, url: String },

    #[error("service '{name}': {field} must start with '/'")]
    InvalidPath { name: String, field: &'static str },

    #[error("{0} must be greater than zero")]
    ZeroValue(String),

    #[error("tenant '{tenant}' references undefined tier '{tier}'")]
    UnknownTier { tenant: String, tier: String },

    #[error("default tier '{0}' is not defined")]
    UnknownDefaultTier(String),

    #[error("{field} ({value_ms}ms) must not exceed {limit_field} ({limit_ms}ms)")]
    TimeoutOrder {
        field: &'static str,
        value_ms: u64,
        limit_field: &'static str,
        limit_ms: u64,
    },

    #[error(
        "listener.request_timeout_secs ({request_ms}ms) must exceed admission wait + dispatch \
         maximum + quota store calls ({required_ms}ms)"
    )]
    RequestTimeoutTooShort { request_ms: u64, required_ms: u64 },
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut names = HashSet::new();
    for service in &config.services {
        if !names.insert(service.name.as_str()) {
            errors.push(ValidationError::DuplicateService(service.name.clone()));
        }

        match Url::parse(&service.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => errors.push(ValidationError::InvalidBaseUrl {
                name: service.name.clone(),
                url: service.base_url.clone(),
            }),
        }

        if !service.health_path.starts_with('/') {
            errors.push(ValidationError::InvalidPath {
                name: service.name.clone(),
                field: "health_path",
            });
        }
        if let Some(path) = &service.dispatch_path {
            if !path.starts_with('/') {
                errors.push(ValidationError::InvalidPath {
                    name: service.name.clone(),
                    field: "dispatch_path",
                });
            }
        }

        if service.default_timeout_ms == 0 {
            errors.push(ValidationError::ZeroValue(format!(
                "services.{}.default_timeout_ms",
                service.name
            )));
        }
        if let Some(settings) = &service.circuit_breaker {
            check_breaker(settings, &format!("services.{}.circuit_breaker", service.name), &mut errors);
        }
    }

    check_breaker(&config.circuit_breaker, "circuit_breaker", &mut errors);

    if config.admission.max_concurrent == 0 {
        errors.push(ValidationError::ZeroValue("admission.max_concurrent".into()));
    }
    if config.dispatch.max_timeout_ms == 0 {
        errors.push(ValidationError::ZeroValue("dispatch.max_timeout_ms".into()));
    }
    if config.dispatch.min_timeout_ms > config.dispatch.max_timeout_ms {
        errors.push(ValidationError::TimeoutOrder {
            field: "dispatch.min_timeout_ms",
            value_ms: config.dispatch.min_timeout_ms,
            limit_field: "dispatch.max_timeout_ms",
            limit_ms: config.dispatch.max_timeout_ms,
        });
    }
    let required_ms = request_budget_ms(config);
    let request_ms = config.listener.request_timeout_secs.saturating_mul(1_000);
    if request_ms <= required_ms {
        errors.push(ValidationError::RequestTimeoutTooShort {
            request_ms,
            required_ms,
        });
    }
    if config.dispatch.max_payload_bytes == 0 {
        errors.push(ValidationError::ZeroValue("dispatch.max_payload_bytes".into()));
    }
    if config.health_check.enabled {
        if config.health_check.interval_secs == 0 {
            errors.push(ValidationError::ZeroValue("health_check.interval_secs".into()));
        }
        if config.health_check.timeout_secs == 0 {
            errors.push(ValidationError::ZeroValue("health_check.timeout_secs".into()));
        }
    }
    if config.health_check.history_size == 0 {
        errors.push(ValidationError::ZeroValue("health_check.history_size".into()));
    }
    if config.events.channel_capacity == 0 {
        errors.push(ValidationError::ZeroValue("events.channel_capacity".into()));
    }

    if config.quota.enabled {
        if config.quota.store_timeout_ms == 0 {
            errors.push(ValidationError::ZeroValue("quota.store_timeout_ms".into()));
        }
        if !config.quota.tiers.contains_key(&config.quota.default_tier) {
            errors.push(ValidationError::UnknownDefaultTier(
                config.quota.default_tier.clone(),
            ));
        }
        for (tenant, tier) in &config.quota.tenants {
            if !config.quota.tiers.contains_key(tier) {
                errors.push(ValidationError::UnknownTier {
                    tenant: tenant.clone(),
                    tier: tier.clone(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Worst-case time an orchestration can take inside the gateway: the
/// admission wait, the longest dispatch, and a quota check plus record.
pub fn request_budget_ms(config: &GatewayConfig) -> u64 {
    let store_ms = if config.quota.enabled {
        config.quota.store_timeout_ms.saturating_mul(2)
    } else {
        0
    };
    config
        .admission
        .acquire_timeout_ms
        .saturating_add(config.dispatch.max_timeout_ms)
        .saturating_add(store_ms)
}

fn check_breaker(settings: &CircuitBreakerSettings, prefix: &str, errors: &mut Vec<ValidationError>) {
    if settings.failure_threshold == 0 {
        errors.push(ValidationError::ZeroValue(format!("{prefix}.failure_threshold")));
    }
    if settings.recovery_timeout_secs == 0 {
        errors.push(ValidationError::ZeroValue(format!("{prefix}.recovery_timeout_secs")));
    }
}
