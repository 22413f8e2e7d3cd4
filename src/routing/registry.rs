//! Guard service registry.
//!
//! # Responsibilities
//! - Index configured services by name and by service type
//! - Resolve each service's circuit breaker settings once
//! - Order candidates of one type by priority
//!
//! # Design Decisions
//! - Immutable after construction; a reload builds a new registry
//! - Disabled services stay registered so lookups can tell "disabled"
//!   apart from "unknown"

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{CircuitBreakerSettings, GatewayConfig, ServiceConfig};
use crate::routing::ServiceType;

/// A service entry with its effective settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredService {
    pub config: ServiceConfig,
    /// Per-service override if present, otherwise the global defaults.
    pub breaker: CircuitBreakerSettings,
}

impl RegisteredService {
    pub fn name(&self) -> &str {
        &self.config.name
    }
}

/// Lookup table over the configured guard services.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    by_name: HashMap<String, Arc<RegisteredService>>,
    by_type: HashMap<ServiceType, Vec<Arc<RegisteredService>>>,
}

impl ServiceRegistry {
    /// Build the registry from a validated configuration.
    pub fn from_config(config: &GatewayConfig) -> Self {
        let mut by_name = HashMap::new();
        let mut by_type: HashMap<ServiceType, Vec<Arc<RegisteredService>>> = HashMap::new();

        for service in &config.services {
            let entry = Arc::new(RegisteredService {
                breaker: service.circuit_breaker.unwrap_or(config.circuit_breaker),
                config: service.clone(),
            });
            by_type
                .entry(service.service_type.clone())
                .or_default()
                .push(entry.clone());
            by_name.insert(service.name.clone(), entry);
        }

        for candidates in by_type.values_mut() {
            candidates.sort_by(|a, b| {
                b.config
                    .priority
                    .cmp(&a.config.priority)
                    .then_with(|| a.config.name.cmp(&b.config.name))
            });
        }

        Self { by_name, by_type }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<RegisteredService>> {
        self.by_name.get(name)
    }

    /// All services of a type, highest priority first, including disabled ones.
    pub fn candidates(&self, service_type: &ServiceType) -> &[Arc<RegisteredService>] {
        self.by_type
            .get(service_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn all(&self) -> impl Iterator<Item = &Arc<RegisteredService>> {
        self.by_name.values()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.by_name.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_ordered_by_priority() {
        let mut config = GatewayConfig::default();
        let mut low = ServiceConfig::new("tox-b", ServiceType::Toxicity, "http://127.0.0.1:1");
        low.priority = 1;
        let mut high = ServiceConfig::new("tox-a", ServiceType::Toxicity, "http://127.0.0.1:2");
        high.priority = 10;
        let pii = ServiceConfig::new("pii", ServiceType::PiiDetection, "http://127.0.0.1:3");
        config.services = vec![low, high, pii];

        let registry = ServiceRegistry::from_config(&config);
        let names: Vec<&str> = registry
            .candidates(&ServiceType::Toxicity)
            .iter()
            .map(|s| s.name())
            .collect();

        assert_eq!(names, vec!["tox-a", "tox-b"]);
        assert_eq!(registry.len(), 3);
        assert!(registry.candidates(&ServiceType::SecretsScan).is_empty());
    }

    #[test]
    fn test_breaker_settings_resolved_once() {
        let mut config = GatewayConfig::default();
        config.circuit_breaker = CircuitBreakerSettings {
            failure_threshold: 7,
            recovery_timeout_secs: 30,
        };
        let mut custom = ServiceConfig::new("alpha", ServiceType::Toxicity, "http://127.0.0.1:1");
        custom.circuit_breaker = Some(CircuitBreakerSettings {
            failure_threshold: 3,
            recovery_timeout_secs: 5,
        });
        let plain = ServiceConfig::new("beta", ServiceType::PiiDetection, "http://127.0.0.1:2");
        config.services = vec![custom, plain];

        let registry = ServiceRegistry::from_config(&config);
        assert_eq!(registry.get("alpha").unwrap().breaker.failure_threshold, 3);
        assert_eq!(registry.get("beta").unwrap().breaker.failure_threshold, 7);
        assert_eq!(registry.get("beta").unwrap().breaker.recovery_timeout_secs, 30);
    }

    #[test]
    fn test_entry_carries_config_unchanged() {
        let mut config = GatewayConfig::default();
        let mut service = ServiceConfig::new("gamma", ServiceType::SecretsScan, "http://127.0.0.1:3");
        service.auth_token = Some("internal".into());
        config.services = vec![service.clone()];

        let registry = ServiceRegistry::from_config(&config);
        assert_eq!(
            **registry.get("gamma").unwrap(),
            RegisteredService {
                config: service,
                breaker: config.circuit_breaker,
            }
        );
    }
}
