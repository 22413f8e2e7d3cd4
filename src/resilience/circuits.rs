//! Registry of per-service circuit breakers.
//!
//! # Responsibilities
//! - Own one breaker per configured service
//! - Admit at most one trial call per Half-Open cycle
//! - Rebuild on reload, keeping breakers for surviving services
//!
//! # Design Decisions
//! - `ArcSwap` over an immutable map: lookups never lock, and a reload is one
//!   pointer swap
//! - The trial slot is released by dropping the permit, so a cancelled trial
//!   cannot wedge the service in Half-Open

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::error::GatewayError;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerState, CircuitState};
use crate::routing::ServiceRegistry;

#[derive(Debug)]
struct ServiceCircuit {
    breaker: Arc<CircuitBreaker>,
    trial_in_flight: AtomicBool,
}

type CircuitMap = HashMap<String, Arc<ServiceCircuit>>;

/// Admission granted by a breaker; hold it until the outcome is recorded.
#[derive(Debug)]
pub struct CircuitPermit {
    circuit: Arc<ServiceCircuit>,
    trial: bool,
}

impl CircuitPermit {
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.circuit.breaker
    }

    /// This call is the single Half-Open trial.
    pub fn is_trial(&self) -> bool {
        self.trial
    }
}

impl Drop for CircuitPermit {
    fn drop(&mut self) {
        if self.trial {
            self.circuit.trial_in_flight.store(false, Ordering::Release);
        }
    }
}

#[derive(Debug, Default)]
pub struct CircuitRegistry {
    circuits: ArcSwap<CircuitMap>,
}

impl CircuitRegistry {
    pub fn from_registry(services: &ServiceRegistry) -> Self {
        let registry = Self::default();
        registry.sync(services);
        registry
    }

    /// Align breakers with the service set. Existing breakers are kept when
    /// the name survives and its settings are unchanged.
    pub fn sync(&self, services: &ServiceRegistry) {
        let current = self.circuits.load_full();
        let mut next = CircuitMap::with_capacity(services.len());

        for service in services.all() {
            let kept = current
                .get(service.name())
                .filter(|c| c.breaker.settings() == service.breaker)
                .cloned();
            let circuit = kept.unwrap_or_else(|| {
                Arc::new(ServiceCircuit {
                    breaker: Arc::new(CircuitBreaker::new(service.name(), service.breaker)),
                    trial_in_flight: AtomicBool::new(false),
                })
            });
            next.insert(service.name().to_string(), circuit);
        }

        self.circuits.store(Arc::new(next));
    }

    pub fn get(&self, service: &str) -> Option<Arc<CircuitBreaker>> {
        self.circuits.load().get(service).map(|c| c.breaker.clone())
    }

    /// Ask the service's breaker for admission.
    pub fn try_acquire(&self, service: &str) -> Result<CircuitPermit, GatewayError> {
        let circuit = self
            .circuits
            .load()
            .get(service)
            .cloned()
            .ok_or_else(|| GatewayError::Configuration(format!("no circuit for service '{service}'")))?;

        let open = || GatewayError::CircuitOpen {
            service: service.to_string(),
        };

        if !circuit.breaker.can_execute() {
            return Err(open());
        }

        if circuit.breaker.state() == CircuitState::HalfOpen {
            if circuit
                .trial_in_flight
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return Err(open());
            }
            return Ok(CircuitPermit {
                circuit,
                trial: true,
            });
        }

        Ok(CircuitPermit {
            circuit,
            trial: false,
        })
    }

    pub fn snapshots(&self) -> Vec<CircuitBreakerState> {
        let mut states: Vec<_> = self
            .circuits
            .load()
            .values()
            .map(|c| c.breaker.snapshot())
            .collect();
        states.sort_by(|a, b| a.service_name.cmp(&b.service_name));
        states
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CircuitBreakerSettings, GatewayConfig, ServiceConfig};
    use crate::routing::ServiceType;
    use std::time::Duration;

    fn services(threshold: u32) -> ServiceRegistry {
        let mut config = GatewayConfig::default();
        let mut alpha = ServiceConfig::new("alpha", ServiceType::Toxicity, "http://127.0.0.1:1");
        alpha.circuit_breaker = Some(CircuitBreakerSettings {
            failure_threshold: threshold,
            recovery_timeout_secs: 5,
        });
        config.services = vec![alpha];
        ServiceRegistry::from_config(&config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_trial_in_half_open() {
        let circuits = CircuitRegistry::from_registry(&services(1));
        circuits.get("alpha").unwrap().record_failure();
        assert!(matches!(
            circuits.try_acquire("alpha"),
            Err(GatewayError::CircuitOpen { .. })
        ));

        tokio::time::advance(Duration::from_secs(5)).await;
        let trial = circuits.try_acquire("alpha").unwrap();
        assert!(trial.is_trial());
        assert!(matches!(
            circuits.try_acquire("alpha"),
            Err(GatewayError::CircuitOpen { .. })
        ));

        // A dropped trial frees the slot without deciding the outcome.
        drop(trial);
        let trial = circuits.try_acquire("alpha").unwrap();
        trial.breaker().record_success();
        drop(trial);

        let permit = circuits.try_acquire("alpha").unwrap();
        assert!(!permit.is_trial());
    }

    #[test]
    fn test_sync_keeps_surviving_breakers() {
        let circuits = CircuitRegistry::from_registry(&services(2));
        let before = circuits.get("alpha").unwrap();
        before.record_failure();

        circuits.sync(&services(2));
        assert_eq!(circuits.get("alpha").unwrap().failure_count(), 1);

        circuits.sync(&services(9));
        assert_eq!(circuits.get("alpha").unwrap().failure_count(), 0);

        circuits.sync(&ServiceRegistry::default());
        assert!(circuits.get("alpha").is_none());
        assert!(matches!(
            circuits.try_acquire("alpha"),
            Err(GatewayError::Configuration(_))
        ));
    }
}
