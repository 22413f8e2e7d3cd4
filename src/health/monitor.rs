//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every enabled guard service
//! - Classify results and update the per-service cache
//! - Publish health changes and record probe metrics
//!
//! # Design Decisions
//! - Probes fan out concurrently, each under its own timeout; a stuck probe
//!   never delays the others
//! - A failing probe marks its service unhealthy; the loop keeps running
//! - Callers only ever read the cache; no request waits on a probe

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use chrono::Utc;
use futures_util::future::join_all;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::{HealthCheckConfig, ServiceConfig};
use crate::events::{EventBus, GatewayEvent};
use crate::health::state::{classify_probe, HealthSlot, HealthStatus, ProbeResult, ServiceHealth};
use crate::observability::metrics;
use crate::routing::endpoints::join_url;
use crate::routing::ServiceRegistry;

type SlotMap = HashMap<String, Arc<HealthSlot>>;

pub struct HealthMonitor {
    config: HealthCheckConfig,
    client: reqwest::Client,
    targets: ArcSwap<Vec<ServiceConfig>>,
    slots: ArcSwap<SlotMap>,
    events: Option<EventBus>,
}

impl HealthMonitor {
    pub fn new(
        config: HealthCheckConfig,
        services: &ServiceRegistry,
        client: reqwest::Client,
        events: Option<EventBus>,
    ) -> Self {
        let monitor = Self {
            config,
            client,
            targets: ArcSwap::from_pointee(Vec::new()),
            slots: ArcSwap::from_pointee(SlotMap::new()),
            events,
        };
        monitor.sync(services);
        monitor
    }

    /// Align probe targets with the service set, keeping cached health for
    /// services whose name survives.
    pub fn sync(&self, services: &ServiceRegistry) {
        let current = self.slots.load_full();
        let mut slots = SlotMap::with_capacity(services.len());
        let mut targets = Vec::with_capacity(services.len());

        for service in services.all() {
            let slot = current
                .get(service.name())
                .cloned()
                .unwrap_or_else(|| Arc::new(HealthSlot::new(service.name(), self.config.history_size)));
            slots.insert(service.name().to_string(), slot);
            if service.config.enabled {
                targets.push(service.config.clone());
            }
        }

        targets.sort_by(|a, b| a.name.cmp(&b.name));
        self.slots.store(Arc::new(slots));
        self.targets.store(Arc::new(targets));
    }

    /// Cached availability. Names missing from the registry are never available.
    pub fn is_service_healthy(&self, name: &str) -> bool {
        self.slots
            .load()
            .get(name)
            .map(|slot| slot.status().is_available())
            .unwrap_or(false)
    }

    pub fn get_health_status(&self, name: &str) -> Option<ServiceHealth> {
        self.slots.load().get(name).map(|slot| slot.health())
    }

    pub fn get_all_health_statuses(&self) -> BTreeMap<String, ServiceHealth> {
        self.slots
            .load()
            .iter()
            .map(|(name, slot)| (name.clone(), slot.health()))
            .collect()
    }

    pub fn history(&self, name: &str) -> Option<Vec<ProbeResult>> {
        self.slots.load().get(name).map(|slot| slot.history())
    }

    /// Probe every enabled service once, concurrently.
    pub async fn probe_all(&self) {
        let targets = self.targets.load_full();
        let results = join_all(targets.iter().map(|service| async move {
            (service.name.as_str(), self.probe_service(service).await)
        }))
        .await;

        let slots = self.slots.load();
        for (name, result) in results {
            if let Some(slot) = slots.get(name) {
                self.apply(name, slot, result);
            }
        }
    }

    /// Run one probe against a service.
    pub async fn probe_service(&self, service: &ServiceConfig) -> ProbeResult {
        let url = join_url(&service.base_url, &service.health_path);
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let start = Instant::now();

        let outcome = time::timeout(timeout, self.client.get(&url).send()).await;
        let latency = start.elapsed();
        metrics::record_probe_latency(&service.name, latency);

        let (status, http_status, error) = match outcome {
            Ok(Ok(response)) => {
                let code = response.status().as_u16();
                let status = classify_probe(code, latency, Duration::from_millis(self.config.latency_budget_ms));
                let error = match status {
                    HealthStatus::Unhealthy => Some(format!("HTTP {code}")),
                    HealthStatus::Degraded => Some(format!(
                        "slow response: {}ms over {}ms budget",
                        latency.as_millis(),
                        self.config.latency_budget_ms
                    )),
                    _ => None,
                };
                (status, Some(code), error)
            }
            Ok(Err(e)) => (HealthStatus::Unhealthy, None, Some(format!("connection error: {e}"))),
            Err(_) => (
                HealthStatus::Unhealthy,
                None,
                Some(format!("timed out after {}s", self.config.timeout_secs)),
            ),
        };

        ProbeResult {
            status,
            checked_at: Utc::now(),
            response_time_ms: http_status.map(|_| latency.as_millis() as u64),
            http_status,
            error,
        }
    }

    fn apply(&self, name: &str, slot: &HealthSlot, result: ProbeResult) {
        let status = result.status;
        let error = result.error.clone();
        metrics::record_service_health(name, status);

        let Some(previous) = slot.apply(result) else {
            return;
        };

        match status {
            HealthStatus::Unhealthy => tracing::warn!(
                service = %name,
                from = ?previous,
                error = error.as_deref().unwrap_or(""),
                "Service became unhealthy"
            ),
            _ => tracing::info!(service = %name, from = ?previous, to = ?status, "Service health changed"),
        }

        if let Some(events) = &self.events {
            events.publish(GatewayEvent::HealthChanged {
                service: name.to_string(),
                from: previous,
                to: status,
            });
        }
    }

    /// Probe loop; the first round runs immediately.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval_secs = self.config.interval_secs,
            timeout_secs = self.config.timeout_secs,
            services = self.targets.load().len(),
            "Health monitor starting"
        );

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.probe_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    pub fn spawn(self: &Arc<Self>, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.clone().run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::routing::ServiceType;

    fn registry(names: &[&str]) -> ServiceRegistry {
        let mut config = GatewayConfig::default();
        config.services = names
            .iter()
            .map(|n| ServiceConfig::new(*n, ServiceType::Toxicity, "http://127.0.0.1:1"))
            .collect();
        ServiceRegistry::from_config(&config)
    }

    fn monitor(names: &[&str]) -> HealthMonitor {
        let config = HealthCheckConfig {
            timeout_secs: 1,
            ..HealthCheckConfig::default()
        };
        HealthMonitor::new(config, &registry(names), reqwest::Client::new(), None)
    }

    #[test]
    fn test_unprobed_services_are_available() {
        let monitor = monitor(&["alpha"]);
        assert!(monitor.is_service_healthy("alpha"));
        assert!(!monitor.is_service_healthy("missing"));
        assert_eq!(monitor.get_health_status("alpha").unwrap().status, HealthStatus::Unknown);
    }

    #[tokio::test]
    async fn test_unreachable_service_marked_unhealthy() {
        let monitor = monitor(&["alpha", "beta"]);
        monitor.probe_all().await;

        let all = monitor.get_all_health_statuses();
        assert_eq!(all.len(), 2);
        for health in all.values() {
            assert_eq!(health.status, HealthStatus::Unhealthy);
            assert!(health.last_error.is_some());
        }
        assert!(!monitor.is_service_healthy("alpha"));
        assert_eq!(monitor.history("alpha").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sync_keeps_surviving_state() {
        let monitor = monitor(&["alpha", "beta"]);
        monitor.probe_all().await;

        monitor.sync(&registry(&["alpha", "gamma"]));
        assert_eq!(monitor.get_health_status("alpha").unwrap().status, HealthStatus::Unhealthy);
        assert_eq!(monitor.get_health_status("gamma").unwrap().status, HealthStatus::Unknown);
        assert!(monitor.get_health_status("beta").is_none());
    }
}
