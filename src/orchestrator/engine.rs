//! The orchestration façade.
//!
//! # Responsibilities
//! - Build every subsystem once, lazily, on first use
//! - Admit requests through the concurrency gate
//! - Run the decision stages in order and stop at the first failure
//! - Feed outcomes back into breakers, usage and events
//! - Convert every exit, panics included, into one response shape
//!
//! # Design Decisions
//! - One explicitly constructed instance shared by handlers; no globals
//! - Stages return `GatewayError` and the response is built once at the top
//! - A reload swaps the registry and keeps breaker and health state for
//!   services whose name survives

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use futures_util::FutureExt;
use serde_json::Value;
use tokio::sync::{watch, OnceCell};
use tokio::task::JoinHandle;

use crate::config::{validate_config, GatewayConfig};
use crate::error::GatewayError;
use crate::events::{EventBus, EventStats, EventSubscriber, GatewayEvent, LogSubscriber};
use crate::health::{HealthMonitor, ProbeResult, ServiceHealth};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::orchestrator::admission::AdmissionGate;
use crate::orchestrator::types::{
    GatewayStatus, OrchestrationRequest, OrchestrationResponse, ServiceStatus,
};
use crate::quota::{InMemoryQuotaStore, QuotaStore, StaticTierProvider, TierProvider, UsageRecord, UsageTracker};
use crate::resilience::{CircuitBreakerState, CircuitRegistry, CircuitTransition};
use crate::routing::{RegisteredService, RequestRouter, ServiceRegistry};

/// A failed stage, with the service it had resolved to if any.
#[derive(Debug)]
struct Failure {
    service: Option<String>,
    error: GatewayError,
}

impl From<GatewayError> for Failure {
    fn from(error: GatewayError) -> Self {
        Self {
            service: None,
            error,
        }
    }
}

struct Routed {
    service: String,
    data: Value,
}

/// Subsystems built on first use.
struct Components {
    registry: ArcSwap<ServiceRegistry>,
    circuits: CircuitRegistry,
    health: Arc<HealthMonitor>,
    router: ArcSwap<RequestRouter>,
    usage: ArcSwap<UsageTracker>,
    admission: AdmissionGate,
    events: EventBus,
    health_task: Mutex<Option<JoinHandle<()>>>,
}

/// Builder for [`Orchestrator`] with pluggable collaborators.
pub struct OrchestratorBuilder {
    config: GatewayConfig,
    quota_store: Option<Arc<dyn QuotaStore>>,
    tier_provider: Option<Arc<dyn TierProvider>>,
    subscriber: Option<Arc<dyn EventSubscriber>>,
}

impl OrchestratorBuilder {
    /// Shared counter store; defaults to an in-process store.
    pub fn quota_store(mut self, store: Arc<dyn QuotaStore>) -> Self {
        self.quota_store = Some(store);
        self
    }

    /// Tier lookup; defaults to the tiers in the config.
    pub fn tier_provider(mut self, provider: Arc<dyn TierProvider>) -> Self {
        self.tier_provider = Some(provider);
        self
    }

    /// Event sink; defaults to [`LogSubscriber`].
    pub fn event_subscriber(mut self, subscriber: Arc<dyn EventSubscriber>) -> Self {
        self.subscriber = Some(subscriber);
        self
    }

    /// Validate the configuration. Invalid configuration is fatal here,
    /// never deferred to a request.
    pub fn build(self) -> Result<Orchestrator, GatewayError> {
        check_config(&self.config)?;
        Ok(Orchestrator {
            config: ArcSwap::from_pointee(self.config),
            components: OnceCell::new(),
            shutting_down: AtomicBool::new(false),
            shutdown: Shutdown::new(),
            abort: watch::Sender::new(false),
            quota_store: self
                .quota_store
                .unwrap_or_else(|| Arc::new(InMemoryQuotaStore::new())),
            tier_provider: self.tier_provider,
            subscriber: self.subscriber.unwrap_or_else(|| Arc::new(LogSubscriber)),
            started_at: Instant::now(),
        })
    }
}

pub struct Orchestrator {
    config: ArcSwap<GatewayConfig>,
    components: OnceCell<Components>,
    shutting_down: AtomicBool,
    shutdown: Shutdown,
    /// Set once the grace period has expired; cancels dispatches still running.
    abort: watch::Sender<bool>,
    quota_store: Arc<dyn QuotaStore>,
    tier_provider: Option<Arc<dyn TierProvider>>,
    subscriber: Arc<dyn EventSubscriber>,
    started_at: Instant,
}

impl Orchestrator {
    pub fn builder(config: GatewayConfig) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            quota_store: None,
            tier_provider: None,
            subscriber: None,
        }
    }

    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> Arc<GatewayConfig> {
        self.config.load_full()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Build subsystems and start the health loop. Runs once; concurrent
    /// callers wait for the first one to finish.
    pub async fn initialize(&self) -> Result<(), GatewayError> {
        self.components().await.map(|_| ())
    }

    async fn components(&self) -> Result<&Components, GatewayError> {
        if self.is_shutting_down() {
            return Err(GatewayError::ShuttingDown);
        }
        self.components
            .get_or_try_init(|| async { self.build_components() })
            .await
    }

    fn build_components(&self) -> Result<Components, GatewayError> {
        let config = self.config.load_full();
        let registry = ServiceRegistry::from_config(&config);
        let router = RequestRouter::new(&config.dispatch)?;
        let events = EventBus::new(config.events.channel_capacity, self.subscriber.clone());

        let health = Arc::new(HealthMonitor::new(
            config.health_check.clone(),
            &registry,
            router.client().clone(),
            Some(events.clone()),
        ));
        let health_task = health.spawn(self.shutdown.subscribe());

        tracing::info!(
            services = registry.len(),
            max_concurrent = config.admission.max_concurrent,
            quota_enabled = config.quota.enabled,
            "Orchestrator initialized"
        );

        Ok(Components {
            circuits: CircuitRegistry::from_registry(&registry),
            registry: ArcSwap::from_pointee(registry),
            health,
            router: ArcSwap::from_pointee(router),
            usage: ArcSwap::from_pointee(self.usage_tracker(&config)),
            admission: AdmissionGate::new(&config.admission),
            events,
            health_task: Mutex::new(Some(health_task)),
        })
    }

    fn usage_tracker(&self, config: &GatewayConfig) -> UsageTracker {
        let tiers = self
            .tier_provider
            .clone()
            .unwrap_or_else(|| Arc::new(StaticTierProvider::from_config(&config.quota)));
        UsageTracker::new(&config.quota, self.quota_store.clone(), tiers)
    }

    /// Route one request. Always returns a response; never panics.
    pub async fn orchestrate(&self, request: OrchestrationRequest) -> OrchestrationResponse {
        let start = Instant::now();

        let outcome = match AssertUnwindSafe(self.run(&request)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(request_id = %request.request_id, panic = %message, "Orchestration panicked");
                Err(Failure::from(GatewayError::Internal(message)))
            }
        };
        let elapsed = start.elapsed();

        match outcome {
            Ok(Routed { service, data }) => {
                metrics::record_orchestration(request.service_type.as_str(), "success", elapsed);
                OrchestrationResponse::success(request.request_id, service, data, elapsed)
            }
            Err(Failure { service, error }) => {
                metrics::record_orchestration(request.service_type.as_str(), error.error_code(), elapsed);
                tracing::debug!(
                    request_id = %request.request_id,
                    tenant_id = %request.tenant_id,
                    service = service.as_deref().unwrap_or("none"),
                    error_code = error.error_code(),
                    error = %error,
                    "Orchestration failed"
                );
                self.publish_failure(&request, service.as_deref(), &error);
                OrchestrationResponse::failure(request.request_id, service, &error, elapsed)
            }
        }
    }

    async fn run(&self, request: &OrchestrationRequest) -> Result<Routed, Failure> {
        if self.is_shutting_down() {
            return Err(GatewayError::ShuttingDown.into());
        }
        let c = self.components().await?;
        let _slot = c.admission.acquire().await?;
        if self.is_shutting_down() {
            return Err(GatewayError::ShuttingDown.into());
        }

        let registry = c.registry.load_full();

        // 1. Configuration
        let enabled = enabled_candidates(&registry, request)?;
        let router = c.router.load_full();
        router.check_timeout_override(request)?;

        // 2. Quota
        let usage = c.usage.load_full();
        let check = usage.check_quota(&request.tenant_id).await?;
        if !check.allowed() {
            c.events.publish(GatewayEvent::QuotaExceeded {
                tenant_id: check.tenant_id.clone(),
                tier: check.tier_name.clone(),
                used: check.used,
                limit: check.limit.unwrap_or(0),
            });
            check.into_result()?;
        }

        // 3. Health
        let healthy: Vec<&Arc<RegisteredService>> = enabled
            .iter()
            .copied()
            .filter(|s| c.health.is_service_healthy(s.name()))
            .collect();
        let Some(first_healthy) = healthy.first() else {
            let service = enabled[0].name().to_string();
            return Err(Failure {
                service: Some(service.clone()),
                error: GatewayError::ServiceUnavailable { service },
            });
        };

        // 4. Circuit: highest-priority healthy candidate whose breaker admits.
        let mut admitted = None;
        for candidate in &healthy {
            if let Ok(permit) = c.circuits.try_acquire(candidate.name()) {
                admitted = Some((*candidate, permit));
                break;
            }
        }
        let Some((service, permit)) = admitted else {
            let name = first_healthy.name().to_string();
            return Err(Failure {
                service: Some(name.clone()),
                error: GatewayError::CircuitOpen { service: name },
            });
        };
        let name = service.name().to_string();

        // 5. Dispatch
        let mut abort = self.abort.subscribe();
        let dispatched = tokio::select! {
            result = router.route(request, &service.config) => result,
            _ = abort.wait_for(|aborted| *aborted) => Err(GatewayError::ShuttingDown),
        };
        match dispatched {
            Ok(dispatch) => {
                if let Some(CircuitTransition::Closed) = permit.breaker().record_success() {
                    c.events.publish(GatewayEvent::CircuitClosed {
                        service: name.clone(),
                    });
                }
                drop(permit);
                usage.record_usage(&request.tenant_id).await;
                c.events.publish(GatewayEvent::ServiceRouted {
                    request_id: request.request_id.clone(),
                    tenant_id: request.tenant_id.clone(),
                    service: name.clone(),
                    service_type: request.service_type.to_string(),
                    latency_ms: dispatch.latency.as_millis() as u64,
                });
                Ok(Routed {
                    service: name,
                    data: dispatch.data,
                })
            }
            Err(error) => {
                if error.counts_as_circuit_failure() {
                    if let Some(CircuitTransition::Opened { failure_count }) = permit.breaker().record_failure() {
                        c.events.publish(GatewayEvent::CircuitOpened {
                            service: name.clone(),
                            failure_count,
                        });
                    }
                }
                drop(permit);
                if error.consumed_backend_capacity() {
                    usage.record_usage(&request.tenant_id).await;
                }
                Err(Failure {
                    service: Some(name),
                    error,
                })
            }
        }
    }

    fn publish_failure(&self, request: &OrchestrationRequest, service: Option<&str>, error: &GatewayError) {
        // Quota rejections have their own event; after shutdown the bus is closed.
        if matches!(error, GatewayError::QuotaExceeded { .. } | GatewayError::ShuttingDown) {
            return;
        }
        if let Some(c) = self.components.get() {
            c.events.publish(GatewayEvent::ServiceFailed {
                request_id: request.request_id.clone(),
                tenant_id: request.tenant_id.clone(),
                service: service.map(str::to_string),
                service_type: request.service_type.to_string(),
                error_code: error.kind(),
                message: error.to_string(),
            });
        }
    }

    /// Apply a new configuration. Admission and dispatch limits keep their
    /// startup values; services, breakers, health targets and quota tiers
    /// are replaced.
    pub fn reload(&self, config: GatewayConfig) -> Result<(), GatewayError> {
        check_config(&config)?;

        if let Some(c) = self.components.get() {
            let registry = ServiceRegistry::from_config(&config);
            c.circuits.sync(&registry);
            c.health.sync(&registry);
            let client = c.router.load().client().clone();
            c.router
                .store(Arc::new(RequestRouter::with_client(client, &config.dispatch)));
            c.usage.store(Arc::new(self.usage_tracker(&config)));
            c.registry.store(Arc::new(registry));
        }

        tracing::info!(services = config.services.len(), "Configuration reloaded");
        self.config.store(Arc::new(config));
        Ok(())
    }

    /// Refuse new work, wait for in-flight orchestrations, stop the health
    /// loop and drain events, all within the configured grace period.
    ///
    /// Dispatches still running when the grace period ends are cancelled and
    /// answered with `shutting_down`; dropping them releases their pooled
    /// connections. Background usage increments are bounded by the quota
    /// store timeout and are not awaited.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let grace = Duration::from_secs(self.config.load().shutdown.grace_period_secs);
        let deadline = Instant::now() + grace;
        tracing::info!(grace_secs = grace.as_secs(), "Orchestrator shutting down");

        self.shutdown.trigger();
        let Some(c) = self.components.get() else {
            return;
        };

        if !c.admission.drain(grace).await {
            tracing::warn!(
                in_flight = c.admission.in_flight(),
                "Grace period expired with requests in flight, cancelling their dispatches"
            );
            self.abort.send_replace(true);
        }

        let health_task = c
            .health_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut task) = health_task {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if tokio::time::timeout(remaining, &mut task).await.is_err() {
                task.abort();
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        c.events.close(remaining.max(Duration::from_millis(100))).await;
        tracing::info!("Orchestrator stopped");
    }

    // Operator views

    pub async fn service_statuses(&self) -> Result<Vec<ServiceStatus>, GatewayError> {
        let c = self.components().await?;
        let registry = c.registry.load_full();
        let circuits: BTreeMap<String, CircuitBreakerState> = c
            .circuits
            .snapshots()
            .into_iter()
            .map(|s| (s.service_name.clone(), s))
            .collect();

        Ok(registry
            .names()
            .into_iter()
            .filter_map(|name| registry.get(&name).cloned())
            .map(|service| ServiceStatus {
                name: service.name().to_string(),
                service_type: service.config.service_type.clone(),
                base_url: service.config.base_url.clone(),
                enabled: service.config.enabled,
                priority: service.config.priority,
                health: c.health.get_health_status(service.name()),
                circuit: circuits.get(service.name()).cloned(),
            })
            .collect())
    }

    pub async fn health_statuses(&self) -> Result<BTreeMap<String, ServiceHealth>, GatewayError> {
        Ok(self.components().await?.health.get_all_health_statuses())
    }

    pub async fn health_history(&self, service: &str) -> Result<Option<Vec<ProbeResult>>, GatewayError> {
        Ok(self.components().await?.health.history(service))
    }

    /// Run one probe round now instead of waiting for the next tick.
    pub async fn probe_health(&self) -> Result<(), GatewayError> {
        self.components().await?.health.probe_all().await;
        Ok(())
    }

    pub async fn circuit_states(&self) -> Result<Vec<CircuitBreakerState>, GatewayError> {
        Ok(self.components().await?.circuits.snapshots())
    }

    pub async fn usage(&self, tenant_id: &str) -> Result<UsageRecord, GatewayError> {
        self.components().await?.usage.load_full().usage(tenant_id).await
    }

    pub async fn event_stats(&self) -> Result<EventStats, GatewayError> {
        Ok(self.components().await?.events.stats())
    }

    pub fn status(&self) -> GatewayStatus {
        let config = self.config.load();
        let (in_flight, max_concurrent) = match self.components.get() {
            Some(c) => (c.admission.in_flight(), c.admission.max_concurrent()),
            None => (0, config.admission.max_concurrent),
        };
        GatewayStatus {
            version: env!("CARGO_PKG_VERSION"),
            status: if self.is_shutting_down() {
                "shutting_down"
            } else {
                "operational"
            },
            services: config.services.len(),
            in_flight: if self.is_shutting_down() { 0 } else { in_flight },
            max_concurrent,
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}

fn check_config(config: &GatewayConfig) -> Result<(), GatewayError> {
    validate_config(config).map_err(|errors| {
        let joined = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        GatewayError::Configuration(joined)
    })
}

fn enabled_candidates<'a>(
    registry: &'a ServiceRegistry,
    request: &OrchestrationRequest,
) -> Result<Vec<&'a Arc<RegisteredService>>, GatewayError> {
    let candidates = registry.candidates(&request.service_type);
    if candidates.is_empty() {
        return Err(GatewayError::Configuration(format!(
            "no service configured for type '{}'",
            request.service_type
        )));
    }

    let enabled: Vec<_> = candidates.iter().filter(|s| s.config.enabled).collect();
    if enabled.is_empty() {
        return Err(GatewayError::Configuration(format!(
            "every service for type '{}' is disabled",
            request.service_type
        )));
    }
    Ok(enabled)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "orchestration panicked".to_string()
    }
}
