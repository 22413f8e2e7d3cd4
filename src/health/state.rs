//! Service health state and probe history.
//!
//! # States
//! - Unknown: not probed yet; treated as available
//! - Healthy: 2xx within the latency budget
//! - Degraded: 2xx over the latency budget; still receives traffic
//! - Unhealthy: non-2xx, timeout or connection error; excluded
//!
//! # Design Decisions
//! - Every probe result replaces the status outright; staleness is bounded
//!   by the probe interval
//! - History is a fixed-capacity ring buffer, oldest entries discarded
//! - Locks are held only for plain reads and writes, never across an await

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Whether requests may be routed to a service in this state.
    pub fn is_available(self) -> bool {
        !matches!(self, HealthStatus::Unhealthy)
    }
}

/// Classify a completed probe.
pub fn classify_probe(status_code: u16, latency: Duration, latency_budget: Duration) -> HealthStatus {
    if !(200..300).contains(&status_code) {
        HealthStatus::Unhealthy
    } else if latency > latency_budget {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

/// The outcome of one health probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub status: HealthStatus,
    pub checked_at: DateTime<Utc>,
    pub response_time_ms: Option<u64>,
    pub http_status: Option<u16>,
    pub error: Option<String>,
}

/// Cached health of one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub service_name: String,
    pub status: HealthStatus,
    pub last_check_time: Option<DateTime<Utc>>,
    pub last_response_time_ms: Option<u64>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
}

impl ServiceHealth {
    pub fn unknown(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            status: HealthStatus::Unknown,
            last_check_time: None,
            last_response_time_ms: None,
            last_error: None,
            consecutive_failures: 0,
        }
    }
}

/// Health cache entry plus recent history for one service.
#[derive(Debug)]
pub struct HealthSlot {
    health: RwLock<ServiceHealth>,
    history: Mutex<VecDeque<ProbeResult>>,
    capacity: usize,
}

impl HealthSlot {
    pub fn new(service_name: &str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            health: RwLock::new(ServiceHealth::unknown(service_name)),
            history: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn status(&self) -> HealthStatus {
        self.health
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .status
    }

    pub fn health(&self) -> ServiceHealth {
        self.health
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply a probe result. Returns the previous status if it changed.
    pub fn apply(&self, result: ProbeResult) -> Option<HealthStatus> {
        let previous = {
            let mut health = self.health.write().unwrap_or_else(PoisonError::into_inner);
            let previous = health.status;
            health.status = result.status;
            health.last_check_time = Some(result.checked_at);
            health.last_response_time_ms = result.response_time_ms;
            health.last_error = result.error.clone();
            health.consecutive_failures = match result.status {
                HealthStatus::Unhealthy => health.consecutive_failures.saturating_add(1),
                _ => 0,
            };
            previous
        };

        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        if history.len() == self.capacity {
            history.pop_front();
        }
        history.push_back(result.clone());
        drop(history);

        (previous != result.status).then_some(previous)
    }

    /// Recent results, oldest first.
    pub fn history(&self) -> Vec<ProbeResult> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}
