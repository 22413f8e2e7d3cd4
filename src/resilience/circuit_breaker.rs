//! Circuit breaker for guard service protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: service assumed down, requests fail fast
//! - Half-Open: testing if service recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failure_count >= threshold
//! Open → Half-Open: first can_execute() after recovery timeout
//! Half-Open → Closed: trial request succeeds
//! Half-Open → Open: trial request fails
//! ```
//!
//! # Design Decisions
//! - Per-service circuit breaker (not global), each behind its own mutex
//! - Fail fast in Open state (no waiting for timeout)
//! - The breaker admits any number of Half-Open calls; limiting them to one
//!   trial is done by [`crate::resilience::CircuitRegistry`]
//! - `tokio::time::Instant` so paused-clock tests drive recovery

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::CircuitBreakerSettings;
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        })
    }
}

/// A state change worth publishing. Open to Half-Open is only logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitTransition {
    Opened { failure_count: u32 },
    Closed,
}

/// Point-in-time view of one breaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitBreakerState {
    pub service_name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    #[serde(skip)]
    pub opened_at: Option<Instant>,
    /// Time since the breaker last opened, while not closed.
    pub open_for_ms: Option<u64>,
    pub threshold: u32,
    pub recovery_timeout_secs: u64,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
}

/// Per-service failure/recovery state machine.
#[derive(Debug)]
pub struct CircuitBreaker {
    service_name: String,
    threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(service_name: impl Into<String>, settings: CircuitBreakerSettings) -> Self {
        Self {
            service_name: service_name.into(),
            threshold: settings.failure_threshold.max(1),
            recovery_timeout: settings.recovery_timeout(),
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                opened_at: None,
            }),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn settings(&self) -> CircuitBreakerSettings {
        CircuitBreakerSettings {
            failure_threshold: self.threshold,
            recovery_timeout_secs: self.recovery_timeout.as_secs(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // State stays consistent across a panic; every update is a plain assignment.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a call may proceed. Moves Open to Half-Open once the
    /// recovery timeout has elapsed.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed >= self.recovery_timeout {
                    inner.state = CircuitState::HalfOpen;
                    drop(inner);
                    tracing::info!(service = %self.service_name, "Circuit half-open, admitting trial");
                    metrics::record_circuit_state(&self.service_name, CircuitState::HalfOpen);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) -> Option<CircuitTransition> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
                None
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
                inner.opened_at = None;
                drop(inner);
                tracing::info!(service = %self.service_name, "Circuit closed");
                metrics::record_circuit_state(&self.service_name, CircuitState::Closed);
                Some(CircuitTransition::Closed)
            }
            // Late success from a call admitted before the breaker opened.
            CircuitState::Open => None,
        }
    }

    pub fn record_failure(&self) -> Option<CircuitTransition> {
        let mut inner = self.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);

        let reopen = match inner.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => inner.failure_count >= self.threshold,
            CircuitState::Open => false,
        };
        if !reopen {
            return None;
        }

        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        let failure_count = inner.failure_count;
        drop(inner);

        tracing::warn!(
            service = %self.service_name,
            failure_count,
            recovery_timeout_secs = self.recovery_timeout.as_secs(),
            "Circuit opened"
        );
        metrics::record_circuit_state(&self.service_name, CircuitState::Open);
        Some(CircuitTransition::Opened { failure_count })
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    pub fn snapshot(&self) -> CircuitBreakerState {
        let inner = self.lock();
        CircuitBreakerState {
            service_name: self.service_name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            opened_at: inner.opened_at,
            open_for_ms: match inner.state {
                CircuitState::Closed => None,
                _ => inner.opened_at.map(|at| at.elapsed().as_millis() as u64),
            },
            threshold: self.threshold,
            recovery_timeout_secs: self.recovery_timeout.as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, recovery_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "alpha",
            CircuitBreakerSettings {
                failure_threshold: threshold,
                recovery_timeout_secs: recovery_secs,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold_and_recovers() {
        let cb = breaker(3, 5);

        assert_eq!(cb.record_failure(), None);
        assert_eq!(cb.record_failure(), None);
        assert_eq!(
            cb.record_failure(),
            Some(CircuitTransition::Opened { failure_count: 3 })
        );
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.can_execute());

        tokio::time::advance(Duration::from_millis(4_999)).await;
        assert!(!cb.can_execute());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(cb.can_execute());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        assert_eq!(cb.record_success(), Some(CircuitTransition::Closed));
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_and_refreshes_timer() {
        let cb = breaker(2, 10);
        cb.record_failure();
        cb.record_failure();
        let first_open = cb.snapshot().opened_at.unwrap();

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(cb.can_execute());

        assert!(matches!(
            cb.record_failure(),
            Some(CircuitTransition::Opened { .. })
        ));
        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Open);
        assert!(snapshot.opened_at.unwrap() > first_open);
        assert!(!cb.can_execute());
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let cb = breaker(3, 60);
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.record_success(), None);
        assert_eq!(cb.failure_count(), 0);

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_late_outcomes_while_open_do_not_transition() {
        let cb = breaker(1, 60);
        assert!(cb.record_failure().is_some());
        assert_eq!(cb.record_failure(), None);
        assert_eq!(cb.record_success(), None);
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_snapshot_serializes() {
        let cb = breaker(5, 60);
        let value = serde_json::to_value(cb.snapshot()).unwrap();
        assert_eq!(value["state"], "closed");
        assert_eq!(value["threshold"], 5);
        assert!(value.get("opened_at").is_none());
    }
}
