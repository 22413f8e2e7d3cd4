//! Bounded concurrency gate for orchestrations.
//!
//! # Design Decisions
//! - Tokio semaphore; waiting callers queue fairly instead of spawning work
//! - Waits are bounded by `acquire_timeout_ms` and end in `Overloaded`
//! - The permit is an RAII guard, so success, failure, panic and
//!   cancellation all release the slot exactly once
//! - Draining acquires every permit, which completes only when all
//!   in-flight orchestrations have finished

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::AdmissionConfig;
use crate::error::GatewayError;
use crate::observability::metrics;

#[derive(Debug)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    acquire_timeout: Duration,
}

/// One in-flight slot.
#[derive(Debug)]
pub struct AdmissionPermit {
    permit: Option<OwnedSemaphorePermit>,
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        drop(self.permit.take());
        let in_flight = self.max_concurrent.saturating_sub(self.semaphore.available_permits());
        metrics::record_in_flight(in_flight);
    }
}

impl AdmissionGate {
    pub fn new(config: &AdmissionConfig) -> Self {
        let max_concurrent = config.max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            acquire_timeout: Duration::from_millis(config.acquire_timeout_ms),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn in_flight(&self) -> usize {
        self.max_concurrent
            .saturating_sub(self.semaphore.available_permits())
    }

    /// Wait for a slot, up to the configured bound.
    pub async fn acquire(&self) -> Result<AdmissionPermit, GatewayError> {
        let acquire = self.semaphore.clone().acquire_owned();
        let permit = match tokio::time::timeout(self.acquire_timeout, acquire).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_closed)) => return Err(GatewayError::ShuttingDown),
            Err(_) => {
                return Err(GatewayError::Overloaded(
                    self.acquire_timeout.as_millis() as u64,
                ))
            }
        };

        metrics::record_in_flight(self.in_flight());
        Ok(AdmissionPermit {
            permit: Some(permit),
            semaphore: self.semaphore.clone(),
            max_concurrent: self.max_concurrent,
        })
    }

    /// Wait for in-flight work to finish, then refuse new admissions.
    /// Returns false if the grace period ran out first.
    pub async fn drain(&self, grace: Duration) -> bool {
        let all = u32::try_from(self.max_concurrent).unwrap_or(u32::MAX);
        let drained = match tokio::time::timeout(grace, self.semaphore.acquire_many(all)).await {
            Ok(Ok(permits)) => {
                permits.forget();
                true
            }
            Ok(Err(_closed)) => true,
            Err(_) => false,
        };
        self.semaphore.close();
        drained
    }
}
