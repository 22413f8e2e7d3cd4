//! Usage counter storage.
//!
//! # Design Decisions
//! - The store owns atomicity: one `increment_and_get` per call, never a
//!   read followed by a write in the tracker
//! - Entries carry their own expiry (end of billing period); expired
//!   entries read as zero, so no sweep is required for correctness
//! - Increments sweep expired entries at most once per sweep interval, so
//!   finished periods do not accumulate

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;

const DEFAULT_SWEEP_INTERVAL_SECS: i64 = 60;

/// Shared counter store keyed by (tenant, period).
#[async_trait]
pub trait QuotaStore: Send + Sync + 'static {
    /// Atomically add one and return the new count.
    async fn increment_and_get(
        &self,
        tenant_id: &str,
        period_key: &str,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<u64>;

    /// Current count, zero if absent or expired.
    async fn get_count(&self, tenant_id: &str, period_key: &str) -> anyhow::Result<u64>;
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u64,
    expires_at: DateTime<Utc>,
}

/// Process-local store for single-instance deployments and tests.
#[derive(Debug)]
pub struct InMemoryQuotaStore {
    counters: DashMap<(String, String), Counter>,
    sweep_interval: TimeDelta,
    /// Unix second at or after which the next increment sweeps.
    next_sweep: AtomicI64,
}

impl Default for InMemoryQuotaStore {
    fn default() -> Self {
        Self::with_sweep_interval(TimeDelta::seconds(DEFAULT_SWEEP_INTERVAL_SECS))
    }
}

impl InMemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sweep_interval(sweep_interval: TimeDelta) -> Self {
        Self {
            counters: DashMap::new(),
            sweep_interval,
            next_sweep: AtomicI64::new(0),
        }
    }

    /// Purge expired entries if the sweep interval has elapsed. Only one
    /// caller wins each interval.
    fn maybe_sweep(&self, now: DateTime<Utc>) {
        let due = self.next_sweep.load(Ordering::Acquire);
        if now.timestamp() < due {
            return;
        }
        let next = now.timestamp().saturating_add(self.sweep_interval.num_seconds());
        if self
            .next_sweep
            .compare_exchange(due, next, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let purged = self.purge_expired(now);
        if purged > 0 {
            tracing::debug!(purged, remaining = self.counters.len(), "Purged expired quota counters");
        }
    }

    /// Drop entries whose period has ended. Returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.counters.len();
        self.counters.retain(|_, counter| counter.expires_at > now);
        before - self.counters.len()
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

#[async_trait]
impl QuotaStore for InMemoryQuotaStore {
    async fn increment_and_get(
        &self,
        tenant_id: &str,
        period_key: &str,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        let now = Utc::now();
        self.maybe_sweep(now);

        let mut entry = self
            .counters
            .entry((tenant_id.to_string(), period_key.to_string()))
            .or_insert(Counter { count: 0, expires_at });

        if entry.expires_at <= now {
            *entry = Counter { count: 0, expires_at };
        }
        entry.count += 1;
        Ok(entry.count)
    }

    async fn get_count(&self, tenant_id: &str, period_key: &str) -> anyhow::Result<u64> {
        let now = Utc::now();
        Ok(self
            .counters
            .get(&(tenant_id.to_string(), period_key.to_string()))
            .filter(|counter| counter.expires_at > now)
            .map(|counter| counter.count)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_increments_sweep_finished_periods() {
        let store = InMemoryQuotaStore::with_sweep_interval(TimeDelta::zero());
        let now = Utc::now();

        store
            .increment_and_get("t1", "2026-01", now - TimeDelta::hours(1))
            .await
            .unwrap();
        store
            .increment_and_get("t2", "2026-01", now - TimeDelta::hours(1))
            .await
            .unwrap();
        assert_eq!(store.len(), 1);

        store
            .increment_and_get("t1", "2026-02", now + TimeDelta::hours(1))
            .await
            .unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get_count("t1", "2026-02").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sweep_waits_for_interval() {
        let store = InMemoryQuotaStore::new();
        let now = Utc::now();

        // The first increment claims this interval's sweep.
        store
            .increment_and_get("t1", "old", now - TimeDelta::hours(1))
            .await
            .unwrap();
        store
            .increment_and_get("t2", "new", now + TimeDelta::hours(1))
            .await
            .unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.purge_expired(Utc::now()), 1);
    }

    #[tokio::test]
    async fn test_increment_is_per_tenant_and_period() {
        let store = InMemoryQuotaStore::new();
        let expires = Utc::now() + TimeDelta::hours(1);

        assert_eq!(store.increment_and_get("t1", "2026-10", expires).await.unwrap(), 1);
        assert_eq!(store.increment_and_get("t1", "2026-10", expires).await.unwrap(), 2);
        assert_eq!(store.increment_and_get("t1", "2026-11", expires).await.unwrap(), 1);
        assert_eq!(store.increment_and_get("t2", "2026-10", expires).await.unwrap(), 1);
        assert_eq!(store.get_count("t1", "2026-10").await.unwrap(), 2);
        assert_eq!(store.get_count("t3", "2026-10").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expired_entries_read_as_zero() {
        let store = InMemoryQuotaStore::new();
        let past = Utc::now() - TimeDelta::seconds(1);
        store.increment_and_get("t1", "old", past).await.unwrap();

        assert_eq!(store.get_count("t1", "old").await.unwrap(), 0);
        let future = Utc::now() + TimeDelta::hours(1);
        assert_eq!(store.increment_and_get("t1", "old", future).await.unwrap(), 1);

        store.increment_and_get("t2", "gone", past).await.unwrap();
        assert_eq!(store.purge_expired(Utc::now()), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_atomic() {
        let store = Arc::new(InMemoryQuotaStore::new());
        let expires = Utc::now() + TimeDelta::hours(1);

        let tasks: Vec<_> = (0..500)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.increment_and_get("t1", "p", expires).await.unwrap() })
            })
            .collect();

        let mut seen = Vec::new();
        for task in tasks {
            seen.push(task.await.unwrap());
        }
        seen.sort_unstable();
        assert_eq!(seen, (1..=500).collect::<Vec<u64>>());
    }
}
