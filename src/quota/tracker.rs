//! Per-tenant quota enforcement.
//!
//! # Responsibilities
//! - Compare a tenant's current-period count with its tier limit
//! - Increment the count once per charged call, with expiry at period end
//! - Apply the configured store failure policy to every admission check
//!
//! # Design Decisions
//! - `check_quota` never mutates; `record_usage` never reads first
//! - Check and record are separate steps, so concurrent calls for a tenant
//!   at its limit can overshoot by at most the number in flight
//! - Every store and tier call is bounded by `store_timeout_ms`

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{QuotaConfig, RecordMode, StoreFailurePolicy};
use crate::error::GatewayError;
use crate::observability::metrics;
use crate::quota::period::BillingPeriod;
use crate::quota::store::QuotaStore;
use crate::quota::tiers::{TierLimit, TierProvider};

const UNMETERED_TIER: &str = "unmetered";

/// Current-period usage of one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageRecord {
    pub tenant_id: String,
    pub period_key: String,
    pub call_count: u64,
    pub limit: Option<u64>,
    pub tier_name: String,
    pub resets_at: DateTime<Utc>,
}

/// Result of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaCheck {
    pub tenant_id: String,
    pub tier_name: String,
    pub used: u64,
    pub limit: Option<u64>,
    /// The store was unreachable and the call was let through (fail-open).
    pub degraded: bool,
}

impl QuotaCheck {
    pub fn allowed(&self) -> bool {
        self.limit.map_or(true, |limit| self.used < limit)
    }

    /// `Err(QuotaExceeded)` when the tenant is at or over its limit.
    pub fn into_result(self) -> Result<Self, GatewayError> {
        match self.limit {
            Some(limit) if self.used >= limit => Err(GatewayError::QuotaExceeded {
                tenant_id: self.tenant_id,
                used: self.used,
                limit,
            }),
            _ => Ok(self),
        }
    }
}

pub struct UsageTracker {
    store: Arc<dyn QuotaStore>,
    tiers: Arc<dyn TierProvider>,
    period: BillingPeriod,
    policy: StoreFailurePolicy,
    record_mode: RecordMode,
    store_timeout: Duration,
    enabled: bool,
}

impl UsageTracker {
    pub fn new(config: &QuotaConfig, store: Arc<dyn QuotaStore>, tiers: Arc<dyn TierProvider>) -> Self {
        Self {
            store,
            tiers,
            period: BillingPeriod::new(config.period),
            policy: config.store_failure_policy,
            record_mode: config.record_mode,
            store_timeout: Duration::from_millis(config.store_timeout_ms),
            enabled: config.enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn period(&self) -> BillingPeriod {
        self.period
    }

    /// Whether the tenant may make another call this period.
    ///
    /// Returns a [`QuotaCheck`] whether or not the tenant is under quota;
    /// `Err(QuotaUnavailable)` only under fail-closed when the store or tier
    /// lookup fails.
    pub async fn check_quota(&self, tenant_id: &str) -> Result<QuotaCheck, GatewayError> {
        self.check_quota_at(tenant_id, Utc::now()).await
    }

    pub async fn check_quota_at(&self, tenant_id: &str, now: DateTime<Utc>) -> Result<QuotaCheck, GatewayError> {
        if !self.enabled {
            return Ok(QuotaCheck {
                tenant_id: tenant_id.to_string(),
                tier_name: UNMETERED_TIER.to_string(),
                used: 0,
                limit: None,
                degraded: false,
            });
        }

        let looked_up = async {
            let tier = self.bounded(self.tiers.get_limit(tenant_id)).await?;
            let used = self
                .bounded(self.store.get_count(tenant_id, &self.period.period_key(now)))
                .await?;
            Ok::<_, anyhow::Error>((tier, used))
        };

        match looked_up.await {
            Ok((TierLimit { tier_name, limit }, used)) => {
                let check = QuotaCheck {
                    tenant_id: tenant_id.to_string(),
                    tier_name,
                    used,
                    limit,
                    degraded: false,
                };
                if !check.allowed() {
                    metrics::record_quota_rejection(&check.tier_name);
                }
                Ok(check)
            }
            Err(e) => {
                metrics::record_quota_store_error("check");
                match self.policy {
                    StoreFailurePolicy::FailClosed => {
                        tracing::warn!(tenant_id = %tenant_id, error = %e, "Quota store unavailable, rejecting call");
                        Err(GatewayError::QuotaUnavailable(e.to_string()))
                    }
                    StoreFailurePolicy::FailOpen => {
                        tracing::warn!(tenant_id = %tenant_id, error = %e, "Quota store unavailable, allowing call unmetered");
                        Ok(QuotaCheck {
                            tenant_id: tenant_id.to_string(),
                            tier_name: UNMETERED_TIER.to_string(),
                            used: 0,
                            limit: None,
                            degraded: true,
                        })
                    }
                }
            }
        }
    }

    /// Charge one call to the tenant.
    ///
    /// Inline mode returns the new count. Background mode spawns the
    /// increment and returns `None`, as does a failed increment.
    pub async fn record_usage(&self, tenant_id: &str) -> Option<u64> {
        self.record_usage_at(tenant_id, Utc::now()).await
    }

    pub async fn record_usage_at(&self, tenant_id: &str, now: DateTime<Utc>) -> Option<u64> {
        if !self.enabled {
            return None;
        }

        let period_key = self.period.period_key(now);
        let expires_at = self.period.period_end(now);

        match self.record_mode {
            RecordMode::Inline => {
                increment(self.store.clone(), self.store_timeout, tenant_id.to_string(), period_key, expires_at)
                    .await
            }
            RecordMode::Background => {
                tokio::spawn(increment(
                    self.store.clone(),
                    self.store_timeout,
                    tenant_id.to_string(),
                    period_key,
                    expires_at,
                ));
                None
            }
        }
    }

    /// Read-only snapshot of the tenant's current period.
    pub async fn usage(&self, tenant_id: &str) -> Result<UsageRecord, GatewayError> {
        let now = Utc::now();
        let period_key = self.period.period_key(now);

        let tier = self
            .bounded(self.tiers.get_limit(tenant_id))
            .await
            .map_err(|e| GatewayError::QuotaUnavailable(e.to_string()))?;
        let call_count = self
            .bounded(self.store.get_count(tenant_id, &period_key))
            .await
            .map_err(|e| GatewayError::QuotaUnavailable(e.to_string()))?;

        Ok(UsageRecord {
            tenant_id: tenant_id.to_string(),
            period_key,
            call_count,
            limit: tier.limit,
            tier_name: tier.tier_name,
            resets_at: self.period.period_end(now),
        })
    }

    async fn bounded<T>(&self, fut: impl Future<Output = anyhow::Result<T>>) -> anyhow::Result<T> {
        with_deadline(self.store_timeout, fut).await
    }
}

async fn with_deadline<T>(deadline: Duration, fut: impl Future<Output = anyhow::Result<T>>) -> anyhow::Result<T> {
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!(
            "quota store did not answer within {}ms",
            deadline.as_millis()
        )),
    }
}

async fn increment(
    store: Arc<dyn QuotaStore>,
    deadline: Duration,
    tenant_id: String,
    period_key: String,
    expires_at: DateTime<Utc>,
) -> Option<u64> {
    match with_deadline(deadline, store.increment_and_get(&tenant_id, &period_key, expires_at)).await {
        Ok(count) => Some(count),
        Err(e) => {
            metrics::record_quota_store_error("record");
            tracing::warn!(
                tenant_id = %tenant_id,
                period = %period_key,
                error = %e,
                "Failed to record usage"
            );
            None
        }
    }
}
