//! Subscription tier lookup.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::{QuotaConfig, TierConfig};

/// A tenant's tier and its per-period call allowance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierLimit {
    pub tier_name: String,
    /// `None` means unlimited.
    pub limit: Option<u64>,
}

/// Source of per-tenant limits, usually backed by the billing system.
#[async_trait]
pub trait TierProvider: Send + Sync + 'static {
    async fn get_limit(&self, tenant_id: &str) -> anyhow::Result<TierLimit>;
}

/// Tiers and tenant assignments from the gateway config.
#[derive(Debug, Clone)]
pub struct StaticTierProvider {
    default_tier: String,
    tiers: BTreeMap<String, TierConfig>,
    tenants: BTreeMap<String, String>,
}

impl StaticTierProvider {
    pub fn from_config(config: &QuotaConfig) -> Self {
        Self {
            default_tier: config.default_tier.clone(),
            tiers: config.tiers.clone(),
            tenants: config.tenants.clone(),
        }
    }

    fn tier_of(&self, tenant_id: &str) -> &str {
        self.tenants
            .get(tenant_id)
            .map(String::as_str)
            .unwrap_or(&self.default_tier)
    }
}

#[async_trait]
impl TierProvider for StaticTierProvider {
    async fn get_limit(&self, tenant_id: &str) -> anyhow::Result<TierLimit> {
        let tier_name = self.tier_of(tenant_id);
        let tier = self
            .tiers
            .get(tier_name)
            .ok_or_else(|| anyhow::anyhow!("tier '{tier_name}' is not defined"))?;
        Ok(TierLimit {
            tier_name: tier_name.to_string(),
            limit: tier.limit,
        })
    }
}
