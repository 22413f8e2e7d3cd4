//! Tenant quota subsystem.
//!
//! # Data Flow
//! ```text
//! Admission (before dispatch):
//!     tracker.rs check_quota(tenant)
//!     → tiers.rs get_limit(tenant)      (billing collaborator)
//!     → store.rs get_count(tenant, key) (shared counter store)
//!     → allowed / QuotaExceeded / QuotaUnavailable
//!
//! Charging (after the backend was reached):
//!     tracker.rs record_usage(tenant)
//!     → period.rs key + expiry
//!     → store.rs increment_and_get (atomic), inline or spawned
//! ```
//!
//! # Design Decisions
//! - Store and tier provider are traits so a shared store can replace the
//!   in-memory one in horizontally scaled deployments
//! - Fail-closed by default when the store is unreachable

pub mod period;
pub mod store;
pub mod tiers;
pub mod tracker;

pub use period::BillingPeriod;
pub use store::{InMemoryQuotaStore, QuotaStore};
pub use tiers::{StaticTierProvider, TierLimit, TierProvider};
pub use tracker::{QuotaCheck, UsageRecord, UsageTracker};
