//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (monitor.rs):
//!     Periodic timer
//!     → Probe each enabled service concurrently
//!     → Classify (healthy / degraded / unhealthy)
//!     → Update state.rs, publish HealthChanged
//!
//! Request path:
//!     Orchestrator → is_service_healthy(name) → cached read only
//! ```
//!
//! # Design Decisions
//! - Health is advisory and eventually consistent
//! - Health state is per-service, each behind its own lock
//! - Degraded services still receive traffic

pub mod monitor;
pub mod state;

pub use monitor::HealthMonitor;
pub use state::{classify_probe, HealthSlot, HealthStatus, ProbeResult, ServiceHealth};
