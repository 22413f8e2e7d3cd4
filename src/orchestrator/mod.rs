//! Orchestration subsystem.
//!
//! # Data Flow
//! ```text
//! OrchestrationRequest
//!     → admission.rs (bounded concurrency gate)
//!     → engine.rs stages, first failure wins:
//!         1. service configured and enabled
//!         2. tenant under quota
//!         3. cached health
//!         4. circuit admits
//!         5. router dispatches
//!     → outcome feeds breaker, usage, events
//!     → OrchestrationResponse (types.rs)
//! ```
//!
//! # Design Decisions
//! - Checks that fail before dispatch never charge the tenant
//! - Calls that reached the backend are charged even when they fail
//! - Every path ends in the same response shape

pub mod admission;
pub mod engine;
pub mod types;

pub use admission::{AdmissionGate, AdmissionPermit};
pub use engine::{Orchestrator, OrchestratorBuilder};
pub use types::{GatewayStatus, OrchestrationRequest, OrchestrationResponse, ServiceStatus};
