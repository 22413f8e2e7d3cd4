//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! OrchestrationRequest + chosen ServiceConfig
//!     → payload.rs (validate, map to service schema, inject ids)
//!     → endpoints.rs (dispatch path for the service type)
//!     → router.rs (size check, POST under deadline, classify)
//!     → Return: DispatchOutcome or GatewayError
//!
//! Registry Compilation (at startup and on reload):
//!     ServiceConfig[]
//!     → Resolve breaker settings
//!     → Group by service type, sort by priority
//!     → Freeze as immutable ServiceRegistry
//! ```
//!
//! # Design Decisions
//! - Registry compiled from config, immutable at runtime
//! - Deterministic: same type always yields the same candidate order
//! - Router holds no per-service state; health and circuits live elsewhere

pub mod endpoints;
pub mod payload;
pub mod registry;
pub mod router;
pub mod service_type;

pub use endpoints::{determine_endpoint, DEFAULT_DISPATCH_PATH};
pub use payload::{transform_payload, BackendPayload, GuardPayload};
pub use registry::{RegisteredService, ServiceRegistry};
pub use router::{DispatchOutcome, RequestRouter};
pub use service_type::ServiceType;
