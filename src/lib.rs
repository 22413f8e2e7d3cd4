//! Guard service orchestration gateway.
//!
//! Routes tenant requests to independently deployed guard services behind
//! admission control, per-service circuit breakers, cached health checks
//! and per-tenant quotas, and answers every call with one response shape.

pub mod admin;
pub mod config;
pub mod error;
pub mod events;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod orchestrator;
pub mod quota;
pub mod resilience;
pub mod routing;

pub use config::GatewayConfig;
pub use error::{ErrorKind, GatewayError};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use orchestrator::{OrchestrationRequest, OrchestrationResponse, Orchestrator};
pub use routing::ServiceType;
