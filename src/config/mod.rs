//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → Orchestrator builds its ServiceRegistry from it
//!
//! On reload:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → Orchestrator::reload swaps the registry atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Circuit breaker settings resolve per service once, at registry build

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, AdmissionConfig, CircuitBreakerSettings, DispatchConfig, EventsConfig,
    GatewayConfig, HealthCheckConfig, ListenerConfig, LogFormat, ObservabilityConfig,
    PeriodKind, QuotaConfig, RecordMode, ServiceConfig, ShutdownConfig, StoreFailurePolicy,
    TierConfig,
};
pub use validation::{validate_config, ValidationError};
