//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to guard service:
//!     → circuits.rs (look up breaker, admit or fail fast, single Half-Open trial)
//!     → [router dispatches under its deadline]
//!     → circuit_breaker.rs (record outcome, open/close on threshold)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - No retries in this layer; retrying is the caller's decision
//! - Circuit breaker prevents cascading failures

pub mod circuit_breaker;
pub mod circuits;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerState, CircuitState, CircuitTransition};
pub use circuits::{CircuitPermit, CircuitRegistry};
