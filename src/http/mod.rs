//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layers)
//!     → request.rs (assign request ID, read correlation headers)
//!     → orchestrator (admission, checks, dispatch)
//!     → response.rs (error code → HTTP status)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{X_REQUEST_ID, X_SESSION_ID, X_TENANT_ID};
pub use response::{status_for, ApiError};
pub use server::{AppState, HttpServer, OrchestrateBody};
