//! Gateway event publication.
//!
//! # Data Flow
//! ```text
//! Orchestrator / HealthMonitor
//!     → bus.rs publish (try_send, never blocks a request)
//!     → bounded mpsc channel
//!     → consumer task
//!     → subscriber.rs (LogSubscriber or a custom sink)
//! ```
//!
//! # Design Decisions
//! - A full or closed channel drops the event and counts it
//! - One consumer task; subscriber latency never reaches request latency
//! - Close drains queued events within a grace period

pub mod bus;
pub mod event;
pub mod subscriber;

pub use bus::{EventBus, EventStats};
pub use event::{EventRecord, GatewayEvent};
pub use subscriber::{EventSubscriber, LogSubscriber};
