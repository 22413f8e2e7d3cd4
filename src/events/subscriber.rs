//! Event subscribers.

use async_trait::async_trait;

use crate::events::event::{EventRecord, GatewayEvent};

/// Receives every published event from the bus consumer task.
///
/// Errors are logged and counted by the bus; they never reach the
/// request that produced the event.
#[async_trait]
pub trait EventSubscriber: Send + Sync + 'static {
    async fn on_event(&self, record: &EventRecord) -> anyhow::Result<()>;
}

/// Writes events to the tracing pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSubscriber;

#[async_trait]
impl EventSubscriber for LogSubscriber {
    async fn on_event(&self, record: &EventRecord) -> anyhow::Result<()> {
        match &record.event {
            GatewayEvent::ServiceRouted {
                request_id,
                tenant_id,
                service,
                latency_ms,
                ..
            } => tracing::info!(
                event = "service_routed",
                request_id = %request_id,
                tenant_id = %tenant_id,
                service = %service,
                latency_ms,
                "Service routed"
            ),
            GatewayEvent::ServiceFailed {
                request_id,
                tenant_id,
                service,
                error_code,
                message,
                ..
            } => tracing::warn!(
                event = "service_failed",
                request_id = %request_id,
                tenant_id = %tenant_id,
                service = service.as_deref().unwrap_or("none"),
                error_code = %error_code,
                message = %message,
                "Service failed"
            ),
            GatewayEvent::CircuitOpened {
                service,
                failure_count,
            } => tracing::warn!(event = "circuit_opened", service = %service, failure_count, "Circuit opened"),
            GatewayEvent::CircuitClosed { service } => {
                tracing::info!(event = "circuit_closed", service = %service, "Circuit closed")
            }
            GatewayEvent::QuotaExceeded {
                tenant_id,
                tier,
                used,
                limit,
            } => tracing::info!(
                event = "quota_exceeded",
                tenant_id = %tenant_id,
                tier = %tier,
                used,
                limit,
                "Quota exceeded"
            ),
            GatewayEvent::HealthChanged { service, from, to } => tracing::info!(
                event = "health_changed",
                service = %service,
                from = ?from,
                to = ?to,
                "Service health changed"
            ),
        }
        Ok(())
    }
}
