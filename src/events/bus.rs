//! Bounded event channel with a dedicated consumer task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::events::event::{EventRecord, GatewayEvent};
use crate::events::subscriber::EventSubscriber;
use crate::observability::metrics;

/// Counters exposed through the admin API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventStats {
    pub published: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub subscriber_errors: u64,
}

#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    subscriber_errors: AtomicU64,
}

#[derive(Debug)]
struct Shared {
    counters: Counters,
    stop: watch::Sender<bool>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

/// Cloneable publishing handle.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: mpsc::Sender<EventRecord>,
    shared: Arc<Shared>,
}

impl EventBus {
    /// Create the bus and spawn its consumer. Must be called inside a Tokio runtime.
    pub fn new(capacity: usize, subscriber: Arc<dyn EventSubscriber>) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (stop_tx, stop_rx) = watch::channel(false);
        let shared = Arc::new(Shared {
            counters: Counters::default(),
            stop: stop_tx,
            consumer: Mutex::new(None),
        });

        let handle = tokio::spawn(consume(rx, stop_rx, subscriber, shared.clone()));
        *shared
            .consumer
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);

        Self { tx, shared }
    }

    /// Queue an event without waiting. Returns false if it was dropped.
    pub fn publish(&self, event: GatewayEvent) -> bool {
        let name = event.name();
        match self.tx.try_send(EventRecord::now(event)) {
            Ok(()) => {
                self.shared.counters.published.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                self.shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::record_event_dropped(name);
                match e {
                    mpsc::error::TrySendError::Full(_) => {
                        tracing::warn!(event = name, "Event channel full, dropping event")
                    }
                    mpsc::error::TrySendError::Closed(_) => {
                        tracing::debug!(event = name, "Event bus closed, dropping event")
                    }
                }
                false
            }
        }
    }

    pub fn stats(&self) -> EventStats {
        let c = &self.shared.counters;
        EventStats {
            published: c.published.load(Ordering::Relaxed),
            delivered: c.delivered.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            subscriber_errors: c.subscriber_errors.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting events and deliver what is queued, bounded by `grace`.
    pub async fn close(&self, grace: Duration) {
        let _ = self.shared.stop.send(true);
        let handle = self
            .shared
            .consumer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(mut handle) = handle {
            if tokio::time::timeout(grace, &mut handle).await.is_err() {
                tracing::warn!(grace_ms = grace.as_millis() as u64, "Event consumer did not drain in time");
                handle.abort();
            }
        }
    }
}

async fn consume(
    mut rx: mpsc::Receiver<EventRecord>,
    mut stop: watch::Receiver<bool>,
    subscriber: Arc<dyn EventSubscriber>,
    shared: Arc<Shared>,
) {
    loop {
        tokio::select! {
            maybe = rx.recv() => match maybe {
                Some(record) => deliver(&*subscriber, &record, &shared.counters).await,
                None => break,
            },
            _ = stop.changed() => {
                rx.close();
                while let Some(record) = rx.recv().await {
                    deliver(&*subscriber, &record, &shared.counters).await;
                }
                break;
            }
        }
    }
    tracing::debug!("Event consumer stopped");
}

async fn deliver(subscriber: &dyn EventSubscriber, record: &EventRecord, counters: &Counters) {
    match subscriber.on_event(record).await {
        Ok(()) => {
            counters.delivered.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            counters.subscriber_errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(event = record.event.name(), error = %e, "Event subscriber failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    #[derive(Default)]
    struct Collector {
        seen: Mutex<Vec<EventRecord>>,
    }

    #[async_trait]
    impl EventSubscriber for Collector {
        async fn on_event(&self, record: &EventRecord) -> anyhow::Result<()> {
            self.seen.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    /// Blocks delivery until permits are added.
    struct Gate(Arc<Semaphore>);

    #[async_trait]
    impl EventSubscriber for Gate {
        async fn on_event(&self, _record: &EventRecord) -> anyhow::Result<()> {
            self.0.acquire().await?.forget();
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl EventSubscriber for Failing {
        async fn on_event(&self, _record: &EventRecord) -> anyhow::Result<()> {
            anyhow::bail!("sink unavailable")
        }
    }

    fn closed(service: &str) -> GatewayEvent {
        GatewayEvent::CircuitClosed {
            service: service.into(),
        }
    }

    #[tokio::test]
    async fn test_close_drains_queued_events() {
        let collector = Arc::new(Collector::default());
        let bus = EventBus::new(16, collector.clone());

        assert!(bus.publish(closed("a")));
        assert!(bus.publish(closed("b")));
        bus.close(Duration::from_secs(1)).await;

        assert_eq!(collector.seen.lock().unwrap().len(), 2);
        assert_eq!(bus.stats().delivered, 2);
        assert!(!bus.publish(closed("c")));
        assert_eq!(bus.stats().dropped, 1);
    }

    #[tokio::test]
    async fn test_full_channel_drops_with_counter() {
        let gate = Arc::new(Semaphore::new(0));
        let bus = EventBus::new(1, Arc::new(Gate(gate.clone())));

        let mut accepted = 0;
        for i in 0..10 {
            if bus.publish(closed(&i.to_string())) {
                accepted += 1;
            }
        }
        let stats = bus.stats();
        assert!(accepted <= 2, "accepted {accepted}");
        assert_eq!(stats.published + stats.dropped, 10);
        assert!(stats.dropped >= 8);

        gate.add_permits(10);
        bus.close(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_subscriber_errors_are_counted() {
        let bus = EventBus::new(4, Arc::new(Failing));
        bus.publish(closed("a"));
        bus.close(Duration::from_secs(1)).await;

        let stats = bus.stats();
        assert_eq!(stats.subscriber_errors, 1);
        assert_eq!(stats.delivered, 0);
    }
}
