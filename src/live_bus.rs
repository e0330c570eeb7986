use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::types::LiveEvent;

const SUBSCRIBER_QUEUE_DEPTH: usize = 64;

/// Best-effort fan-out to dashboard subscribers. Each subscriber gets a
/// bounded queue; a subscriber that can't keep up is dropped rather than
/// allowed to apply backpressure to the ingest path or to accumulate an
/// unbounded backlog. There is no replay — a subscriber only sees events
/// published after it connects.
#[derive(Clone)]
pub struct LiveBus {
    subscribers: std::sync::Arc<DashMap<Uuid, mpsc::Sender<LiveEvent>>>,
}

impl LiveBus {
    pub fn new() -> Self {
        Self {
            subscribers: std::sync::Arc::new(DashMap::new()),
        }
    }

    pub fn subscribe(&self) -> (Uuid, mpsc::Receiver<LiveEvent>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);
        self.subscribers.insert(id, tx);
        (id, rx)
    }

    pub fn unsubscribe(&self, id: Uuid) {
        self.subscribers.remove(&id);
    }

    /// Publishes to every current subscriber. Subscribers whose queue is
    /// full are dropped immediately rather than awaited on, keeping
    /// publish non-blocking for the ingest handler that calls it.
    pub fn publish(&self, event: LiveEvent) {
        let mut dead = Vec::new();
        for entry in self.subscribers.iter() {
            if entry.value().try_send(event.clone()).is_err() {
                dead.push(*entry.key());
            }
        }
        for id in dead {
            self.subscribers.remove(&id);
            debug!(subscriber = %id, "dropped live bus subscriber: queue full or closed");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Default for LiveBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> LiveEvent {
        LiveEvent::RequestLog {
            id: 1,
            api_id: 1,
            ts: 0.0,
            method: "GET".into(),
            endpoint: "/v1/widgets".into(),
            client_ip: "10.0.0.1".into(),
            status_code: Some(200),
            is_suspicious: false,
            risk_score: 0.0,
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = LiveBus::new();
        let (_, mut rx) = bus.subscribe();
        bus.publish(event());
        let received = rx.recv().await;
        assert!(received.is_some());
    }

    #[tokio::test]
    async fn unsubscribe_removes_subscriber() {
        let bus = LiveBus::new();
        let (id, _rx) = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        bus.unsubscribe(id);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn full_queue_drops_subscriber_without_blocking() {
        let bus = LiveBus::new();
        let (_, _rx) = bus.subscribe();
        for _ in 0..(SUBSCRIBER_QUEUE_DEPTH + 10) {
            bus.publish(event());
        }
        assert_eq!(bus.subscriber_count(), 0);
    }
}
