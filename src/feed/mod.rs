//! Streaming market-data feed: a single reconnecting session and the
//! listeners it reports to.

pub mod backoff;
pub mod manager;

pub use manager::{ConnectionSnapshot, ConnectionState, FeedHandle};

use crate::api::binance::ws::StreamMessage;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// Session health flipped
    StatusChanged(bool),
    /// One successfully parsed inbound frame
    MessageReceived(StreamMessage),
    /// Automatic reconnection stopped; only a manual `connect`/`reconnect` resumes
    ReconnectAbandoned { attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Default)]
struct Subscribers {
    next_id: u64,
    senders: HashMap<SubscriptionId, mpsc::UnboundedSender<FeedEvent>>,
}

/// Registry of feed listeners. Each listener gets every event in order.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<Subscribers>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<FeedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subs = self.lock();
        let id = SubscriptionId(subs.next_id);
        subs.next_id += 1;
        subs.senders.insert(id, tx);
        (id, rx)
    }

    /// Returns false if `id` was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.lock().senders.remove(&id).is_some()
    }

    /// Deliver to every listener, forgetting the ones whose receiver is gone.
    pub fn publish(&self, event: FeedEvent) {
        self.lock()
            .senders
            .retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    /// Drop every listener; their receivers observe end-of-stream.
    pub fn clear(&self) {
        self.lock().senders.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().senders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_listener_sees_every_event() {
        let bus = EventBus::new();
        let (_, mut a) = bus.subscribe();
        let (_, mut b) = bus.subscribe();

        bus.publish(FeedEvent::StatusChanged(true));

        assert!(matches!(a.recv().await, Some(FeedEvent::StatusChanged(true))));
        assert!(matches!(b.recv().await, Some(FeedEvent::StatusChanged(true))));
    }

    #[tokio::test]
    async fn unsubscribe_and_clear_close_receivers() {
        let bus = EventBus::new();
        let (a_id, mut a) = bus.subscribe();
        let (_, mut b) = bus.subscribe();

        assert!(bus.unsubscribe(a_id));
        assert!(!bus.unsubscribe(a_id));
        assert!(a.recv().await.is_none());

        bus.clear();
        assert_eq!(bus.subscriber_count(), 0);
        assert!(b.recv().await.is_none());
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let bus = EventBus::new();
        let (_, rx) = bus.subscribe();
        drop(rx);
        bus.publish(FeedEvent::StatusChanged(false));
        assert_eq!(bus.subscriber_count(), 0);
    }
}
