//! Broadcast channel for cycle outcomes.
//!
//! [`EventBus`] wraps a [`tokio::sync::broadcast`] channel. The cycle runner
//! publishes a [`CycleEvent`] after every cycle; remote sync subscribes to
//! learn which cycles to push.

use tokio::sync::broadcast;

use super::CycleEvent;

/// Broadcast bus for [`CycleEvent`]s.
///
/// When the ring buffer is full the oldest events are dropped for lagging
/// receivers. Receivers treat a lag as "re-read from the store", never as
/// data loss, because the store is the source of truth.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CycleEvent>,
}

impl EventBus {
    /// Creates a new `EventBus` with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of receivers that received the event. Without
    /// receivers the event is dropped.
    pub fn publish(&self, event: CycleEvent) -> usize {
        let event_type = event.event_type_str();
        let pool_id = event.pool_id().clone();
        let delivered = self.sender.send(event).unwrap_or(0);
        tracing::debug!(%pool_id, event_type, delivered, "cycle event published");
        delivered
    }

    /// Creates a new receiver that will receive all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CycleEvent> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{CycleId, PoolId};
    use chrono::Utc;

    fn committed(pool: &str) -> CycleEvent {
        let Ok(pool_id) = PoolId::new(pool) else {
            panic!("valid id");
        };
        CycleEvent::CycleCommitted {
            pool_id,
            cycle_id: CycleId::new(),
            workers: 2,
            daily_earnings: 1,
            anomalies: 0,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn publish_without_receivers_returns_zero() {
        let bus = EventBus::new(16);
        assert_eq!(bus.publish(committed("kz-01")), 0);
    }

    #[tokio::test]
    async fn every_subscriber_sees_the_event() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.publish(committed("kz-02")), 2);

        let Ok(e1) = rx1.recv().await else {
            panic!("rx1 failed");
        };
        let Ok(e2) = rx2.recv().await else {
            panic!("rx2 failed");
        };
        assert_eq!(e1.pool_id(), e2.pool_id());
        assert_eq!(e1.pool_id().as_str(), "kz-02");
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let bus = EventBus::new(0);
        let _rx = bus.subscribe();
        assert_eq!(bus.publish(committed("kz-03")), 1);
    }

    #[test]
    fn receiver_count_tracks_subscribers() {
        let bus = EventBus::new(16);
        let rx1 = bus.subscribe();
        let _rx2 = bus.subscribe();
        assert_eq!(bus.receiver_count(), 2);
        drop(rx1);
        assert_eq!(bus.receiver_count(), 1);
    }
}
