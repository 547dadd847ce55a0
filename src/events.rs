//! Connection lifecycle events.
//!
//! Transports publish a [`BoardEvent`] on every connection state change.
//! Subscribers receive events through a broadcast channel; publishing never
//! blocks and succeeds even when nobody listens.
//!
//! # Example
//!
//! ```rust
//! use rs_arest::events::{BoardEvent, EventBus};
//!
//! # tokio_test_block(async {
//! let bus = EventBus::new();
//! let mut rx = bus.subscribe();
//!
//! bus.publish(BoardEvent::Connected);
//! assert_eq!(rx.recv().await.unwrap(), BoardEvent::Connected);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use tokio::sync::broadcast;

/// Capacity of the event channel. Slow subscribers skip older events.
const EVENT_CAPACITY: usize = 32;

/// Connection lifecycle event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BoardEvent {
    /// The link is up and the liveness probe answered.
    Connected,
    /// The link was closed.
    Disconnected,
    /// The link was re-established and the pin state replayed.
    Reconnected,
    /// The serial watchdog saw no data within the response timeout.
    Timeout,
}

impl BoardEvent {
    /// Stable event name.
    pub const fn name(&self) -> &'static str {
        match self {
            BoardEvent::Connected => "connected",
            BoardEvent::Disconnected => "disconnected",
            BoardEvent::Reconnected => "reconnected",
            BoardEvent::Timeout => "timeout",
        }
    }

    /// Every event a transport may publish.
    pub const ALL: [BoardEvent; 4] = [
        BoardEvent::Connected,
        BoardEvent::Disconnected,
        BoardEvent::Reconnected,
        BoardEvent::Timeout,
    ];
}

impl core::fmt::Display for BoardEvent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Broadcast hub for [`BoardEvent`]s.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<BoardEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus with no subscribers.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Register a new subscriber. It only sees events published afterwards.
    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to every current subscriber.
    pub fn publish(&self, event: BoardEvent) {
        log::debug!("event: {}", event);
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names() {
        let names: Vec<_> = BoardEvent::ALL.iter().map(|e| e.name()).collect();
        assert_eq!(
            names,
            vec!["connected", "disconnected", "reconnected", "timeout"]
        );
    }

    #[test]
    fn publish_without_subscribers() {
        let bus = EventBus::new();
        bus.publish(BoardEvent::Timeout);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn subscribers_see_later_events_in_order() {
        let bus = EventBus::new();
        bus.publish(BoardEvent::Connected);

        let mut rx = bus.subscribe();
        bus.publish(BoardEvent::Disconnected);
        bus.publish(BoardEvent::Reconnected);

        assert_eq!(rx.recv().await.unwrap(), BoardEvent::Disconnected);
        assert_eq!(rx.recv().await.unwrap(), BoardEvent::Reconnected);
    }

    #[tokio::test]
    async fn clones_share_the_channel() {
        let bus = EventBus::new();
        let clone = bus.clone();
        let mut rx = bus.subscribe();

        clone.publish(BoardEvent::Timeout);
        assert_eq!(rx.recv().await.unwrap(), BoardEvent::Timeout);
    }
}
