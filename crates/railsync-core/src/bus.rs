//! Outbound event delivery.
//!
//! The [`NotificationBus`] hands every [`SyncEvent`] to each registered
//! [`EventSubscriber`] synchronously, in registration order, and then to a
//! broadcast channel for async consumers such as the observer server.
//!
//! There is no buffering or replay. A subscriber that attaches late only
//! sees events published after it attached; the full resync that follows
//! every connect gives it a complete picture on the next poll cycle.

use railsync_types::{ChangeEvent, SyncEvent};
use tokio::sync::broadcast;
use tracing::trace;

/// Capacity of the broadcast channel.
///
/// A receiver that falls behind by more than this many events gets
/// [`broadcast::error::RecvError::Lagged`] and skips to the newest event.
pub const BROADCAST_CAPACITY: usize = 256;

/// Receives events synchronously on the engine task.
///
/// Implementations must return quickly: the engine does not poll, write,
/// or health-check while a subscriber is running.
pub trait EventSubscriber: Send {
    /// Called once per published event.
    fn on_event(&mut self, event: &SyncEvent);
}

/// Fan-out of sync events to subscribers and broadcast receivers.
pub struct NotificationBus {
    subscribers: Vec<Box<dyn EventSubscriber>>,
    tx: broadcast::Sender<SyncEvent>,
}

impl NotificationBus {
    /// Create a bus with no subscribers.
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            subscribers: Vec::new(),
            tx,
        }
    }

    /// Register a synchronous subscriber.
    pub fn add_subscriber(&mut self, subscriber: Box<dyn EventSubscriber>) {
        self.subscribers.push(subscriber);
    }

    /// Attach an async receiver. It sees only events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// A clone of the broadcast sender, for handing out more receivers.
    pub fn sender(&self) -> broadcast::Sender<SyncEvent> {
        self.tx.clone()
    }

    /// Publish a detected change.
    pub fn publish_change(&mut self, change: ChangeEvent) {
        self.publish(change.into_sync_event());
    }

    /// Publish a connection status transition.
    pub fn publish_status(&mut self, connected: bool, message: impl Into<String>) {
        self.publish(SyncEvent::ConnectionStatusChanged {
            connected,
            message: message.into(),
        });
    }

    /// Publish a recoverable error.
    pub fn publish_error(&mut self, message: impl Into<String>) {
        self.publish(SyncEvent::ErrorOccurred {
            message: message.into(),
        });
    }

    fn publish(&mut self, event: SyncEvent) {
        for subscriber in &mut self.subscribers {
            subscriber.on_event(&event);
        }
        // Zero receivers is fine: nobody is listening yet.
        let receivers = self.tx.send(event).unwrap_or(0);
        trace!(
            subscribers = self.subscribers.len(),
            receivers, "Event published"
        );
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NotificationBus")
            .field("subscribers", &self.subscribers.len())
            .field("receivers", &self.tx.receiver_count())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use railsync_types::{Collection, EntityId};

    use super::*;

    /// Copies every event into a shared log.
    struct Recorder(Arc<Mutex<Vec<SyncEvent>>>);

    impl EventSubscriber for Recorder {
        fn on_event(&mut self, event: &SyncEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    fn recorder() -> (Box<dyn EventSubscriber>, Arc<Mutex<Vec<SyncEvent>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        (Box::new(Recorder(Arc::clone(&log))), log)
    }

    #[test]
    fn subscribers_receive_events_in_publish_order() {
        let mut bus = NotificationBus::new();
        let (sub, log) = recorder();
        bus.add_subscriber(sub);

        bus.publish_status(true, "Connected to memory store");
        bus.publish_change(ChangeEvent {
            collection: Collection::Signals,
            entity_id: EntityId(1),
            value: "RED".to_owned(),
        });
        bus.publish_error("No signal found with ID 9999");

        let log = log.lock().unwrap();
        assert_eq!(
            *log,
            vec![
                SyncEvent::ConnectionStatusChanged {
                    connected: true,
                    message: "Connected to memory store".to_owned(),
                },
                SyncEvent::SignalStateChanged {
                    id: EntityId(1),
                    state: "RED".to_owned(),
                },
                SyncEvent::ErrorOccurred {
                    message: "No signal found with ID 9999".to_owned(),
                },
            ]
        );
    }

    #[test]
    fn publishing_without_receivers_is_harmless() {
        let mut bus = NotificationBus::new();
        bus.publish_error("nobody listening");
        bus.publish_status(false, "Disconnected");
    }

    #[test]
    fn late_subscriber_misses_earlier_events() {
        let mut bus = NotificationBus::new();
        bus.publish_error("before");

        let (sub, log) = recorder();
        bus.add_subscriber(sub);
        let mut rx = bus.subscribe();
        bus.publish_error("after");

        assert_eq!(log.lock().unwrap().len(), 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            SyncEvent::ErrorOccurred {
                message: "after".to_owned()
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn every_subscriber_sees_every_event() {
        let mut bus = NotificationBus::new();
        let (first, first_log) = recorder();
        let (second, second_log) = recorder();
        bus.add_subscriber(first);
        bus.add_subscriber(second);

        bus.publish_change(ChangeEvent {
            collection: Collection::Trains,
            entity_id: EntityId(2),
            value: "Junction B".to_owned(),
        });

        assert_eq!(*first_log.lock().unwrap(), *second_log.lock().unwrap());
        assert_eq!(first_log.lock().unwrap().len(), 1);
    }
}
