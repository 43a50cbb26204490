//! Event subscriber that writes every sync event to the log.
//!
//! Registered on the bus before the engine starts so the log carries the
//! same stream the presentation layer sees, whether or not an observer
//! client is attached.

use railsync_core::bus::EventSubscriber;
use railsync_types::SyncEvent;
use tracing::{info, warn};

/// Logs sync events at `info` (errors at `warn`), numbered in delivery
/// order.
#[derive(Debug, Default)]
pub struct LogSubscriber {
    delivered: u64,
}

impl LogSubscriber {
    /// Create a subscriber.
    pub const fn new() -> Self {
        Self { delivered: 0 }
    }
}

impl EventSubscriber for LogSubscriber {
    fn on_event(&mut self, event: &SyncEvent) {
        self.delivered = self.delivered.saturating_add(1);
        let seq = self.delivered;
        match event {
            SyncEvent::ConnectionStatusChanged { connected, message } => {
                info!(seq, connected, message = %message, "Connection status changed");
            }
            SyncEvent::SignalStateChanged { id, state } => {
                info!(seq, signal_id = %id, state = %state, "Signal state changed");
            }
            SyncEvent::TrainPositionChanged { id, position } => {
                info!(seq, train_id = %id, position = %position, "Train position changed");
            }
            SyncEvent::ErrorOccurred { message } => {
                warn!(seq, message = %message, "Sync error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use railsync_types::EntityId;

    use super::*;

    #[test]
    fn counts_every_event_kind() {
        let mut subscriber = LogSubscriber::new();
        subscriber.on_event(&SyncEvent::ConnectionStatusChanged {
            connected: true,
            message: "Connected to PostgreSQL".to_owned(),
        });
        subscriber.on_event(&SyncEvent::SignalStateChanged {
            id: EntityId(1),
            state: "RED".to_owned(),
        });
        subscriber.on_event(&SyncEvent::TrainPositionChanged {
            id: EntityId(1),
            position: "Platform A".to_owned(),
        });
        subscriber.on_event(&SyncEvent::ErrorOccurred {
            message: "No train found with ID 9".to_owned(),
        });
        assert_eq!(subscriber.delivered, 4);
    }
}
