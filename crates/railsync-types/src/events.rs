//! Change events and outbound notifications.
//!
//! A [`ChangeEvent`] is what the change detector produces for one entity in
//! one poll cycle. A [`SyncEvent`] is what subscribers receive: change
//! events projected into per-collection variants, plus connection status
//! and error notifications.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{Collection, ConnectionState};
use crate::ids::EntityId;

/// A detected change of an entity's observed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ChangeEvent {
    /// Collection the entity belongs to.
    pub collection: Collection,
    /// The entity that changed (or was seen for the first time).
    pub entity_id: EntityId,
    /// The newly observed value.
    pub value: String,
}

impl ChangeEvent {
    /// Project into the outbound event for this collection.
    pub fn into_sync_event(self) -> SyncEvent {
        match self.collection {
            Collection::Signals => SyncEvent::SignalStateChanged {
                id: self.entity_id,
                state: self.value,
            },
            Collection::Trains => SyncEvent::TrainPositionChanged {
                id: self.entity_id,
                position: self.value,
            },
        }
    }
}

/// Current connection state plus a human-readable status line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ConnectionStatus {
    /// Lifecycle state.
    pub state: ConnectionState,
    /// Status text, e.g. "Connected to `PostgreSQL`" or the store's error.
    pub message: String,
}

impl ConnectionStatus {
    /// Whether the state is [`ConnectionState::Connected`].
    pub fn connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            message: "Not Connected".to_owned(),
        }
    }
}

/// Event delivered to subscribers of the notification bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum SyncEvent {
    /// The connection state changed.
    ConnectionStatusChanged {
        /// Whether the store is now connected.
        connected: bool,
        /// Status text.
        message: String,
    },
    /// A signal's state was observed for the first time or changed.
    SignalStateChanged {
        /// Signal id.
        id: EntityId,
        /// New state text.
        state: String,
    },
    /// A train's position was observed for the first time or changed.
    TrainPositionChanged {
        /// Train id.
        id: EntityId,
        /// New position text.
        position: String,
    },
    /// A recoverable error occurred.
    ErrorOccurred {
        /// Error text.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_event_projects_per_collection() {
        let signal = ChangeEvent {
            collection: Collection::Signals,
            entity_id: EntityId(1),
            value: "GREEN".to_owned(),
        };
        assert_eq!(
            signal.into_sync_event(),
            SyncEvent::SignalStateChanged {
                id: EntityId(1),
                state: "GREEN".to_owned()
            }
        );

        let train = ChangeEvent {
            collection: Collection::Trains,
            entity_id: EntityId(2),
            value: "Depot".to_owned(),
        };
        assert_eq!(
            train.into_sync_event(),
            SyncEvent::TrainPositionChanged {
                id: EntityId(2),
                position: "Depot".to_owned()
            }
        );
    }

    #[test]
    fn sync_event_is_tagged_by_type() {
        let event = SyncEvent::ErrorOccurred {
            message: "boom".to_owned(),
        };
        let json = serde_json::to_value(&event).ok();
        assert_eq!(
            json,
            Some(serde_json::json!({ "type": "error_occurred", "message": "boom" }))
        );
    }

    #[test]
    fn default_status_is_not_connected() {
        let status = ConnectionStatus::default();
        assert!(!status.connected());
        assert_eq!(status.message, "Not Connected");
    }
}
