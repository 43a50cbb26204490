//! Externally requested writes.
//!
//! The [`CommandGateway`] turns a state or position request into a single
//! parameterized update through the supervisor's connection. It never
//! touches the snapshot: a successful write becomes visible to subscribers
//! on the next poll cycle, like any out-of-band change.

use std::time::Duration;

use railsync_types::{Collection, EntityId, SignalState};
use tracing::{info, warn};

use crate::store::{StateStore, StoreError, bounded};
use crate::supervisor::ConnectionSupervisor;

/// Why a write request was not applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// The store is not connected. The store was not touched.
    #[error("Database not connected")]
    NotConnected,

    /// No row has this id. Not worth retrying.
    #[error("No {} found with ID {id}", .collection.entity_label())]
    EntityNotFound {
        /// Collection that was addressed.
        collection: Collection,
        /// The id that matched nothing.
        id: EntityId,
    },

    /// The update statement failed or timed out.
    #[error("{0}")]
    Query(#[from] StoreError),

    /// The engine task has exited and can no longer take commands.
    #[error("sync engine is not running")]
    EngineStopped,
}

impl CommandError {
    /// Text published as an error event when a write to `collection` fails.
    pub fn event_text(&self, collection: Collection) -> String {
        let label = collection.entity_label();
        match self {
            Self::NotConnected => format!("Cannot update {label}: {self}"),
            Self::Query(_) => format!("Failed to update {label}: {self}"),
            Self::EntityNotFound { .. } | Self::EngineStopped => self.to_string(),
        }
    }
}

/// Applies write commands to the store.
#[derive(Debug, Clone, Copy)]
pub struct CommandGateway {
    query_timeout: Duration,
}

impl CommandGateway {
    /// Create a gateway whose updates are bounded by `query_timeout`.
    pub const fn new(query_timeout: Duration) -> Self {
        Self { query_timeout }
    }

    /// Set a signal's state.
    ///
    /// # Errors
    ///
    /// [`CommandError::NotConnected`] without touching the store when the
    /// connection is down, [`CommandError::EntityNotFound`] when no signal
    /// has `id`, and [`CommandError::Query`] when the update fails.
    pub async fn set_signal_state<S: StateStore>(
        &self,
        supervisor: &mut ConnectionSupervisor<S>,
        id: EntityId,
        state: SignalState,
    ) -> Result<(), CommandError> {
        self.write(supervisor, Collection::Signals, id, state.as_str())
            .await
    }

    /// Set a train's position.
    ///
    /// # Errors
    ///
    /// As for [`set_signal_state`](Self::set_signal_state).
    pub async fn set_train_position<S: StateStore>(
        &self,
        supervisor: &mut ConnectionSupervisor<S>,
        id: EntityId,
        position: &str,
    ) -> Result<(), CommandError> {
        self.write(supervisor, Collection::Trains, id, position).await
    }

    async fn write<S: StateStore>(
        &self,
        supervisor: &mut ConnectionSupervisor<S>,
        collection: Collection,
        id: EntityId,
        value: &str,
    ) -> Result<(), CommandError> {
        let Some(store) = supervisor.connected_store() else {
            warn!(collection = %collection, id = %id, "Write rejected, not connected");
            return Err(CommandError::NotConnected);
        };

        let affected = bounded(self.query_timeout, store.update_observed(collection, id, value))
            .await
            .inspect_err(|err| {
                warn!(collection = %collection, id = %id, error = %err, "Update failed");
            })?;

        if affected == 0 {
            warn!(collection = %collection, id = %id, "Write matched no row");
            return Err(CommandError::EntityNotFound { collection, id });
        }

        info!(collection = %collection, id = %id, value, "Update applied");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::bus::NotificationBus;
    use crate::config::SyncConfig;
    use crate::store::MemoryStore;

    async fn connected() -> (ConnectionSupervisor<MemoryStore>, MemoryStore) {
        let store = MemoryStore::new();
        store.put_signal(1, "RED");
        store.put_train(1, "Platform A");
        let mut supervisor = ConnectionSupervisor::new(store.clone(), &SyncConfig::default());
        supervisor.connect(&mut NotificationBus::new()).await.unwrap();
        (supervisor, store)
    }

    fn gateway() -> CommandGateway {
        CommandGateway::new(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn write_lands_in_store() {
        let (mut supervisor, store) = connected().await;

        gateway()
            .set_signal_state(&mut supervisor, EntityId(1), SignalState::Green)
            .await
            .unwrap();
        gateway()
            .set_train_position(&mut supervisor, EntityId(1), "Junction B")
            .await
            .unwrap();

        assert_eq!(store.value(Collection::Signals, 1).as_deref(), Some("GREEN"));
        assert_eq!(store.value(Collection::Trains, 1).as_deref(), Some("Junction B"));
    }

    #[tokio::test]
    async fn unknown_id_is_entity_not_found() {
        let (mut supervisor, _store) = connected().await;

        let err = gateway()
            .set_signal_state(&mut supervisor, EntityId(9999), SignalState::Red)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CommandError::EntityNotFound {
                collection: Collection::Signals,
                id: EntityId(9999),
            }
        );
        assert_eq!(err.to_string(), "No signal found with ID 9999");
    }

    #[tokio::test]
    async fn disconnected_write_does_not_touch_store() {
        let store = MemoryStore::new();
        store.put_signal(1, "RED");
        let mut supervisor = ConnectionSupervisor::new(store.clone(), &SyncConfig::default());

        let err = gateway()
            .set_signal_state(&mut supervisor, EntityId(1), SignalState::Green)
            .await
            .unwrap_err();
        assert_eq!(err, CommandError::NotConnected);
        assert_eq!(store.write_count(), 0);
        assert_eq!(store.value(Collection::Signals, 1).as_deref(), Some("RED"));
        assert_eq!(
            err.event_text(Collection::Signals),
            "Cannot update signal: Database not connected"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_update_is_a_query_error() {
        let (mut supervisor, store) = connected().await;
        store.set_stalled(true);

        let err = gateway()
            .set_train_position(&mut supervisor, EntityId(1), "Depot")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CommandError::Query(StoreError::Timeout(Duration::from_secs(2)))
        );
        assert!(supervisor.is_connected());
        assert!(err.event_text(Collection::Trains).starts_with("Failed to update train: "));
    }
}
