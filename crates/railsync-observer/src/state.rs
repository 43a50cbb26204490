//! Shared application state for the observer server.
//!
//! [`AppState`] holds a [`SyncHandle`] to the running engine. Every handler
//! reads status and forwards commands through it; nothing is cached here.

use railsync_core::engine::{EngineStatus, SyncHandle};
use railsync_types::SyncEvent;
use tokio::sync::{broadcast, watch};

/// Shared state passed to all Axum handlers via [`axum::extract::State`].
#[derive(Debug, Clone)]
pub struct AppState {
    /// Client for the engine task.
    pub handle: SyncHandle,
}

impl AppState {
    /// Wrap an engine handle.
    pub const fn new(handle: SyncHandle) -> Self {
        Self { handle }
    }

    /// Subscribe to outbound engine events.
    ///
    /// Each `WebSocket` connection calls this to get its own receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.handle.subscribe()
    }

    /// Latest engine status.
    pub fn status(&self) -> EngineStatus {
        self.handle.status()
    }

    /// Watch engine status. The receiver reports closed once the engine
    /// task has stopped.
    pub fn status_receiver(&self) -> watch::Receiver<EngineStatus> {
        self.handle.status_receiver()
    }
}
