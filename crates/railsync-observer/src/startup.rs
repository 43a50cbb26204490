//! Observer server startup helper for embedding in the engine binary.
//!
//! Provides [`spawn_observer`] which launches the observer HTTP +
//! `WebSocket` server on a background Tokio task, so the API runs
//! concurrently with the sync engine.

use std::sync::Arc;

use railsync_core::config::ObserverConfig;
use tokio::task::JoinHandle;

use crate::server::{ServerConfig, ServerError};
use crate::state::AppState;

/// Errors that can occur when spawning the observer server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// Spawn the observer HTTP server on a background Tokio task.
///
/// Returns a [`JoinHandle`] so the caller can abort the server during
/// clean shutdown.
///
/// # Errors
///
/// Returns [`StartupError::Server`] if the configured address does not
/// parse. This is checked before the background task is spawned; bind
/// failures inside the task are logged.
pub fn spawn_observer(
    config: &ObserverConfig,
    state: Arc<AppState>,
) -> Result<JoinHandle<()>, StartupError> {
    let server = ServerConfig::from(config);
    let addr = server.socket_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = crate::server::start_server(&server, state).await {
            tracing::error!(error = %e, "Observer server exited with error");
        }
    });

    tracing::info!(%addr, "Observer server spawned on background task");

    Ok(handle)
}
