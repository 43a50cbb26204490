//! REST API handlers for engine status and inbound commands.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/status` | Connection status, poll mode, polling flag |
//! | `POST` | `/api/signals/{id}/state` | Set a signal's state |
//! | `POST` | `/api/trains/{id}/position` | Set a train's position |
//! | `POST` | `/api/poll-mode` | Change the poll cadence |
//! | `POST` | `/api/reconnect` | Drop and re-open the connection |
//! | `POST` | `/api/polling/start` | Start the poll timer |
//! | `POST` | `/api/polling/stop` | Stop the poll timer |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use railsync_types::{EntityId, PollMode, SignalState};
use tracing::info;

use crate::error::ObserverError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /api/signals/{id}/state`.
#[derive(Debug, serde::Deserialize)]
pub struct SetSignalStateRequest {
    /// Requested aspect: `RED`, `YELLOW`, or `GREEN` (any case).
    pub state: String,
}

/// Request body for `POST /api/trains/{id}/position`.
#[derive(Debug, serde::Deserialize)]
pub struct SetTrainPositionRequest {
    /// New position text. Must not be blank.
    pub position: String,
}

/// Request body for `POST /api/poll-mode`.
#[derive(Debug, serde::Deserialize)]
pub struct SetPollModeRequest {
    /// Mode name: `teleportation`, `rocket`, `supercar`, or `normal`.
    pub mode: String,
}

/// Generic success response.
#[derive(Debug, serde::Serialize)]
struct CommandResponse {
    /// Whether the command was accepted.
    ok: bool,
    /// Human-readable message.
    message: String,
}

impl CommandResponse {
    fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            ok: true,
            message: message.into(),
        })
    }
}

// ---------------------------------------------------------------------------
// GET /api/status
// ---------------------------------------------------------------------------

/// Current engine status.
pub async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.status())
}

// ---------------------------------------------------------------------------
// POST /api/signals/{id}/state
// ---------------------------------------------------------------------------

/// Set a signal's state.
///
/// Responds once the store has applied the update. The matching
/// `signal_state_changed` event follows on the next poll cycle.
pub async fn set_signal_state(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(body): Json<SetSignalStateRequest>,
) -> Result<impl IntoResponse, ObserverError> {
    let requested: SignalState = body
        .state
        .parse()
        .map_err(|e| ObserverError::InvalidRequest(format!("{e}")))?;

    state
        .handle
        .set_signal_state(EntityId(id), requested)
        .await?;

    info!(signal_id = id, state = %requested, "Signal update accepted");
    Ok(CommandResponse::ok(format!(
        "Signal {id} set to {requested}"
    )))
}

// ---------------------------------------------------------------------------
// POST /api/trains/{id}/position
// ---------------------------------------------------------------------------

/// Set a train's position.
pub async fn set_train_position(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(body): Json<SetTrainPositionRequest>,
) -> Result<impl IntoResponse, ObserverError> {
    let position = body.position.trim();
    if position.is_empty() {
        return Err(ObserverError::InvalidRequest(
            "position must not be blank".to_owned(),
        ));
    }

    state
        .handle
        .set_train_position(EntityId(id), position)
        .await?;

    info!(train_id = id, position, "Train update accepted");
    Ok(CommandResponse::ok(format!(
        "Train {id} moved to {position}"
    )))
}

// ---------------------------------------------------------------------------
// POST /api/poll-mode
// ---------------------------------------------------------------------------

/// Change the poll cadence. Takes effect from the next tick.
pub async fn set_poll_mode(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SetPollModeRequest>,
) -> Result<impl IntoResponse, ObserverError> {
    let mode: PollMode = body
        .mode
        .parse()
        .map_err(|e| ObserverError::InvalidRequest(format!("{e}")))?;

    state.handle.set_poll_mode(mode).await?;

    Ok(CommandResponse::ok(format!(
        "Poll mode set to {mode} ({}ms)",
        mode.interval_ms()
    )))
}

// ---------------------------------------------------------------------------
// POST /api/reconnect
// ---------------------------------------------------------------------------

/// Drop the connection and connect again. The outcome arrives as a
/// `connection_status_changed` event.
pub async fn reconnect(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    state.handle.reconnect().await?;
    Ok(CommandResponse::ok("Reconnect requested"))
}

// ---------------------------------------------------------------------------
// POST /api/polling/start, /api/polling/stop
// ---------------------------------------------------------------------------

/// Start the poll timer.
pub async fn start_polling(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    state.handle.start_polling().await?;
    Ok(CommandResponse::ok("Polling started"))
}

/// Stop the poll timer.
pub async fn stop_polling(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    state.handle.stop_polling().await?;
    Ok(CommandResponse::ok("Polling stopped"))
}
