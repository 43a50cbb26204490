//! Axum router construction for the observer API.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS middleware enabled for cross-origin dashboard access.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router for the observer server.
///
/// The router includes:
/// - `GET /ws/events` -- `WebSocket` event stream
/// - `GET /api/status` -- engine status
/// - `POST /api/signals/{id}/state` -- set a signal's state
/// - `POST /api/trains/{id}/position` -- set a train's position
/// - `POST /api/poll-mode` -- change the poll cadence
/// - `POST /api/reconnect` -- reconnect to the store
/// - `POST /api/polling/start` and `/api/polling/stop`
///
/// CORS is configured to allow any origin for development. In
/// production this should be restricted.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // WebSocket
        .route("/ws/events", get(ws::ws_events))
        // REST API
        .route("/api/status", get(handlers::get_status))
        .route("/api/signals/{id}/state", post(handlers::set_signal_state))
        .route("/api/trains/{id}/position", post(handlers::set_train_position))
        .route("/api/poll-mode", post(handlers::set_poll_mode))
        .route("/api/reconnect", post(handlers::reconnect))
        .route("/api/polling/start", post(handlers::start_polling))
        .route("/api/polling/stop", post(handlers::stop_polling))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
