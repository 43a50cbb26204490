//! Observer bridge for the railsync engine.
//!
//! This crate provides an Axum HTTP server that connects the presentation
//! layer to a running [`SyncEngine`]:
//!
//! - **`WebSocket` endpoint** (`/ws/events`) streaming every outbound
//!   [`SyncEvent`] as JSON via [`tokio::sync::broadcast`]
//! - **REST endpoints** for engine status and the inbound commands (signal
//!   state, train position, poll mode, reconnect, start/stop polling)
//!
//! # Architecture
//!
//! Handlers never touch the store. Every request is forwarded to the
//! engine task through a cloned [`SyncHandle`], so HTTP traffic is
//! serialized with poll cycles and health checks like any other command.
//! A write is acknowledged once the store has applied it; subscribers see
//! the new value after the next poll cycle.
//!
//! [`SyncEngine`]: railsync_core::engine::SyncEngine
//! [`SyncHandle`]: railsync_core::engine::SyncHandle
//! [`SyncEvent`]: railsync_types::SyncEvent

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use startup::spawn_observer;
pub use state::AppState;
