//! `WebSocket` stream of outbound sync events.
//!
//! `GET /ws/events` upgrades to a socket that first receives one
//! `connection_status_changed` frame describing the connection as it is
//! now, then every [`SyncEvent`] published after it attached, as JSON text
//! frames tagged by `type`. Change events published before the client
//! attached are not replayed; the next full resync covers them.
//!
//! A client that falls behind the broadcast buffer skips what it missed.
//! When the engine task stops, its status watch closes and the socket is
//! closed with a normal close frame.

use std::ops::ControlFlow;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use railsync_types::{ConnectionStatus, SyncEvent};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::state::AppState;

/// Upgrade to an event stream.
///
/// # Route
///
/// `GET /ws/events`
pub async fn ws_events(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_events(socket, state))
}

/// The frame a new client starts from.
fn status_frame(status: &ConnectionStatus) -> SyncEvent {
    SyncEvent::ConnectionStatusChanged {
        connected: status.connected(),
        message: status.message.clone(),
    }
}

async fn stream_events(mut socket: WebSocket, state: Arc<AppState>) {
    let mut events = state.subscribe();
    let mut engine = state.status_receiver();
    let greeting = status_frame(&engine.borrow_and_update().connection);
    if send_event(&mut socket, &greeting).await.is_break() {
        return;
    }
    debug!("Event stream opened");

    loop {
        let step = tokio::select! {
            received = events.recv() => match received {
                Ok(event) => send_event(&mut socket, &event).await,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Event stream lagged, skipping ahead");
                    ControlFlow::Continue(())
                }
                // The bus sender lives in the engine handle held by the app
                // state, so the engine stopping is seen on the watch instead.
                Err(RecvError::Closed) => ControlFlow::Break(()),
            },
            changed = engine.changed() => match changed {
                Ok(()) => ControlFlow::Continue(()),
                Err(_stopped) => {
                    debug!("Engine stopped, closing event stream");
                    let _ignored = socket.send(Message::Close(None)).await;
                    ControlFlow::Break(())
                }
            },
            incoming = socket.recv() => client_frame(incoming),
        };
        if step.is_break() {
            break;
        }
    }
    debug!("Event stream closed");
}

/// Send one event as a JSON text frame. Breaks once the client is gone.
async fn send_event(socket: &mut WebSocket, event: &SyncEvent) -> ControlFlow<()> {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(err) => {
            warn!(error = %err, "Failed to encode sync event");
            return ControlFlow::Continue(());
        }
    };
    if socket.send(Message::Text(json.into())).await.is_err() {
        return ControlFlow::Break(());
    }
    ControlFlow::Continue(())
}

/// React to a frame from the client. Pings are answered by the protocol
/// layer and commands travel over the REST routes, so only the end of the
/// stream matters here.
fn client_frame(incoming: Option<Result<Message, axum::Error>>) -> ControlFlow<()> {
    match incoming {
        Some(Ok(Message::Close(_))) | None => ControlFlow::Break(()),
        Some(Err(err)) => {
            debug!(error = %err, "Event stream receive failed");
            ControlFlow::Break(())
        }
        Some(Ok(_)) => ControlFlow::Continue(()),
    }
}

#[cfg(test)]
mod tests {
    use railsync_types::ConnectionState;

    use super::*;

    #[test]
    fn greeting_reflects_current_connection() {
        let down = ConnectionStatus::default();
        assert_eq!(
            status_frame(&down),
            SyncEvent::ConnectionStatusChanged {
                connected: false,
                message: "Not Connected".to_owned(),
            }
        );

        let up = ConnectionStatus {
            state: ConnectionState::Connected,
            message: "Connected to PostgreSQL".to_owned(),
        };
        assert!(matches!(
            status_frame(&up),
            SyncEvent::ConnectionStatusChanged { connected: true, .. }
        ));
    }

    #[test]
    fn client_close_ends_the_stream() {
        assert!(client_frame(None).is_break());
        assert!(client_frame(Some(Ok(Message::Close(None)))).is_break());
        assert!(client_frame(Some(Ok(Message::Text("hello".into())))).is_continue());
    }
}
