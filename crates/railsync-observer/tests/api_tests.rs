//! Integration tests for the observer API endpoints.
//!
//! Tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server. Each test spawns a real engine over an in-process
//! `MemoryStore`, so requests travel the same command path as in
//! production.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use railsync_core::config::SyncConfig;
use railsync_core::engine::{DEFAULT_COMMAND_CAPACITY, SyncEngine, SyncHandle, spawn_engine};
use railsync_core::store::MemoryStore;
use railsync_observer::router::build_router;
use railsync_observer::state::AppState;
use railsync_types::{Collection, EntityId, PollMode, SyncEvent};
use serde_json::Value;
use tower::ServiceExt;

struct Harness {
    router: Router,
    handle: SyncHandle,
    store: MemoryStore,
}

async fn harness(connect: bool) -> Harness {
    let store = MemoryStore::new();
    store.put_signal(1, "RED");
    store.put_signal(2, "GREEN");
    store.put_train(1, "Platform A");

    let mut engine = SyncEngine::new(store.clone(), &SyncConfig::default());
    if connect {
        engine.connect().await.unwrap();
    }
    let (handle, _task) = spawn_engine(engine, DEFAULT_COMMAND_CAPACITY);
    let router = build_router(Arc::new(AppState::new(handle.clone())));
    Harness {
        router,
        handle,
        store,
    }
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn status_reports_connection_and_mode() {
    let h = harness(true).await;

    let response = h
        .router
        .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["connection"]["state"], "connected");
    assert_eq!(json["connection"]["message"], "Connected to memory store");
    assert_eq!(json["poll_mode"], "normal");
    assert_eq!(json["polling"], true);
}

#[tokio::test]
async fn signal_write_is_applied_then_polled() {
    let h = harness(true).await;
    let mut events = h.handle.subscribe();

    let response = h
        .router
        .oneshot(post_json(
            "/api/signals/1/state",
            &serde_json::json!({ "state": "green" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["ok"], true);
    assert_eq!(h.store.value(Collection::Signals, 1).as_deref(), Some("GREEN"));

    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        event,
        SyncEvent::SignalStateChanged {
            id: EntityId(1),
            state: "GREEN".to_owned(),
        }
    );
}

#[tokio::test]
async fn unknown_signal_is_404() {
    let h = harness(true).await;

    let response = h
        .router
        .oneshot(post_json(
            "/api/signals/9999/state",
            &serde_json::json!({ "state": "RED" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["error"], "No signal found with ID 9999");
    assert_eq!(json["status"], 404);
}

#[tokio::test]
async fn invalid_signal_state_is_400() {
    let h = harness(true).await;

    let response = h
        .router
        .oneshot(post_json(
            "/api/signals/1/state",
            &serde_json::json!({ "state": "PURPLE" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.store.write_count(), 0);
}

#[tokio::test]
async fn write_while_disconnected_is_503() {
    let h = harness(false).await;

    let response = h
        .router
        .oneshot(post_json(
            "/api/trains/1/position",
            &serde_json::json!({ "position": "Depot" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["error"], "Database not connected");
    assert_eq!(h.store.write_count(), 0);
}

#[tokio::test]
async fn blank_train_position_is_400() {
    let h = harness(true).await;

    let response = h
        .router
        .oneshot(post_json(
            "/api/trains/1/position",
            &serde_json::json!({ "position": "   " }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn train_write_succeeds() {
    let h = harness(true).await;

    let response = h
        .router
        .oneshot(post_json(
            "/api/trains/1/position",
            &serde_json::json!({ "position": "Junction B" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        h.store.value(Collection::Trains, 1).as_deref(),
        Some("Junction B")
    );
}

#[tokio::test]
async fn poll_mode_change_is_reflected_in_status() {
    let h = harness(true).await;
    let mut status = h.handle.status_receiver();

    let response = h
        .router
        .oneshot(post_json(
            "/api/poll-mode",
            &serde_json::json!({ "mode": "Rocket" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["message"], "Poll mode set to rocket (10ms)");

    tokio::time::timeout(
        Duration::from_secs(2),
        status.wait_for(|current| current.poll_mode == PollMode::Rocket),
    )
    .await
    .unwrap()
    .unwrap();
}

#[tokio::test]
async fn unknown_poll_mode_is_400() {
    let h = harness(true).await;

    let response = h
        .router
        .oneshot(post_json(
            "/api/poll-mode",
            &serde_json::json!({ "mode": "warp" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reconnect_brings_a_failed_engine_up() {
    let h = harness(false).await;
    let mut status = h.handle.status_receiver();

    let response = h
        .router
        .oneshot(
            Request::post("/api/reconnect")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    tokio::time::timeout(
        Duration::from_secs(2),
        status.wait_for(|current| current.connection.connected()),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(h.store.is_open());
}

#[tokio::test]
async fn stop_polling_endpoint_stops_the_timer() {
    let h = harness(true).await;
    let mut status = h.handle.status_receiver();

    let response = h
        .router
        .oneshot(
            Request::post("/api/polling/stop")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    tokio::time::timeout(
        Duration::from_secs(2),
        status.wait_for(|current| !current.polling),
    )
    .await
    .unwrap()
    .unwrap();
}

#[tokio::test]
async fn stopped_engine_is_503() {
    let h = harness(true).await;
    h.handle.shutdown().await.unwrap();
    // Wait for the engine task to drop its command receiver.
    let mut status = h.handle.status_receiver();
    tokio::time::timeout(Duration::from_secs(2), status.changed())
        .await
        .unwrap()
        .ok();

    let response = h
        .router
        .oneshot(
            Request::post("/api/reconnect")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn unknown_route_is_404() {
    let h = harness(true).await;

    let response = h
        .router
        .oneshot(Request::get("/api/nothing").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
