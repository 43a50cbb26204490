//! Connection lifecycle supervision.
//!
//! The [`ConnectionSupervisor`] exclusively owns the store and its single
//! connection. It connects, runs the periodic health check, reconnects after
//! a failed check, and is the only component that changes the
//! [`ConnectionState`]. Other components borrow the store through
//! [`ConnectionSupervisor::connected_store`], which yields nothing unless the
//! connection is up.
//!
//! A health tick is two steps so the owner can publish status in between:
//! [`ConnectionSupervisor::check`] pings, then, unless the ping succeeded,
//! [`ConnectionSupervisor::begin_reconnect`] and
//! [`ConnectionSupervisor::connect`] try again. Reconnect attempts happen
//! strictly on the health-check cadence. There is no backoff: each attempt
//! is bounded by the connect timeout and the next one waits for the next
//! health tick.
//!
//! Every store call is time-limited, closing included. A close that does
//! not finish within the query timeout abandons the connection.

use std::time::Duration;

use railsync_types::{ConnectionState, ConnectionStatus};
use tokio::time::Interval;
use tracing::{info, warn};

use crate::bus::NotificationBus;
use crate::config::SyncConfig;
use crate::scheduler::timer_for;
use crate::store::{StateStore, StoreError, bounded};

/// Status text after an explicit disconnect.
pub const DISCONNECTED_TEXT: &str = "Disconnected";

/// Status text after a failed health check.
pub const CONNECTION_LOST_TEXT: &str = "Connection Lost";

/// Status text while a reconnect attempt is in flight.
pub const RECONNECTING_TEXT: &str = "Reconnecting";

/// Why a connection attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// The store refused or could not be reached. Carries its error text.
    #[error("{0}")]
    Unreachable(String),

    /// The attempt did not finish within the connect timeout.
    #[error("connection attempt timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The password variable is not set.
    #[error("password variable {0} is not set")]
    MissingSecret(String),
}

impl From<StoreError> for ConnectionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Timeout(limit) => Self::Timeout(limit),
            StoreError::MissingSecret(var) => Self::MissingSecret(var),
            StoreError::Unreachable(text) | StoreError::Query(text) => Self::Unreachable(text),
            StoreError::NotOpen => Self::Unreachable("connection is not open".to_owned()),
        }
    }
}

/// Result of a health check ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthOutcome {
    /// The connection answered the ping.
    Healthy,
    /// The ping failed or timed out; the connection is now marked lost.
    Lost,
    /// There was no connection to ping.
    Down,
}

/// Owns the store connection and its health timer.
#[derive(Debug)]
pub struct ConnectionSupervisor<S> {
    store: S,
    status: ConnectionStatus,
    connect_timeout: Duration,
    query_timeout: Duration,
    health_interval: Duration,
    health_timer: Option<Interval>,
}

impl<S: StateStore> ConnectionSupervisor<S> {
    /// Create a disconnected supervisor. Nothing is opened yet.
    pub fn new(store: S, config: &SyncConfig) -> Self {
        Self {
            store,
            status: ConnectionStatus::default(),
            connect_timeout: config.store.connect_timeout(),
            query_timeout: config.store.query_timeout(),
            health_interval: config.polling.health_check_interval(),
            health_timer: None,
        }
    }

    /// Current state and status text.
    pub const fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    /// Whether the connection is up.
    pub fn is_connected(&self) -> bool {
        self.status.connected()
    }

    /// Whether the health timer is armed, i.e. the supervisor has been asked
    /// to connect and has not been told to disconnect since.
    pub const fn is_supervising(&self) -> bool {
        self.health_timer.is_some()
    }

    /// Borrow the store, only while connected.
    pub const fn connected_store(&mut self) -> Option<&mut S> {
        match self.status.state {
            ConnectionState::Connected => Some(&mut self.store),
            ConnectionState::Disconnected | ConnectionState::Reconnecting => None,
        }
    }

    /// Open the connection and arm the health timer.
    ///
    /// The timer stays armed on failure so the next health tick retries.
    ///
    /// # Errors
    ///
    /// Returns the [`ConnectionError`] of the failed attempt; the same text
    /// is published as a status event and an error event.
    pub async fn connect(&mut self, bus: &mut NotificationBus) -> Result<(), ConnectionError> {
        self.arm_health_timer();
        match bounded(self.connect_timeout, self.store.open()).await {
            Ok(()) => {
                let message = format!("Connected to {}", self.store.backend_name());
                info!(backend = self.store.backend_name(), "Connection established");
                self.transition(ConnectionState::Connected, &message);
                bus.publish_status(true, message);
                Ok(())
            }
            Err(err) => {
                self.close_store().await;
                let err = ConnectionError::from(err);
                let message = format!("Connection Failed: {err}");
                warn!(error = %err, "Connection attempt failed");
                self.transition(ConnectionState::Disconnected, &message);
                bus.publish_status(false, message.clone());
                bus.publish_error(message);
                Err(err)
            }
        }
    }

    /// Disarm the health timer and close the connection.
    ///
    /// Safe to call when already disconnected; the status event is only
    /// published when something actually changed.
    pub async fn disconnect(&mut self, bus: &mut NotificationBus) {
        self.health_timer = None;
        self.close_store().await;
        let already = self.status.state == ConnectionState::Disconnected
            && self.status.message == DISCONNECTED_TEXT;
        if !already {
            info!("Disconnected from store");
            self.transition(ConnectionState::Disconnected, DISCONNECTED_TEXT);
            bus.publish_status(false, DISCONNECTED_TEXT);
        }
    }

    /// Ping the store if connected.
    ///
    /// A failed or timed-out ping marks the connection lost and publishes
    /// that before returning [`HealthOutcome::Lost`].
    pub async fn check(&mut self, bus: &mut NotificationBus) -> HealthOutcome {
        if !self.is_connected() {
            return HealthOutcome::Down;
        }
        match bounded(self.query_timeout, self.store.ping()).await {
            Ok(()) => HealthOutcome::Healthy,
            Err(err) => {
                warn!(error = %err, "Health check failed");
                self.transition(ConnectionState::Disconnected, CONNECTION_LOST_TEXT);
                bus.publish_status(false, CONNECTION_LOST_TEXT);
                HealthOutcome::Lost
            }
        }
    }

    /// Enter [`ConnectionState::Reconnecting`]. Follow with
    /// [`connect`](Self::connect).
    pub fn begin_reconnect(&mut self) {
        info!("Attempting to reconnect");
        self.transition(ConnectionState::Reconnecting, RECONNECTING_TEXT);
    }

    /// Wait for the next health tick. Never completes while disarmed.
    pub async fn next_health_check(&mut self) {
        match self.health_timer.as_mut() {
            Some(timer) => {
                timer.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// Close gracefully within the query timeout, otherwise abandon.
    async fn close_store(&mut self) {
        let closed = tokio::time::timeout(self.query_timeout, self.store.close()).await;
        if closed.is_err() {
            warn!(limit = ?self.query_timeout, "Close did not finish, abandoning connection");
            self.store.abandon();
        }
    }

    fn arm_health_timer(&mut self) {
        if self.health_timer.is_none() {
            self.health_timer = Some(timer_for(self.health_interval));
        }
    }

    fn transition(&mut self, state: ConnectionState, message: &str) {
        self.status = ConnectionStatus {
            state,
            message: message.to_owned(),
        };
    }
}
