//! The single-owner sync engine and its client handle.
//!
//! [`SyncEngine`] owns one of each component and is the only place they
//! meet. [`SyncEngine::run`] is the serialized execution context: a
//! `tokio::select!` loop over inbound commands, the health timer, and the
//! poll timer. Because every store call happens inside that loop, poll
//! cycles, health checks, and writes never overlap, and a tick that is still
//! running suppresses the ticks it overlapped.
//!
//! [`spawn_engine`] moves the engine onto a task and returns a cloneable
//! [`SyncHandle`] for issuing commands, reading status, and subscribing to
//! events from anywhere.

use std::ops::ControlFlow;

use railsync_types::{Collection, ConnectionStatus, EntityId, PollMode, SignalState, SyncEvent};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::NotificationBus;
use crate::config::SyncConfig;
use crate::detector::ChangeDetector;
use crate::gateway::{CommandError, CommandGateway};
use crate::scheduler::{PollGate, PollScheduler};
use crate::snapshot::SnapshotCache;
use crate::store::StateStore;
use crate::supervisor::{ConnectionError, ConnectionSupervisor, HealthOutcome};

/// Default depth of the command queue used by [`spawn_engine`] callers.
pub const DEFAULT_COMMAND_CAPACITY: usize = 64;

/// Point-in-time view of the engine, published on a watch channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    /// Connection state and status text.
    pub connection: ConnectionStatus,
    /// Active (or next) poll cadence.
    pub poll_mode: PollMode,
    /// Whether the poll timer is running.
    pub polling: bool,
}

/// Reply channel for a write command.
pub type CommandReply = oneshot::Sender<Result<(), CommandError>>;

/// A request for the engine task.
#[derive(Debug)]
pub enum EngineCommand {
    /// Set a signal's state.
    SetSignalState {
        /// Signal id.
        id: EntityId,
        /// Requested state.
        state: SignalState,
        /// Receives the gateway result.
        reply: CommandReply,
    },
    /// Set a train's position.
    SetTrainPosition {
        /// Train id.
        id: EntityId,
        /// Requested position.
        position: String,
        /// Receives the gateway result.
        reply: CommandReply,
    },
    /// Change the poll cadence from the next tick on.
    SetPollMode(PollMode),
    /// Drop the connection (if any) and connect again.
    Reconnect,
    /// Start the poll timer.
    StartPolling,
    /// Stop the poll timer.
    StopPolling,
    /// Stop both timers and close the connection.
    Disconnect,
    /// Disconnect and end the run loop.
    Shutdown,
}

/// Owns the supervisor, detector, scheduler, gateway, and bus.
#[derive(Debug)]
pub struct SyncEngine<S> {
    supervisor: ConnectionSupervisor<S>,
    detector: ChangeDetector,
    scheduler: PollScheduler,
    gateway: CommandGateway,
    bus: NotificationBus,
    status_tx: watch::Sender<EngineStatus>,
}

impl<S: StateStore> SyncEngine<S> {
    /// Build an engine around `store`. Nothing is connected yet.
    pub fn new(store: S, config: &SyncConfig) -> Self {
        let supervisor = ConnectionSupervisor::new(store, config);
        let scheduler = PollScheduler::new(config.polling.mode);
        let (status_tx, _status_rx) = watch::channel(EngineStatus {
            connection: supervisor.status().clone(),
            poll_mode: scheduler.mode(),
            polling: false,
        });
        Self {
            supervisor,
            detector: ChangeDetector::new(config.store.query_timeout()),
            scheduler,
            gateway: CommandGateway::new(config.store.query_timeout()),
            bus: NotificationBus::new(),
            status_tx,
        }
    }

    /// The bus, for registering subscribers before the engine starts.
    pub const fn bus_mut(&mut self) -> &mut NotificationBus {
        &mut self.bus
    }

    /// Attach a broadcast receiver for outbound events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.bus.subscribe()
    }

    /// Current engine status.
    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            connection: self.supervisor.status().clone(),
            poll_mode: self.scheduler.mode(),
            polling: self.scheduler.is_running(),
        }
    }

    /// Active (or next) poll cadence.
    pub const fn poll_mode(&self) -> PollMode {
        self.scheduler.mode()
    }

    /// Last observed values.
    pub const fn snapshot(&self) -> &SnapshotCache {
        self.detector.snapshot()
    }

    /// A handle to the poll gate.
    pub fn poll_gate(&self) -> PollGate {
        self.scheduler.gate()
    }

    /// Borrow the store while connected, e.g. for a roster read at startup.
    pub const fn connected_store(&mut self) -> Option<&mut S> {
        self.supervisor.connected_store()
    }

    /// Connect, then resync and start polling.
    ///
    /// The first poll cycle runs immediately, so every existing row is
    /// published before this returns.
    ///
    /// # Errors
    ///
    /// Returns the [`ConnectionError`] if the store cannot be reached. The
    /// health timer stays armed and the next health tick retries.
    pub async fn connect(&mut self) -> Result<(), ConnectionError> {
        let result = self.supervisor.connect(&mut self.bus).await;
        if result.is_ok() {
            self.resync().await;
        }
        self.refresh_status();
        result
    }

    /// Stop both timers and close the connection. Idempotent.
    pub async fn disconnect(&mut self) {
        self.scheduler.stop();
        self.supervisor.disconnect(&mut self.bus).await;
        self.refresh_status();
    }

    /// Run one poll cycle and publish what it found.
    ///
    /// Does nothing unless connected with polling running. Failed reads are
    /// published as errors; they never change the connection state.
    pub async fn poll_tick(&mut self) {
        let gate = self.scheduler.gate();
        if !gate.is_open() {
            return;
        }
        let Some(store) = self.supervisor.connected_store() else {
            return;
        };
        let Some(outcome) = self.detector.poll(store, &gate).await else {
            return;
        };

        for failure in outcome.failures {
            warn!(
                collection = %failure.collection,
                error = %failure.error,
                "Poll read failed"
            );
            self.bus.publish_error(format!(
                "Failed to load {}: {}",
                failure.collection, failure.error
            ));
        }
        for change in outcome.changes {
            self.bus.publish_change(change);
        }
    }

    /// Run one health check, reconnecting and resyncing if it fails.
    ///
    /// Does nothing after an explicit disconnect. Status is refreshed as soon
    /// as the connection is found lost and again when the reconnect attempt
    /// starts, so watchers never see a stale `Connected` while the attempt
    /// is in flight. While the connection stays down polling is stopped, so
    /// no cycle runs against a lost connection.
    pub async fn health_tick(&mut self) {
        if !self.supervisor.is_supervising() {
            return;
        }
        match self.supervisor.check(&mut self.bus).await {
            HealthOutcome::Healthy => return,
            HealthOutcome::Lost => {
                self.scheduler.stop();
                self.refresh_status();
            }
            HealthOutcome::Down => {}
        }

        self.supervisor.begin_reconnect();
        self.refresh_status();
        if self.supervisor.connect(&mut self.bus).await.is_ok() {
            info!("Reconnected, resyncing");
            self.resync().await;
        } else {
            self.scheduler.stop();
        }
        self.refresh_status();
    }

    /// Write a signal's state. Visible to subscribers on the next poll.
    ///
    /// # Errors
    ///
    /// Returns the gateway's [`CommandError`], which is also published.
    pub async fn set_signal_state(
        &mut self,
        id: EntityId,
        state: SignalState,
    ) -> Result<(), CommandError> {
        let result = self
            .gateway
            .set_signal_state(&mut self.supervisor, id, state)
            .await;
        self.report(Collection::Signals, result)
    }

    /// Write a train's position. Visible to subscribers on the next poll.
    ///
    /// # Errors
    ///
    /// Returns the gateway's [`CommandError`], which is also published.
    pub async fn set_train_position(
        &mut self,
        id: EntityId,
        position: &str,
    ) -> Result<(), CommandError> {
        let result = self
            .gateway
            .set_train_position(&mut self.supervisor, id, position)
            .await;
        self.report(Collection::Trains, result)
    }

    /// Change the poll cadence. No extra tick fires.
    pub fn set_poll_mode(&mut self, mode: PollMode) {
        self.scheduler.set_mode(mode);
        self.refresh_status();
    }

    /// Start the poll timer at the current mode.
    pub fn start_polling(&mut self) {
        self.scheduler.start(self.scheduler.mode());
        self.refresh_status();
    }

    /// Stop the poll timer. An in-flight cycle's results are discarded.
    pub fn stop_polling(&mut self) {
        self.scheduler.stop();
        self.refresh_status();
    }

    /// Apply one command. Breaks on [`EngineCommand::Shutdown`].
    pub async fn handle(&mut self, command: EngineCommand) -> ControlFlow<()> {
        match command {
            EngineCommand::SetSignalState { id, state, reply } => {
                let result = self.set_signal_state(id, state).await;
                // The caller may have given up waiting.
                let _ignored = reply.send(result);
            }
            EngineCommand::SetTrainPosition {
                id,
                position,
                reply,
            } => {
                let result = self.set_train_position(id, &position).await;
                let _ignored = reply.send(result);
            }
            EngineCommand::SetPollMode(mode) => self.set_poll_mode(mode),
            EngineCommand::Reconnect => {
                self.disconnect().await;
                // Failure is already published and the health timer retries.
                let _ignored = self.connect().await;
            }
            EngineCommand::StartPolling => self.start_polling(),
            EngineCommand::StopPolling => self.stop_polling(),
            EngineCommand::Disconnect => self.disconnect().await,
            EngineCommand::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    /// Serve commands and timers until shutdown or until every
    /// [`SyncHandle`] is dropped, then disconnect.
    pub async fn run(mut self, mut commands: mpsc::Receiver<EngineCommand>) {
        info!(mode = %self.scheduler.mode(), "Sync engine running");
        loop {
            tokio::select! {
                biased;
                command = commands.recv() => {
                    let Some(command) = command else {
                        debug!("All handles dropped");
                        break;
                    };
                    if self.handle(command).await.is_break() {
                        break;
                    }
                }
                () = self.supervisor.next_health_check() => self.health_tick().await,
                () = self.scheduler.next_tick() => self.poll_tick().await,
            }
        }
        self.disconnect().await;
        info!("Sync engine stopped");
    }

    async fn resync(&mut self) {
        self.detector.invalidate();
        self.scheduler.start(self.scheduler.mode());
        self.poll_tick().await;
    }

    fn report(
        &mut self,
        collection: Collection,
        result: Result<(), CommandError>,
    ) -> Result<(), CommandError> {
        if let Err(err) = &result {
            self.bus.publish_error(err.event_text(collection));
        }
        result
    }

    fn refresh_status(&self) {
        self.status_tx.send_replace(self.status());
    }
}

/// Cloneable client for a spawned [`SyncEngine`].
#[derive(Debug, Clone)]
pub struct SyncHandle {
    commands: mpsc::Sender<EngineCommand>,
    events: broadcast::Sender<SyncEvent>,
    status: watch::Receiver<EngineStatus>,
    gate: PollGate,
}

impl SyncHandle {
    /// Request a signal state change and wait for the store's answer.
    ///
    /// # Errors
    ///
    /// Returns the gateway's [`CommandError`], or
    /// [`CommandError::EngineStopped`] if the engine is gone.
    pub async fn set_signal_state(
        &self,
        id: EntityId,
        state: SignalState,
    ) -> Result<(), CommandError> {
        let (reply, answer) = oneshot::channel();
        self.send(EngineCommand::SetSignalState { id, state, reply })
            .await?;
        answer.await.map_err(|_closed| CommandError::EngineStopped)?
    }

    /// Request a train position change and wait for the store's answer.
    ///
    /// # Errors
    ///
    /// As for [`set_signal_state`](Self::set_signal_state).
    pub async fn set_train_position(
        &self,
        id: EntityId,
        position: impl Into<String>,
    ) -> Result<(), CommandError> {
        let (reply, answer) = oneshot::channel();
        self.send(EngineCommand::SetTrainPosition {
            id,
            position: position.into(),
            reply,
        })
        .await?;
        answer.await.map_err(|_closed| CommandError::EngineStopped)?
    }

    /// Change the poll cadence.
    ///
    /// # Errors
    ///
    /// [`CommandError::EngineStopped`] if the engine is gone.
    pub async fn set_poll_mode(&self, mode: PollMode) -> Result<(), CommandError> {
        self.send(EngineCommand::SetPollMode(mode)).await
    }

    /// Drop the connection and connect again.
    ///
    /// # Errors
    ///
    /// [`CommandError::EngineStopped`] if the engine is gone.
    pub async fn reconnect(&self) -> Result<(), CommandError> {
        self.send(EngineCommand::Reconnect).await
    }

    /// Start polling.
    ///
    /// # Errors
    ///
    /// [`CommandError::EngineStopped`] if the engine is gone.
    pub async fn start_polling(&self) -> Result<(), CommandError> {
        self.send(EngineCommand::StartPolling).await
    }

    /// Stop polling. Takes effect immediately: a cycle already in flight
    /// will not publish its results.
    ///
    /// # Errors
    ///
    /// [`CommandError::EngineStopped`] if the engine is gone.
    pub async fn stop_polling(&self) -> Result<(), CommandError> {
        self.gate.close();
        self.send(EngineCommand::StopPolling).await
    }

    /// Stop polling and health checks and close the connection.
    ///
    /// # Errors
    ///
    /// [`CommandError::EngineStopped`] if the engine is gone.
    pub async fn disconnect(&self) -> Result<(), CommandError> {
        self.gate.close();
        self.send(EngineCommand::Disconnect).await
    }

    /// Disconnect and end the engine task.
    ///
    /// # Errors
    ///
    /// [`CommandError::EngineStopped`] if the engine is already gone.
    pub async fn shutdown(&self) -> Result<(), CommandError> {
        self.gate.close();
        self.send(EngineCommand::Shutdown).await
    }

    /// Attach a receiver for outbound events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Latest engine status.
    pub fn status(&self) -> EngineStatus {
        self.status.borrow().clone()
    }

    /// A watch receiver that is notified on every status change.
    pub fn status_receiver(&self) -> watch::Receiver<EngineStatus> {
        self.status.clone()
    }

    async fn send(&self, command: EngineCommand) -> Result<(), CommandError> {
        self.commands
            .send(command)
            .await
            .map_err(|_closed| CommandError::EngineStopped)
    }
}

/// Move `engine` onto its own task.
///
/// `capacity` bounds the command queue; senders wait when it is full.
pub fn spawn_engine<S>(engine: SyncEngine<S>, capacity: usize) -> (SyncHandle, JoinHandle<()>)
where
    S: StateStore + 'static,
{
    let (commands, receiver) = mpsc::channel(capacity.max(1));
    let handle = SyncHandle {
        commands,
        events: engine.bus.sender(),
        status: engine.status_tx.subscribe(),
        gate: engine.scheduler.gate(),
    };
    let task = tokio::spawn(engine.run(receiver));
    (handle, task)
}
