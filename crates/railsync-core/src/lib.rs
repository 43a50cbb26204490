//! Polling-based state synchronization engine.
//!
//! The backing store cannot push change notifications, so this crate keeps
//! subscribers current by re-reading the tracked tables on a timer, diffing
//! each read against the last observed snapshot, and publishing one event
//! per changed entity. A separate health-check timer supervises the store
//! connection and reconnects after failures.
//!
//! # Architecture
//!
//! ```text
//! SyncEngine (single task, tokio::select!)
//!     |
//!     +-- poll tick ----> ChangeDetector --> SnapshotCache
//!     |                        |
//!     |                        +--> NotificationBus --> subscribers
//!     |
//!     +-- health tick --> ConnectionSupervisor --> StateStore
//!     |
//!     +-- command ------> CommandGateway ---------> StateStore
//! ```
//!
//! All store access happens on the engine task, so poll cycles, health
//! checks, and writes never overlap.
//!
//! # Modules
//!
//! - [`bus`] -- [`NotificationBus`] and the [`EventSubscriber`] trait
//! - [`config`] -- Configuration loading from `railsync.yaml`
//! - [`detector`] -- [`ChangeDetector`]: read, diff, emit
//! - [`engine`] -- [`SyncEngine`] run loop and the [`SyncHandle`] client
//! - [`gateway`] -- [`CommandGateway`] for state and position writes
//! - [`scheduler`] -- [`PollScheduler`] and its [`PollGate`]
//! - [`snapshot`] -- [`SnapshotCache`] of last observed values
//! - [`store`] -- [`StateStore`] trait and the in-process [`MemoryStore`]
//! - [`supervisor`] -- [`ConnectionSupervisor`]: connect, health-check, reconnect
//!
//! [`NotificationBus`]: bus::NotificationBus
//! [`EventSubscriber`]: bus::EventSubscriber
//! [`ChangeDetector`]: detector::ChangeDetector
//! [`SyncEngine`]: engine::SyncEngine
//! [`SyncHandle`]: engine::SyncHandle
//! [`CommandGateway`]: gateway::CommandGateway
//! [`PollScheduler`]: scheduler::PollScheduler
//! [`PollGate`]: scheduler::PollGate
//! [`SnapshotCache`]: snapshot::SnapshotCache
//! [`StateStore`]: store::StateStore
//! [`MemoryStore`]: store::MemoryStore
//! [`ConnectionSupervisor`]: supervisor::ConnectionSupervisor

pub mod bus;
pub mod config;
pub mod detector;
pub mod engine;
pub mod gateway;
pub mod scheduler;
pub mod snapshot;
pub mod store;
pub mod supervisor;
