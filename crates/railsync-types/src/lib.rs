//! Shared type definitions for the railsync state synchronization engine.
//!
//! This crate holds the values that cross crate boundaries: entity
//! identifiers, the tracked collections, connection status, poll cadence
//! presets, and the events delivered to the presentation layer. Types
//! marked for export flow to `TypeScript` via `ts-rs`.
//!
//! # Modules
//!
//! - [`ids`] -- Strongly-typed entity identifier
//! - [`enums`] -- Collections, signal/train states, connection state, poll modes
//! - [`structs`] -- Full `Signal` and `Train` records as stored
//! - [`events`] -- Change events and outbound notification events

pub mod enums;
pub mod events;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{Collection, ConnectionState, ParseEnumError, PollMode, SignalState, TrainStatus};
pub use events::{ChangeEvent, ConnectionStatus, SyncEvent};
pub use ids::EntityId;
pub use structs::{Signal, Train};
