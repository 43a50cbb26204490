//! Enumeration types shared across the railsync workspace.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Error returned when a string does not name a known enum variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    /// Which enum was being parsed (e.g. "poll mode").
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

/// A tracked entity collection (one backing table each).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Collection {
    /// Railway signals; the observed field is the signal state.
    Signals,
    /// Trains; the observed field is the current position.
    Trains,
}

impl Collection {
    /// Every collection, in the order a poll cycle visits them.
    pub const ALL: [Self; 2] = [Self::Signals, Self::Trains];

    /// Singular label used in log lines and error messages.
    pub const fn entity_label(self) -> &'static str {
        match self {
            Self::Signals => "signal",
            Self::Trains => "train",
        }
    }
}

impl core::fmt::Display for Collection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Signals => f.write_str("signals"),
            Self::Trains => f.write_str("trains"),
        }
    }
}

// ---------------------------------------------------------------------------
// Signal / train states
// ---------------------------------------------------------------------------

/// Aspect shown by a railway signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "UPPERCASE")]
#[ts(export, export_to = "bindings/")]
pub enum SignalState {
    /// Stop.
    Red,
    /// Caution.
    Yellow,
    /// Proceed.
    Green,
}

impl SignalState {
    /// The value stored in the `state` column.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Red => "RED",
            Self::Yellow => "YELLOW",
            Self::Green => "GREEN",
        }
    }
}

impl core::fmt::Display for SignalState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalState {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RED" => Ok(Self::Red),
            "YELLOW" => Ok(Self::Yellow),
            "GREEN" => Ok(Self::Green),
            _ => Err(ParseEnumError::new("signal state", s)),
        }
    }
}

/// Movement status of a train. Display only; not diffed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "UPPERCASE")]
#[ts(export, export_to = "bindings/")]
pub enum TrainStatus {
    /// Standing still.
    Stopped,
    /// In motion.
    Moving,
}

impl TrainStatus {
    /// The value stored in the `status` column.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "STOPPED",
            Self::Moving => "MOVING",
        }
    }
}

impl FromStr for TrainStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STOPPED" => Ok(Self::Stopped),
            "MOVING" => Ok(Self::Moving),
            _ => Err(ParseEnumError::new("train status", s)),
        }
    }
}

// ---------------------------------------------------------------------------
// Connection state
// ---------------------------------------------------------------------------

/// Lifecycle state of the store connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ConnectionState {
    /// No open connection. Initial state.
    #[default]
    Disconnected,
    /// Connection open and healthy; polling may run.
    Connected,
    /// A connection attempt is in progress after a loss.
    Reconnecting,
}

// ---------------------------------------------------------------------------
// Poll modes
// ---------------------------------------------------------------------------

/// Named poll cadence presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum PollMode {
    /// 1 ms between cycles (1000 Hz).
    Teleportation,
    /// 10 ms between cycles (100 Hz).
    Rocket,
    /// 50 ms between cycles (20 Hz).
    Supercar,
    /// 200 ms between cycles (5 Hz).
    #[default]
    Normal,
}

impl PollMode {
    /// Every preset, fastest first.
    pub const ALL: [Self; 4] = [Self::Teleportation, Self::Rocket, Self::Supercar, Self::Normal];

    /// Interval between poll cycles in milliseconds.
    pub const fn interval_ms(self) -> u64 {
        match self {
            Self::Teleportation => 1,
            Self::Rocket => 10,
            Self::Supercar => 50,
            Self::Normal => 200,
        }
    }

    /// Interval between poll cycles.
    pub const fn interval(self) -> Duration {
        Duration::from_millis(self.interval_ms())
    }

    /// Lowercase preset name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Teleportation => "teleportation",
            Self::Rocket => "rocket",
            Self::Supercar => "supercar",
            Self::Normal => "normal",
        }
    }
}

impl core::fmt::Display for PollMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PollMode {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseEnumError::new("poll mode", s))
    }
}
