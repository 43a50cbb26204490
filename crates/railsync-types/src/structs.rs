//! Full entity records as stored in the backing tables.
//!
//! Only the id and the observed field of each record take part in change
//! detection. The remaining columns are carried for display.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{SignalState, TrainStatus};
use crate::ids::EntityId;

/// One row of `railway_signals`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Signal {
    /// Primary key (`signal_id`).
    pub id: EntityId,
    /// Display name, e.g. "Signal A1".
    pub name: String,
    /// Raw `state` column text. Observed field.
    pub state: String,
    /// Track section the signal protects.
    pub section: Option<String>,
    /// When the row was last written.
    pub updated_at: Option<NaiveDateTime>,
}

impl Signal {
    /// Parse the stored state into a known aspect, if it is one.
    pub fn parsed_state(&self) -> Option<SignalState> {
        self.state.parse().ok()
    }
}

/// One row of `railway_trains`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Train {
    /// Primary key (`train_id`).
    pub id: EntityId,
    /// Display name, e.g. "Train 001".
    pub name: String,
    /// Raw `current_position` column text. Observed field.
    pub position: String,
    /// Raw `status` column text.
    pub status: Option<String>,
    /// When the row was last written.
    pub updated_at: Option<NaiveDateTime>,
}

impl Train {
    /// Parse the stored status into a known value, if it is one.
    pub fn parsed_status(&self) -> Option<TrainStatus> {
        self.status.as_deref().and_then(|s| s.parse().ok())
    }
}
