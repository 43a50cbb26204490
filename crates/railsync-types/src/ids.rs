//! Entity identifier wrapper.
//!
//! Both tracked tables key their rows by a `SERIAL` integer primary key.
//! [`EntityId`] wraps that integer so that ids cannot be confused with
//! other integers (row counts, intervals) at compile time.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Primary key of a signal or train row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[serde(transparent)]
#[ts(export, export_to = "bindings/")]
pub struct EntityId(pub i32);

impl EntityId {
    /// Return the raw integer value.
    pub const fn into_inner(self) -> i32 {
        self.0
    }
}

impl core::fmt::Display for EntityId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for EntityId {
    fn from(id: i32) -> Self {
        Self(id)
    }
}

impl From<EntityId> for i32 {
    fn from(id: EntityId) -> Self {
        id.0
    }
}
