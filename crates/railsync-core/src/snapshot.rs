//! Last observed value per tracked entity.
//!
//! The cache exists purely for diffing. It holds at most one entry per
//! entity id within a collection; a missing entry means the entity has
//! never been observed, so its next sighting counts as a change. Entries
//! go away when whole collections are cleared, and when a successful read
//! shows their row no longer exists.

use std::collections::{BTreeMap, BTreeSet};

use railsync_types::{Collection, EntityId};

/// In-memory map of entity id to last observed value, per collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotCache {
    entries: BTreeMap<Collection, BTreeMap<EntityId, String>>,
}

impl SnapshotCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last observed value of an entity, if it has been seen.
    pub fn get(&self, collection: Collection, id: EntityId) -> Option<&str> {
        self.entries
            .get(&collection)
            .and_then(|values| values.get(&id))
            .map(String::as_str)
    }

    /// Record a value. Returns the value it replaced.
    pub fn set(&mut self, collection: Collection, id: EntityId, value: String) -> Option<String> {
        self.entries.entry(collection).or_default().insert(id, value)
    }

    /// Record `value` if it differs from the cached one.
    ///
    /// Returns `true` when the entity was unseen or its value changed.
    pub fn observe(&mut self, collection: Collection, id: EntityId, value: &str) -> bool {
        if self.get(collection, id) == Some(value) {
            return false;
        }
        self.set(collection, id, value.to_owned());
        true
    }

    /// Forget entries of `collection` whose id is not in `present`.
    ///
    /// Returns how many entries were dropped.
    pub fn retain_present(&mut self, collection: Collection, present: &BTreeSet<EntityId>) -> usize {
        let Some(values) = self.entries.get_mut(&collection) else {
            return 0;
        };
        let before = values.len();
        values.retain(|id, _| present.contains(id));
        before.saturating_sub(values.len())
    }

    /// Forget every entry of one collection.
    pub fn clear(&mut self, collection: Collection) {
        self.entries.remove(&collection);
    }

    /// Forget everything, forcing a full resync on the next poll.
    pub fn clear_all(&mut self) {
        self.entries.clear();
    }

    /// Number of entries cached for a collection.
    pub fn len(&self, collection: Collection) -> usize {
        self.entries.get(&collection).map_or(0, BTreeMap::len)
    }

    /// Whether no entity of any collection has been observed.
    pub fn is_empty(&self) -> bool {
        self.entries.values().all(BTreeMap::is_empty)
    }
}
