//! Change detection over the tracked collections.
//!
//! One poll cycle reads every collection, compares each row's observed
//! value against the [`SnapshotCache`], records what differs, and returns
//! the resulting [`ChangeEvent`]s in collection order, then ascending id.
//!
//! Detection is level-triggered: after [`ChangeDetector::invalidate`] every
//! existing row is reported again on the next cycle, whether or not its
//! value actually changed while the detector was not looking.
//!
//! Rows deleted from the store produce no event. A successful read drops
//! their snapshot entries, so a row that comes back later counts as a first
//! sighting.
//!
//! A failed read of one collection is reported in the [`PollOutcome`] and
//! does not stop the other collection from being read. It never changes
//! the connection state; that is the supervisor's job.

use std::collections::BTreeSet;
use std::time::Duration;

use railsync_types::{ChangeEvent, Collection};
use tracing::{debug, trace};

use crate::scheduler::PollGate;
use crate::snapshot::SnapshotCache;
use crate::store::{ObservedRow, StateStore, StoreError, bounded};

/// A collection whose read failed during a poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionFailure {
    /// The collection that could not be read.
    pub collection: Collection,
    /// Why.
    pub error: StoreError,
}

/// Result of one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// Detected changes, collection order then ascending id.
    pub changes: Vec<ChangeEvent>,
    /// Collections whose read failed this cycle.
    pub failures: Vec<CollectionFailure>,
}

impl PollOutcome {
    /// Whether the cycle produced neither changes nor failures.
    pub fn is_quiet(&self) -> bool {
        self.changes.is_empty() && self.failures.is_empty()
    }
}

/// Reads, diffs, and emits.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    cache: SnapshotCache,
    query_timeout: Duration,
}

impl ChangeDetector {
    /// Create a detector with an empty snapshot.
    pub fn new(query_timeout: Duration) -> Self {
        Self {
            cache: SnapshotCache::new(),
            query_timeout,
        }
    }

    /// Discard the snapshot so the next cycle reports every row.
    pub fn invalidate(&mut self) {
        self.cache.clear_all();
        debug!("Snapshot invalidated, next poll performs a full resync");
    }

    /// Read-only view of the snapshot.
    pub const fn snapshot(&self) -> &SnapshotCache {
        &self.cache
    }

    /// Run one poll cycle against `store`.
    ///
    /// All reads complete before anything is applied. If `gate` has closed
    /// by then, the reads are thrown away, the snapshot is left untouched,
    /// and `None` is returned.
    pub async fn poll<S: StateStore>(
        &mut self,
        store: &mut S,
        gate: &PollGate,
    ) -> Option<PollOutcome> {
        let mut reads: Vec<(Collection, Vec<ObservedRow>)> =
            Vec::with_capacity(Collection::ALL.len());
        let mut failures = Vec::new();

        for collection in Collection::ALL {
            match bounded(self.query_timeout, store.fetch_observed(collection)).await {
                Ok(rows) => reads.push((collection, rows)),
                Err(error) => failures.push(CollectionFailure { collection, error }),
            }
        }

        if !gate.is_open() {
            trace!("Poll results discarded, polling was stopped mid-cycle");
            return None;
        }

        let mut changes = Vec::new();
        for (collection, mut rows) in reads {
            rows.sort_by_key(|row| row.id);
            let present: BTreeSet<_> = rows.iter().map(|row| row.id).collect();
            let dropped = self.cache.retain_present(collection, &present);
            if dropped > 0 {
                debug!(collection = %collection, dropped, "Deleted rows dropped from snapshot");
            }
            for row in rows {
                if self.cache.observe(collection, row.id, &row.value) {
                    debug!(
                        collection = %collection,
                        id = %row.id,
                        value = %row.value,
                        "Change detected"
                    );
                    changes.push(ChangeEvent {
                        collection,
                        entity_id: row.id,
                        value: row.value,
                    });
                }
            }
        }

        trace!(
            changes = changes.len(),
            failures = failures.len(),
            "Poll cycle complete"
        );

        Some(PollOutcome { changes, failures })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use railsync_types::EntityId;

    use super::*;
    use crate::store::MemoryStore;

    fn open_gate() -> PollGate {
        let gate = PollGate::new();
        gate.open();
        gate
    }

    async fn seeded_store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.put_signal(1, "RED");
        store.put_signal(2, "GREEN");
        store.put_train(1, "Platform A");
        store.open().await.unwrap();
        store
    }

    fn change(collection: Collection, id: i32, value: &str) -> ChangeEvent {
        ChangeEvent {
            collection,
            entity_id: EntityId(id),
            value: value.to_owned(),
        }
    }

    #[tokio::test]
    async fn example_scenario_first_sighting_then_change_then_quiet() {
        let mut store = MemoryStore::new();
        store.put_signal(1, "RED");
        store.open().await.unwrap();
        let gate = open_gate();
        let mut detector = ChangeDetector::new(Duration::from_secs(1));

        let first = detector.poll(&mut store, &gate).await.unwrap();
        assert_eq!(first.changes, vec![change(Collection::Signals, 1, "RED")]);

        store.put_signal(1, "GREEN");
        let second = detector.poll(&mut store, &gate).await.unwrap();
        assert_eq!(second.changes, vec![change(Collection::Signals, 1, "GREEN")]);

        let third = detector.poll(&mut store, &gate).await.unwrap();
        assert!(third.is_quiet());
    }

    #[tokio::test]
    async fn second_poll_without_mutation_is_empty() {
        let mut store = seeded_store().await;
        let gate = open_gate();
        let mut detector = ChangeDetector::new(Duration::from_secs(1));

        assert_eq!(detector.poll(&mut store, &gate).await.unwrap().changes.len(), 3);
        assert!(detector.poll(&mut store, &gate).await.unwrap().changes.is_empty());
    }

    #[tokio::test]
    async fn events_are_ordered_by_collection_then_id() {
        let mut store = MemoryStore::new();
        store.put_train(7, "Depot");
        store.put_signal(30, "RED");
        store.put_signal(4, "YELLOW");
        store.put_train(2, "Platform A");
        store.put_signal(12, "GREEN");
        store.open().await.unwrap();
        let mut detector = ChangeDetector::new(Duration::from_secs(1));

        let outcome = detector.poll(&mut store, &open_gate()).await.unwrap();
        let order: Vec<(Collection, i32)> = outcome
            .changes
            .iter()
            .map(|c| (c.collection, c.entity_id.into_inner()))
            .collect();
        assert_eq!(
            order,
            vec![
                (Collection::Signals, 4),
                (Collection::Signals, 12),
                (Collection::Signals, 30),
                (Collection::Trains, 2),
                (Collection::Trains, 7),
            ]
        );
    }

    #[tokio::test]
    async fn invalidate_reports_every_row_again() {
        let mut store = seeded_store().await;
        let gate = open_gate();
        let mut detector = ChangeDetector::new(Duration::from_secs(1));
        detector.poll(&mut store, &gate).await.unwrap();

        detector.invalidate();
        assert!(detector.snapshot().is_empty());
        let outcome = detector.poll(&mut store, &gate).await.unwrap();
        assert_eq!(
            outcome.changes,
            vec![
                change(Collection::Signals, 1, "RED"),
                change(Collection::Signals, 2, "GREEN"),
                change(Collection::Trains, 1, "Platform A"),
            ]
        );
    }

    #[tokio::test]
    async fn deleted_rows_leave_the_snapshot_silently() {
        let mut store = seeded_store().await;
        let gate = open_gate();
        let mut detector = ChangeDetector::new(Duration::from_secs(1));
        detector.poll(&mut store, &gate).await.unwrap();

        assert!(store.remove(Collection::Signals, 2));
        let outcome = detector.poll(&mut store, &gate).await.unwrap();
        assert!(outcome.is_quiet());
        assert_eq!(detector.snapshot().len(Collection::Signals), 1);
        assert_eq!(detector.snapshot().get(Collection::Signals, EntityId(2)), None);

        // Re-inserted with the old value, it is a new sighting.
        store.put_signal(2, "GREEN");
        let outcome = detector.poll(&mut store, &gate).await.unwrap();
        assert_eq!(outcome.changes, vec![change(Collection::Signals, 2, "GREEN")]);
    }

    #[tokio::test]
    async fn failed_read_keeps_the_snapshot_for_that_collection() {
        let mut store = seeded_store().await;
        let gate = open_gate();
        let mut detector = ChangeDetector::new(Duration::from_secs(1));
        detector.poll(&mut store, &gate).await.unwrap();

        store.fail_next_fetch(Collection::Signals);
        let outcome = detector.poll(&mut store, &gate).await.unwrap();
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(detector.snapshot().len(Collection::Signals), 2);
    }

    #[tokio::test]
    async fn one_failed_collection_does_not_abort_the_other() {
        let mut store = seeded_store().await;
        store.fail_next_fetch(Collection::Signals);
        let mut detector = ChangeDetector::new(Duration::from_secs(1));

        let outcome = detector.poll(&mut store, &open_gate()).await.unwrap();
        assert_eq!(outcome.changes, vec![change(Collection::Trains, 1, "Platform A")]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(
            outcome.failures.first().map(|f| f.collection),
            Some(Collection::Signals)
        );
        assert_eq!(detector.snapshot().len(Collection::Signals), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_reads_are_reported_as_failures() {
        let mut store = seeded_store().await;
        store.set_stalled(true);
        let limit = Duration::from_millis(100);
        let mut detector = ChangeDetector::new(limit);

        let outcome = detector.poll(&mut store, &open_gate()).await.unwrap();
        assert!(outcome.changes.is_empty());
        assert_eq!(
            outcome.failures,
            vec![
                CollectionFailure {
                    collection: Collection::Signals,
                    error: StoreError::Timeout(limit),
                },
                CollectionFailure {
                    collection: Collection::Trains,
                    error: StoreError::Timeout(limit),
                },
            ]
        );
    }

    /// Closes the gate while its reads are in flight, like a concurrent stop.
    struct GateClosingStore {
        inner: MemoryStore,
        gate: PollGate,
    }

    impl StateStore for GateClosingStore {
        fn backend_name(&self) -> &str {
            "gate-closing store"
        }

        async fn open(&mut self) -> Result<(), StoreError> {
            self.inner.open().await
        }

        async fn close(&mut self) {
            self.inner.close().await;
        }

        fn abandon(&mut self) {
            self.inner.abandon();
        }

        async fn ping(&mut self) -> Result<(), StoreError> {
            self.inner.ping().await
        }

        async fn fetch_observed(
            &mut self,
            collection: Collection,
        ) -> Result<Vec<ObservedRow>, StoreError> {
            let rows = self.inner.fetch_observed(collection).await;
            self.gate.close();
            rows
        }

        async fn update_observed(
            &mut self,
            collection: Collection,
            id: EntityId,
            value: &str,
        ) -> Result<u64, StoreError> {
            self.inner.update_observed(collection, id, value).await
        }
    }

    #[tokio::test]
    async fn results_are_discarded_when_stopped_mid_cycle() {
        let gate = open_gate();
        let mut store = GateClosingStore {
            inner: seeded_store().await,
            gate: gate.clone(),
        };
        let mut detector = ChangeDetector::new(Duration::from_secs(1));

        assert_eq!(detector.poll(&mut store, &gate).await, None);
        assert!(detector.snapshot().is_empty());
    }
}
