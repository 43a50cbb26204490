//! Backing store seam.
//!
//! [`StateStore`] is the narrow surface the engine needs from the relational
//! store: open/close one connection, a trivial round trip, read the observed
//! field of every row in a collection, and update one row's observed field.
//! `railsync-db` implements it for `PostgreSQL`; [`MemoryStore`] implements it
//! in-process so the engine can be exercised without a database.
//!
//! Store calls are not trusted to return promptly. The core wraps every call
//! in [`bounded`], which turns an overrun into [`StoreError::Timeout`]. A
//! close that overruns is cut short with [`StateStore::abandon`].

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use railsync_types::{Collection, EntityId};

/// Errors reported by a [`StateStore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or refused the connection. Carries the
    /// store's own error text.
    #[error("{0}")]
    Unreachable(String),

    /// A statement failed on an otherwise open connection.
    #[error("{0}")]
    Query(String),

    /// The call did not complete within its time budget.
    #[error("store call timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// No connection is open.
    #[error("connection is not open")]
    NotOpen,

    /// The credential could not be resolved.
    #[error("password variable {0} is not set")]
    MissingSecret(String),
}

/// The id and observed value of one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedRow {
    /// Row primary key.
    pub id: EntityId,
    /// Current value of the collection's observed field.
    pub value: String,
}

impl ObservedRow {
    /// Build a row from its parts.
    pub fn new(id: impl Into<EntityId>, value: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
        }
    }
}

/// A relational store holding the tracked collections.
///
/// Implementations own at most one connection and are driven from a single
/// task; methods take `&mut self` and are never called concurrently.
pub trait StateStore: Send {
    /// Short name of the backend, used in status text ("Connected to ...").
    fn backend_name(&self) -> &str;

    /// Open the connection, replacing any existing one.
    fn open(&mut self) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Close the connection gracefully. Closing an already closed store is a
    /// no-op.
    fn close(&mut self) -> impl Future<Output = ()> + Send;

    /// Drop the connection at once without saying goodbye to the server.
    /// Used when a graceful [`close`](Self::close) does not finish in time.
    fn abandon(&mut self);

    /// Issue a trivial round trip (`SELECT 1`).
    fn ping(&mut self) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Read `(id, observed value)` for every row, ordered by id ascending.
    fn fetch_observed(
        &mut self,
        collection: Collection,
    ) -> impl Future<Output = Result<Vec<ObservedRow>, StoreError>> + Send;

    /// Set the observed field of one row and stamp `last_updated`.
    ///
    /// Returns the number of rows affected (0 when the id does not exist).
    fn update_observed(
        &mut self,
        collection: Collection,
        id: EntityId,
        value: &str,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;
}

/// Run a store call with a time limit.
///
/// # Errors
///
/// Returns the call's own error, or [`StoreError::Timeout`] if `limit`
/// elapses first.
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_elapsed| StoreError::Timeout(limit))?
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Text reported when the in-process store is made unreachable.
const UNREACHABLE_TEXT: &str = "could not connect to server: Connection refused";

/// Text reported when a read or write hits a dropped connection.
const DROPPED_TEXT: &str = "server closed the connection unexpectedly";

/// Tables and fault switches behind a [`MemoryStore`].
#[derive(Debug)]
struct MemoryTables {
    rows: BTreeMap<Collection, BTreeMap<EntityId, String>>,
    open: bool,
    reachable: bool,
    stalled: bool,
    close_hangs: bool,
    failing_fetches: BTreeSet<Collection>,
    writes: u64,
}

impl Default for MemoryTables {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            open: false,
            reachable: true,
            stalled: false,
            close_hangs: false,
            failing_fetches: BTreeSet::new(),
            writes: 0,
        }
    }
}

/// In-process [`StateStore`] with fault injection.
///
/// Clones share the same tables, so a test can hand one clone to the engine
/// and keep another to change rows out of band or break the connection.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryTables>>,
}

impl MemoryStore {
    /// Create an empty, reachable store.
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, MemoryTables> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a row's observed value, bypassing the engine.
    pub fn put(&self, collection: Collection, id: impl Into<EntityId>, value: impl Into<String>) {
        self.tables()
            .rows
            .entry(collection)
            .or_default()
            .insert(id.into(), value.into());
    }

    /// Insert or replace a signal's state.
    pub fn put_signal(&self, id: i32, state: &str) {
        self.put(Collection::Signals, id, state);
    }

    /// Insert or replace a train's position.
    pub fn put_train(&self, id: i32, position: &str) {
        self.put(Collection::Trains, id, position);
    }

    /// Delete a row. Returns whether it existed.
    pub fn remove(&self, collection: Collection, id: impl Into<EntityId>) -> bool {
        self.tables()
            .rows
            .get_mut(&collection)
            .is_some_and(|rows| rows.remove(&id.into()).is_some())
    }

    /// Current stored value of a row.
    pub fn value(&self, collection: Collection, id: impl Into<EntityId>) -> Option<String> {
        self.tables()
            .rows
            .get(&collection)
            .and_then(|rows| rows.get(&id.into()).cloned())
    }

    /// Make the server reachable or not. Going unreachable drops the open
    /// connection, as a server restart would.
    pub fn set_reachable(&self, reachable: bool) {
        let mut tables = self.tables();
        tables.reachable = reachable;
        if !reachable {
            tables.open = false;
        }
    }

    /// Make every call hang until un-stalled (exercises timeouts).
    pub fn set_stalled(&self, stalled: bool) {
        self.tables().stalled = stalled;
    }

    /// Make a graceful close of an open connection hang, as a server that
    /// never answers the terminate message would.
    pub fn set_close_hangs(&self, hangs: bool) {
        self.tables().close_hangs = hangs;
    }

    /// Fail the next read of `collection` with a query error.
    pub fn fail_next_fetch(&self, collection: Collection) {
        self.tables().failing_fetches.insert(collection);
    }

    /// Number of update statements that reached the store.
    pub fn write_count(&self) -> u64 {
        self.tables().writes
    }

    /// Whether a connection is currently open.
    pub fn is_open(&self) -> bool {
        self.tables().open
    }

    /// Wait forever if stalled. The lock is released before waiting.
    async fn stall_point(&self) {
        let stalled = self.tables().stalled;
        if stalled {
            std::future::pending::<()>().await;
        }
    }

    /// Check that a statement can run on the current connection.
    fn usable(tables: &MemoryTables) -> Result<(), StoreError> {
        if !tables.reachable {
            return Err(StoreError::Query(DROPPED_TEXT.to_owned()));
        }
        if !tables.open {
            return Err(StoreError::NotOpen);
        }
        Ok(())
    }
}

impl StateStore for MemoryStore {
    fn backend_name(&self) -> &str {
        "memory store"
    }

    async fn open(&mut self) -> Result<(), StoreError> {
        self.stall_point().await;
        let mut tables = self.tables();
        if !tables.reachable {
            tables.open = false;
            return Err(StoreError::Unreachable(UNREACHABLE_TEXT.to_owned()));
        }
        tables.open = true;
        Ok(())
    }

    async fn close(&mut self) {
        let hangs = {
            let tables = self.tables();
            tables.open && tables.close_hangs
        };
        if hangs {
            std::future::pending::<()>().await;
        }
        self.tables().open = false;
    }

    fn abandon(&mut self) {
        self.tables().open = false;
    }

    async fn ping(&mut self) -> Result<(), StoreError> {
        self.stall_point().await;
        let tables = self.tables();
        if !tables.reachable {
            return Err(StoreError::Unreachable(DROPPED_TEXT.to_owned()));
        }
        Self::usable(&tables)
    }

    async fn fetch_observed(&mut self, collection: Collection) -> Result<Vec<ObservedRow>, StoreError> {
        self.stall_point().await;
        let mut tables = self.tables();
        Self::usable(&tables)?;
        if tables.failing_fetches.remove(&collection) {
            return Err(StoreError::Query(format!(
                "relation for {collection} could not be read"
            )));
        }
        Ok(tables
            .rows
            .get(&collection)
            .map(|rows| {
                rows.iter()
                    .map(|(id, value)| ObservedRow::new(*id, value.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update_observed(
        &mut self,
        collection: Collection,
        id: EntityId,
        value: &str,
    ) -> Result<u64, StoreError> {
        self.stall_point().await;
        let mut tables = self.tables();
        Self::usable(&tables)?;
        tables.writes = tables.writes.saturating_add(1);
        match tables.rows.get_mut(&collection).and_then(|rows| rows.get_mut(&id)) {
            Some(slot) => {
                value.clone_into(slot);
                Ok(1)
            }
            None => Ok(0),
        }
    }
}
