//! `PostgreSQL` implementation of the store seam.
//!
//! [`PgStore`] holds at most one [`PgConnection`], registered under the
//! configured connection name as its `application_name`. Queries are built
//! at runtime (not compile-time checked) so no live database is needed to
//! build, and every value is bound as a parameter.

use railsync_core::config::StoreConfig;
use railsync_core::store::{ObservedRow, StateStore, StoreError};
use railsync_types::{Collection, EntityId, Signal, Train};
use sqlx::postgres::PgConnectOptions;
use sqlx::{ConnectOptions, Connection, PgConnection};
use tracing::{info, warn};

use crate::error::DbError;
use crate::schema;

/// Observed-field reads, ordered by id.
const SELECT_SIGNAL_STATES: &str = "SELECT signal_id, state FROM railway_signals ORDER BY signal_id";
const SELECT_TRAIN_POSITIONS: &str =
    "SELECT train_id, current_position FROM railway_trains ORDER BY train_id";

/// Observed-field writes.
const UPDATE_SIGNAL_STATE: &str =
    "UPDATE railway_signals SET state = $1, last_updated = CURRENT_TIMESTAMP WHERE signal_id = $2";
const UPDATE_TRAIN_POSITION: &str = "UPDATE railway_trains SET current_position = $1, \
     last_updated = CURRENT_TIMESTAMP WHERE train_id = $2";

/// Full roster reads.
const SELECT_SIGNALS: &str = "SELECT signal_id, name, state, track_section, last_updated \
     FROM railway_signals ORDER BY signal_id";
const SELECT_TRAINS: &str = "SELECT train_id, name, current_position, status, last_updated \
     FROM railway_trains ORDER BY train_id";

/// `(id, name, observed field, secondary text column, last_updated)`.
type RosterRow = (
    i32,
    String,
    Option<String>,
    Option<String>,
    Option<chrono::NaiveDateTime>,
);

/// A [`StateStore`] backed by one `PostgreSQL` connection.
#[derive(Debug)]
pub struct PgStore {
    config: StoreConfig,
    conn: Option<PgConnection>,
}

impl PgStore {
    /// Create a store for `config`. No connection is opened yet.
    pub const fn new(config: StoreConfig) -> Self {
        Self { config, conn: None }
    }

    /// Build connect options from the config, resolving the password from
    /// the environment.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MissingSecret`] if the password variable is
    /// unset.
    pub fn connect_options(&self) -> Result<PgConnectOptions, StoreError> {
        let password = self
            .config
            .password()
            .ok_or_else(|| StoreError::MissingSecret(self.config.password_env.clone()))?;
        Ok(PgConnectOptions::new()
            .host(&self.config.host)
            .port(self.config.port)
            .database(&self.config.database)
            .username(&self.config.user)
            .password(&password)
            .application_name(&self.config.connection_name)
            .disable_statement_logging())
    }

    /// Read every signal with its display columns.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotConnected`] without a connection and
    /// [`DbError::Postgres`] if the query fails.
    pub async fn load_signals(&mut self) -> Result<Vec<Signal>, DbError> {
        let conn = self.conn.as_mut().ok_or(DbError::NotConnected)?;
        let rows: Vec<RosterRow> = sqlx::query_as(SELECT_SIGNALS).fetch_all(conn).await?;
        Ok(rows
            .into_iter()
            .map(|(id, name, state, section, updated_at)| Signal {
                id: EntityId(id),
                name,
                state: state.unwrap_or_default(),
                section,
                updated_at,
            })
            .collect())
    }

    /// Read every train with its display columns.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotConnected`] without a connection and
    /// [`DbError::Postgres`] if the query fails.
    pub async fn load_trains(&mut self) -> Result<Vec<Train>, DbError> {
        let conn = self.conn.as_mut().ok_or(DbError::NotConnected)?;
        let rows: Vec<RosterRow> = sqlx::query_as(SELECT_TRAINS).fetch_all(conn).await?;
        Ok(rows
            .into_iter()
            .map(|(id, name, position, status, updated_at)| Train {
                id: EntityId(id),
                name,
                position: position.unwrap_or_default(),
                status,
                updated_at,
            })
            .collect())
    }

    /// Run provisioning on the fresh connection if configured. Failures are
    /// logged and leave the connection usable.
    async fn provision_if_configured(&mut self) {
        if !self.config.provision_schema {
            return;
        }
        let seed = self.config.seed_when_empty;
        let Some(conn) = self.conn.as_mut() else {
            return;
        };
        if let Err(err) = schema::provision(conn, seed).await {
            warn!(error = %err, "Schema provisioning failed");
        }
    }

    fn connection(&mut self) -> Result<&mut PgConnection, StoreError> {
        self.conn.as_mut().ok_or(StoreError::NotOpen)
    }
}

/// Sort a driver error into a connection-level or statement-level failure,
/// keeping the driver's own text.
fn classify(err: &sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed => StoreError::Unreachable(err.to_string()),
        _ => StoreError::Query(err.to_string()),
    }
}

impl StateStore for PgStore {
    fn backend_name(&self) -> &str {
        "PostgreSQL"
    }

    async fn open(&mut self) -> Result<(), StoreError> {
        self.close().await;
        let options = self.connect_options()?;
        let conn = options.connect().await.map_err(|err| {
            // A refused login or unknown database is still "could not connect".
            if matches!(err, sqlx::Error::Database(_)) {
                StoreError::Unreachable(err.to_string())
            } else {
                classify(&err)
            }
        })?;
        info!(
            host = %self.config.host,
            port = self.config.port,
            database = %self.config.database,
            connection = %self.config.connection_name,
            "Connected to PostgreSQL"
        );
        self.conn = Some(conn);
        self.provision_if_configured().await;
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err(err) = conn.close().await {
                warn!(error = %err, "Error while closing PostgreSQL connection");
            }
        }
    }

    fn abandon(&mut self) {
        // Dropping the connection closes the socket without the terminate
        // message.
        if self.conn.take().is_some() {
            warn!(
                connection = %self.config.connection_name,
                "PostgreSQL connection abandoned without a clean close"
            );
        }
    }

    async fn ping(&mut self) -> Result<(), StoreError> {
        let conn = self.connection()?;
        sqlx::query("SELECT 1")
            .execute(conn)
            .await
            .map_err(|err| classify(&err))?;
        Ok(())
    }

    async fn fetch_observed(
        &mut self,
        collection: Collection,
    ) -> Result<Vec<ObservedRow>, StoreError> {
        let sql = match collection {
            Collection::Signals => SELECT_SIGNAL_STATES,
            Collection::Trains => SELECT_TRAIN_POSITIONS,
        };
        let conn = self.connection()?;
        let rows: Vec<(i32, Option<String>)> = sqlx::query_as(sql)
            .fetch_all(conn)
            .await
            .map_err(|err| classify(&err))?;
        Ok(rows
            .into_iter()
            .map(|(id, value)| ObservedRow::new(id, value.unwrap_or_default()))
            .collect())
    }

    async fn update_observed(
        &mut self,
        collection: Collection,
        id: EntityId,
        value: &str,
    ) -> Result<u64, StoreError> {
        let sql = match collection {
            Collection::Signals => UPDATE_SIGNAL_STATE,
            Collection::Trains => UPDATE_TRAIN_POSITION,
        };
        let conn = self.connection()?;
        let result = sqlx::query(sql)
            .bind(value)
            .bind(id.into_inner())
            .execute(conn)
            .await
            .map_err(|err| classify(&err))?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn missing_password_is_reported_by_variable_name() {
        let config = StoreConfig {
            password_env: "RAILSYNC_TEST_UNSET_PASSWORD_VAR".to_owned(),
            ..StoreConfig::default()
        };
        let store = PgStore::new(config);
        assert_eq!(
            store.connect_options().unwrap_err(),
            StoreError::MissingSecret("RAILSYNC_TEST_UNSET_PASSWORD_VAR".to_owned())
        );
    }

    #[test]
    fn io_errors_count_as_unreachable() {
        let io = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(matches!(classify(&io), StoreError::Unreachable(_)));
        assert!(matches!(
            classify(&sqlx::Error::RowNotFound),
            StoreError::Query(_)
        ));
    }

    #[tokio::test]
    async fn calls_before_open_are_not_open() {
        let mut store = PgStore::new(StoreConfig::default());
        assert_eq!(store.ping().await, Err(StoreError::NotOpen));
        assert_eq!(
            store.fetch_observed(Collection::Signals).await,
            Err(StoreError::NotOpen)
        );
        assert!(matches!(store.load_trains().await, Err(DbError::NotConnected)));
        store.close().await;
        store.abandon();
        assert_eq!(store.ping().await, Err(StoreError::NotOpen));
    }

    #[test]
    fn backend_name_matches_status_text() {
        let store = PgStore::new(StoreConfig::default());
        assert_eq!(store.backend_name(), "PostgreSQL");
    }
}
