//! Table provisioning and demo seed data.
//!
//! Opt-in through `store.provision_schema` and `store.seed_when_empty`.
//! Both steps are idempotent: tables are created only if missing, and seed
//! rows go only into tables that are empty.

use sqlx::PgConnection;
use tracing::info;

use crate::error::DbError;

/// DDL for the signals table.
const CREATE_SIGNALS: &str = "CREATE TABLE IF NOT EXISTS railway_signals (
    signal_id SERIAL PRIMARY KEY,
    name VARCHAR(50) NOT NULL,
    state VARCHAR(10) DEFAULT 'RED',
    track_section VARCHAR(50),
    last_updated TIMESTAMP DEFAULT CURRENT_TIMESTAMP
)";

/// DDL for the trains table.
const CREATE_TRAINS: &str = "CREATE TABLE IF NOT EXISTS railway_trains (
    train_id SERIAL PRIMARY KEY,
    name VARCHAR(50) NOT NULL,
    current_position VARCHAR(100),
    status VARCHAR(20) DEFAULT 'STOPPED',
    last_updated TIMESTAMP DEFAULT CURRENT_TIMESTAMP
)";

/// Demo signals: `(name, state, track_section)`.
pub const SEED_SIGNALS: [(&str, &str, &str); 3] = [
    ("Signal A1", "RED", "Platform A"),
    ("Signal B2", "GREEN", "Junction B"),
    ("Signal C3", "YELLOW", "Section C"),
];

/// Demo trains: `(name, current_position, status)`.
pub const SEED_TRAINS: [(&str, &str, &str); 2] = [
    ("Train 001", "Platform A", "STOPPED"),
    ("Train 002", "Junction B", "MOVING"),
];

/// What [`provision`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    /// Signal rows inserted.
    pub signals_seeded: usize,
    /// Train rows inserted.
    pub trains_seeded: usize,
}

/// Create the tracked tables if missing and, when `seed` is set, fill empty
/// ones with the demo rows.
///
/// # Errors
///
/// Returns [`DbError::Postgres`] if any statement fails.
pub async fn provision(conn: &mut PgConnection, seed: bool) -> Result<ProvisionReport, DbError> {
    sqlx::query(CREATE_SIGNALS).execute(&mut *conn).await?;
    sqlx::query(CREATE_TRAINS).execute(&mut *conn).await?;

    let mut report = ProvisionReport::default();
    if seed {
        report.signals_seeded = seed_signals(conn).await?;
        report.trains_seeded = seed_trains(conn).await?;
    }

    info!(
        signals_seeded = report.signals_seeded,
        trains_seeded = report.trains_seeded,
        "Schema provisioned"
    );
    Ok(report)
}

async fn table_is_empty(conn: &mut PgConnection, table: &str) -> Result<bool, DbError> {
    // Table names come from the constants above, never from input.
    let sql = format!("SELECT EXISTS (SELECT 1 FROM {table})");
    let (has_rows,): (bool,) = sqlx::query_as(&sql).fetch_one(&mut *conn).await?;
    Ok(!has_rows)
}

async fn seed_signals(conn: &mut PgConnection) -> Result<usize, DbError> {
    if !table_is_empty(conn, "railway_signals").await? {
        return Ok(0);
    }
    for (name, state, section) in SEED_SIGNALS {
        sqlx::query("INSERT INTO railway_signals (name, state, track_section) VALUES ($1, $2, $3)")
            .bind(name)
            .bind(state)
            .bind(section)
            .execute(&mut *conn)
            .await?;
    }
    Ok(SEED_SIGNALS.len())
}

async fn seed_trains(conn: &mut PgConnection) -> Result<usize, DbError> {
    if !table_is_empty(conn, "railway_trains").await? {
        return Ok(0);
    }
    for (name, position, status) in SEED_TRAINS {
        sqlx::query(
            "INSERT INTO railway_trains (name, current_position, status) VALUES ($1, $2, $3)",
        )
        .bind(name)
        .bind(position)
        .bind(status)
        .execute(&mut *conn)
        .await?;
    }
    Ok(SEED_TRAINS.len())
}
