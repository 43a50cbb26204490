//! Error types for the data layer.
//!
//! Store-seam calls report [`railsync_core::store::StoreError`]; [`DbError`]
//! is for the operations outside the seam (provisioning, roster reads).

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// No connection is open.
    #[error("Database not connected")]
    NotConnected,
}
