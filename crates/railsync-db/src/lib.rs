//! `PostgreSQL` backing store for railsync.
//!
//! [`PgStore`] implements [`railsync_core::store::StateStore`] over a single
//! named [`sqlx::PgConnection`]. The core only ever holds one connection and
//! drives it from one task, so there is no pool.
//!
//! # Modules
//!
//! - [`postgres`] -- [`PgStore`]: connect, ping, observed reads and updates, roster reads
//! - [`schema`] -- Optional table provisioning and demo seed rows
//! - [`error`] -- Shared error types

pub mod error;
pub mod postgres;
pub mod schema;

pub use error::DbError;
pub use postgres::PgStore;
