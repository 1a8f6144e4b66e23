//! Redshift backend for the song-play warehouse.
//!
//! Talks the Postgres wire protocol through [`sqlx`]. Statements go out over
//! the simple-query protocol on a single pooled connection, so each one
//! autocommits on its own.

mod sql;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{RedshiftConfig, RedshiftWarehouse};
