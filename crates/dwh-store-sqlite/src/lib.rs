//! SQLite backend for the song-play warehouse.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. Bulk copies read JSON records
//! from the local filesystem instead of object storage.

mod load;
mod schema;
mod sql;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteWarehouse;
