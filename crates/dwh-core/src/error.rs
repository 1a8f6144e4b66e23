//! Error types for `dwh-core`.

use thiserror::Error;

use crate::{audit::AuditReport, schema::Table};

#[derive(Debug, Error)]
pub enum Error {
  /// A statement issued against the warehouse failed. The run stops here;
  /// statements already committed stay committed.
  #[error("{op} failed: {source}")]
  Warehouse {
    op:     String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("table {table} already holds {rows} rows; reset the schema before transforming")]
  DimensionsNotEmpty { table: Table, rows: u64 },

  #[error("integrity audit found {} duplicate keys", .0.violation_count())]
  DuplicatesFound(AuditReport),
}

impl Error {
  pub(crate) fn warehouse<E>(op: impl Into<String>) -> impl FnOnce(E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    let op = op.into();
    move |e| Self::Warehouse { op, source: Box::new(e) }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
