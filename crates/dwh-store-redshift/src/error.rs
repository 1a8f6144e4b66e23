//! Error type for `dwh-store-redshift`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("unexpected result from {statement:?}")]
  UnexpectedResult { statement: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
