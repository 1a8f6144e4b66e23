//! Error type for `dwh-store-sqlite`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("reading {path}: {source}")]
  Io {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("walking source directory: {0}")]
  Walk(#[from] walkdir::Error),

  #[error("invalid JSON in {path}: {source}")]
  Json {
    path:   PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("{path}: expected a JSON object per record")]
  NotAnObject { path: PathBuf },

  #[error("no JSON files found at {0}")]
  EmptySource(PathBuf),

  #[error("invalid JSONPaths descriptor {path}: {reason}")]
  JsonPaths { path: PathBuf, reason: String },

  /// A JSON value that does not fit the column's declared type.
  #[error("{path}: column {column}: cannot load {value} as {ty}")]
  Coerce {
    path:   PathBuf,
    column: &'static str,
    value:  String,
    ty:     &'static str,
  },

  #[error("load task failed: {0}")]
  Join(#[from] tokio::task::JoinError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
