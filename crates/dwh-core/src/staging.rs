//! Bulk-load descriptors for the staging tables.
//!
//! Source locations and credentials are opaque: they are passed through to
//! the warehouse's bulk loader untouched.

use serde::{Deserialize, Serialize};

use crate::schema::Table;

/// How JSON records map onto staging columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum JsonFormat {
  /// Match top-level keys to column names.
  Auto,
  /// Positional mapping through a JSONPaths descriptor at this location.
  JsonPaths(String),
}

/// One bulk-copy statement: everything the loader needs, nothing it
/// interprets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopySpec {
  pub table:    Table,
  pub source:   String,
  pub format:   JsonFormat,
  pub role_arn: String,
  pub region:   String,
}

/// Where the raw data lives and which identity reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingConfig {
  /// Event log records.
  pub log_data:     String,
  /// JSONPaths descriptor for the event log records.
  pub log_jsonpath: String,
  /// Song catalog records.
  pub song_data:    String,
  pub role_arn:     String,
  pub region:       String,
}

impl StagingConfig {
  /// The two copies in load order: events, then songs.
  pub fn copies(&self) -> [CopySpec; 2] {
    [
      CopySpec {
        table:    Table::StagingEvents,
        source:   self.log_data.clone(),
        format:   JsonFormat::JsonPaths(self.log_jsonpath.clone()),
        role_arn: self.role_arn.clone(),
        region:   self.region.clone(),
      },
      CopySpec {
        table:    Table::StagingSongs,
        source:   self.song_data.clone(),
        format:   JsonFormat::Auto,
        role_arn: self.role_arn.clone(),
        region:   self.region.clone(),
      },
    ]
  }

  /// Replace the role ARN, e.g. with the one resolved while provisioning.
  pub fn with_role_arn(mut self, role_arn: impl Into<String>) -> Self {
    self.role_arn = role_arn.into();
    self
  }
}
