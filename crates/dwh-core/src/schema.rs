//! The fixed table catalog: two staging tables mirroring the raw JSON
//! records, and the star schema built from them.
//!
//! Column definitions live here so every backend renders the same shape in
//! its own dialect. Primary keys are informational: the warehouse does not
//! enforce them, which is why the audit exists.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

// ─── Tables ──────────────────────────────────────────────────────────────────

/// Every table the pipeline owns. Dropped and recreated on each run.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Table {
  StagingEvents,
  StagingSongs,
  Songplay,
  Users,
  Songs,
  Artists,
  Time,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
  Staging,
  Fact,
  Dimension,
}

impl Table {
  pub const ALL: [Table; 7] = [
    Table::StagingEvents,
    Table::StagingSongs,
    Table::Songplay,
    Table::Users,
    Table::Songs,
    Table::Artists,
    Table::Time,
  ];

  pub const STAGING: [Table; 2] = [Table::StagingEvents, Table::StagingSongs];

  /// The fact table followed by the four dimensions.
  pub const DIMENSIONAL: [Table; 5] = [
    Table::Songplay,
    Table::Users,
    Table::Songs,
    Table::Artists,
    Table::Time,
  ];

  pub fn name(self) -> &'static str { self.into() }

  pub fn kind(self) -> TableKind {
    match self {
      Table::StagingEvents | Table::StagingSongs => TableKind::Staging,
      Table::Songplay => TableKind::Fact,
      Table::Users | Table::Songs | Table::Artists | Table::Time => {
        TableKind::Dimension
      }
    }
  }

  pub fn columns(self) -> &'static [Column] {
    match self {
      Table::StagingEvents => STAGING_EVENTS,
      Table::StagingSongs => STAGING_SONGS,
      Table::Songplay => SONGPLAY,
      Table::Users => USERS,
      Table::Songs => SONGS,
      Table::Artists => ARTISTS,
      Table::Time => TIME,
    }
  }

  /// The key column the audit groups on. Staging tables have none.
  pub fn key(self) -> Option<&'static Column> {
    self.columns().iter().find(|c| c.constraint != Constraint::None)
  }
}

// ─── Columns ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
  Varchar,
  Char(u8),
  Integer,
  BigInt,
  Float,
  Timestamp,
}

impl ColumnType {
  pub fn is_numeric(self) -> bool {
    matches!(self, Self::Integer | Self::BigInt | Self::Float)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
  None,
  /// Declared primary key. `NOT NULL`, uniqueness is not enforced.
  PrimaryKey,
  /// Warehouse-generated surrogate key.
  Identity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
  pub name:       &'static str,
  pub ty:         ColumnType,
  pub constraint: Constraint,
}

const fn col(name: &'static str, ty: ColumnType) -> Column {
  Column { name, ty, constraint: Constraint::None }
}

const fn pk(name: &'static str, ty: ColumnType) -> Column {
  Column { name, ty, constraint: Constraint::PrimaryKey }
}

const fn identity(name: &'static str) -> Column {
  Column { name, ty: ColumnType::Integer, constraint: Constraint::Identity }
}

use ColumnType::{BigInt, Char, Float, Integer, Timestamp, Varchar};

const STAGING_EVENTS: &[Column] = &[
  col("artist", Varchar),
  col("auth", Varchar),
  col("firstName", Varchar),
  col("gender", Char(1)),
  col("itemInSession", Integer),
  col("lastName", Varchar),
  col("length", Float),
  col("level", Varchar),
  col("location", Varchar),
  col("method", Varchar),
  col("page", Varchar),
  col("registration", Float),
  col("sessionId", Integer),
  col("song", Varchar),
  col("status", Integer),
  col("ts", BigInt),
  col("userAgent", Varchar),
  col("userId", Integer),
];

const STAGING_SONGS: &[Column] = &[
  col("num_songs", Integer),
  col("artist_id", Varchar),
  col("artist_latitude", Float),
  col("artist_longitude", Float),
  col("artist_location", Varchar),
  col("artist_name", Varchar),
  col("song_id", Varchar),
  col("title", Varchar),
  col("duration", Float),
  col("year", Integer),
];

const SONGPLAY: &[Column] = &[
  identity("songplay_id"),
  col("start_time", Timestamp),
  col("user_id", Integer),
  col("level", Varchar),
  col("song_id", Varchar),
  col("artist_id", Varchar),
  col("session_id", Integer),
  col("location", Varchar),
  col("user_agent", Varchar),
];

const USERS: &[Column] = &[
  pk("user_id", Integer),
  col("first_name", Varchar),
  col("last_name", Varchar),
  col("gender", Char(1)),
  col("level", Varchar),
];

const SONGS: &[Column] = &[
  pk("song_id", Varchar),
  col("title", Varchar),
  col("artist_id", Varchar),
  col("year", Integer),
  col("duration", Float),
];

const ARTISTS: &[Column] = &[
  pk("artist_id", Varchar),
  col("name", Varchar),
  col("location", Varchar),
  col("latitude", Float),
  col("longitude", Float),
];

const TIME: &[Column] = &[
  pk("start_time", Timestamp),
  col("hour", Integer),
  col("day", Integer),
  col("week", Integer),
  col("month", Integer),
  col("year", Integer),
  col("weekday", Integer),
];

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn names_are_snake_case() {
    assert_eq!(Table::StagingEvents.name(), "staging_events");
    assert_eq!(Table::Songplay.to_string(), "songplay");
    assert_eq!("time".parse::<Table>().unwrap(), Table::Time);
  }

  #[test]
  fn every_dimensional_table_has_a_key() {
    for table in Table::DIMENSIONAL {
      assert!(table.key().is_some(), "{table} has no key column");
    }
    for table in Table::STAGING {
      assert!(table.key().is_none());
    }
  }

  #[test]
  fn audit_keys_match_the_star_schema() {
    let keys: Vec<_> = Table::DIMENSIONAL
      .iter()
      .map(|t| t.key().unwrap().name)
      .collect();
    assert_eq!(keys, ["songplay_id", "user_id", "song_id", "artist_id", "start_time"]);
  }

  #[test]
  fn partitions_cover_all_tables() {
    let mut joined: Vec<_> = Table::STAGING.to_vec();
    joined.extend(Table::DIMENSIONAL);
    assert_eq!(joined, Table::ALL);
    assert_eq!(Table::Songplay.kind(), TableKind::Fact);
    assert_eq!(Table::Artists.kind(), TableKind::Dimension);
  }
}
