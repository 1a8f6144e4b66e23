//! The five set-based transforms that populate the star schema.

use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

use crate::schema::Table;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Transform {
  /// NextSong events joined to the catalog on exact artist and title.
  Songplay,
  /// Latest record per user id.
  Users,
  /// Distinct catalog songs.
  Songs,
  /// Latest-year record per artist id.
  Artists,
  /// Calendar breakdown of every distinct `songplay.start_time`.
  Time,
}

impl Transform {
  /// Execution order. `Time` reads `songplay`, so it must come after
  /// `Songplay`; the rest only read staging.
  pub const ORDERED: [Transform; 5] = [
    Transform::Songplay,
    Transform::Users,
    Transform::Songs,
    Transform::Artists,
    Transform::Time,
  ];

  pub fn target(self) -> Table {
    match self {
      Transform::Songplay => Table::Songplay,
      Transform::Users => Table::Users,
      Transform::Songs => Table::Songs,
      Transform::Artists => Table::Artists,
      Transform::Time => Table::Time,
    }
  }

  pub fn sources(self) -> &'static [Table] {
    match self {
      Transform::Songplay => &[Table::StagingEvents, Table::StagingSongs],
      Transform::Users => &[Table::StagingEvents],
      Transform::Songs | Transform::Artists => &[Table::StagingSongs],
      Transform::Time => &[Table::Songplay],
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::schema::TableKind;

  #[test]
  fn dimensional_sources_are_populated_first() {
    for (i, t) in Transform::ORDERED.iter().enumerate() {
      for source in t.sources() {
        if source.kind() == TableKind::Staging {
          continue;
        }
        let producer = Transform::ORDERED
          .iter()
          .position(|p| p.target() == *source)
          .expect("no transform produces this source");
        assert!(producer < i, "{t} runs before {source} is populated");
      }
    }
  }

  #[test]
  fn targets_cover_the_star_schema() {
    let targets: Vec<_> = Transform::ORDERED.iter().map(|t| t.target()).collect();
    assert_eq!(targets, Table::DIMENSIONAL);
  }
}
