//! DDL rendering for SQLite.
//!
//! Declared primary keys become `NOT NULL` columns without a uniqueness
//! constraint, matching the warehouse where they are informational only.
//! Timestamps are stored as `YYYY-MM-DD HH:MM:SS` text.

use dwh_core::schema::{Column, ColumnType, Constraint, Table};

pub fn drop_table(table: Table) -> String {
  format!("DROP TABLE IF EXISTS {}", table.name())
}

pub fn create_table(table: Table) -> String {
  let columns = table
    .columns()
    .iter()
    .map(column_def)
    .collect::<Vec<_>>()
    .join(",\n    ");
  format!("CREATE TABLE IF NOT EXISTS {} (\n    {columns}\n)", table.name())
}

fn column_def(column: &Column) -> String {
  let ty = match column.ty {
    ColumnType::Varchar | ColumnType::Char(_) | ColumnType::Timestamp => "TEXT",
    ColumnType::Integer | ColumnType::BigInt => "INTEGER",
    ColumnType::Float => "REAL",
  };
  match column.constraint {
    Constraint::None => format!("{} {ty}", column.name),
    Constraint::PrimaryKey => format!("{} {ty} NOT NULL", column.name),
    Constraint::Identity => format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", column.name),
  }
}

/// `INSERT` with one positional parameter per column, in column order.
pub fn insert_all_columns(table: Table) -> String {
  let columns = table.columns();
  let names = columns.iter().map(|c| c.name).collect::<Vec<_>>().join(", ");
  let params = (1..=columns.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
  format!("INSERT INTO {} ({names}) VALUES ({params})", table.name())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn keys_are_not_unique() {
    let ddl = create_table(Table::Users);
    assert!(ddl.contains("user_id INTEGER NOT NULL"));
    assert!(!ddl.contains("PRIMARY KEY"));
  }

  #[test]
  fn identity_becomes_autoincrement() {
    let ddl = create_table(Table::Songplay);
    assert!(ddl.contains("songplay_id INTEGER PRIMARY KEY AUTOINCREMENT"));
    assert!(ddl.contains("start_time TEXT"));
  }

  #[test]
  fn insert_binds_every_column() {
    let sql = insert_all_columns(Table::StagingSongs);
    assert!(sql.starts_with("INSERT INTO staging_songs (num_songs, artist_id,"));
    assert!(sql.ends_with("?9, ?10)"));
  }
}
