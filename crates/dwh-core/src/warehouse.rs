//! The `Warehouse` trait.
//!
//! Implemented by `dwh-store-redshift` and `dwh-store-sqlite`. The pipeline
//! depends on this abstraction only. Every method issues one statement and
//! commits it before returning; there is no multi-statement transaction.

use std::future::Future;

use crate::{
  audit::DuplicateKey,
  schema::Table,
  staging::CopySpec,
  transform::Transform,
};

pub trait Warehouse: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── DDL ───────────────────────────────────────────────────────────────

  /// `DROP TABLE IF EXISTS`.
  fn drop_table(&self, table: Table) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// `CREATE TABLE IF NOT EXISTS` with the columns from
  /// [`Table::columns`].
  fn create_table(
    &self,
    table: Table,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Data path ─────────────────────────────────────────────────────────

  /// Remove every row, keeping the table.
  fn truncate_table(
    &self,
    table: Table,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Bulk-copy raw JSON records into a staging table.
  fn copy_into<'a>(
    &'a self,
    copy: &'a CopySpec,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Run one `INSERT ... SELECT` transform.
  fn run_transform(
    &self,
    transform: Transform,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  fn table_exists(
    &self,
    table: Table,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn count_rows(&self, table: Table)
  -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Key values of `table` occurring more than once, ordered by key.
  /// Returns nothing for tables without a key column.
  fn find_duplicates(
    &self,
    table: Table,
  ) -> impl Future<Output = Result<Vec<DuplicateKey>, Self::Error>> + Send + '_;
}
