//! [`SqliteWarehouse`], the SQLite implementation of [`Warehouse`].

use std::path::Path;

use dwh_core::{
  audit::DuplicateKey,
  schema::Table,
  staging::CopySpec,
  transform::Transform,
  warehouse::Warehouse,
};
use tracing::debug;

use crate::{Result, load, schema, sql};

/// A warehouse backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteWarehouse {
  conn: tokio_rusqlite::Connection,
}

impl SqliteWarehouse {
  /// Open (or create) a warehouse at `path`.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Ok(Self { conn })
  }

  /// Open an in-memory warehouse.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Ok(Self { conn })
  }

  #[cfg(test)]
  pub(crate) fn conn_for_tests(&self) -> &tokio_rusqlite::Connection { &self.conn }

  async fn execute(&self, statement: String) -> Result<usize> {
    debug!(%statement, "execute");
    let changed = self
      .conn
      .call(move |conn| Ok(conn.execute(&statement, [])?))
      .await?;
    Ok(changed)
  }

  async fn query_count(&self, statement: String) -> Result<u64> {
    let count: i64 = self
      .conn
      .call(move |conn| Ok(conn.query_row(&statement, [], |row| row.get(0))?))
      .await?;
    Ok(count.max(0) as u64)
  }
}

// ─── Warehouse impl ──────────────────────────────────────────────────────────

impl Warehouse for SqliteWarehouse {
  type Error = crate::Error;

  async fn drop_table(&self, table: Table) -> Result<()> {
    self.execute(schema::drop_table(table)).await?;
    Ok(())
  }

  async fn create_table(&self, table: Table) -> Result<()> {
    self.execute(schema::create_table(table)).await?;
    Ok(())
  }

  async fn truncate_table(&self, table: Table) -> Result<()> {
    self.execute(format!("DELETE FROM {}", table.name())).await?;
    Ok(())
  }

  async fn copy_into<'a>(&'a self, copy: &'a CopySpec) -> Result<()> {
    let spec = copy.clone();
    let rows = tokio::task::spawn_blocking(move || load::read_rows(&spec)).await??;

    let table = copy.table;
    let insert = schema::insert_all_columns(table);
    let loaded = rows.len();

    // One transaction per copy: the whole source loads or none of it does.
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(&insert)?;
          for row in &rows {
            stmt.execute(rusqlite::params_from_iter(row.iter()))?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    debug!(%table, rows = loaded, "copied");
    Ok(())
  }

  async fn run_transform(&self, transform: Transform) -> Result<()> {
    let inserted = self.execute(sql::transform(transform).to_owned()).await?;
    debug!(%transform, rows = inserted, "inserted");
    Ok(())
  }

  async fn table_exists(&self, table: Table) -> Result<bool> {
    let name = table.name();
    let count: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(sql::TABLE_EXISTS, rusqlite::params![name], |row| row.get(0))?)
      })
      .await?;
    Ok(count > 0)
  }

  async fn count_rows(&self, table: Table) -> Result<u64> {
    self.query_count(sql::count_rows(table)).await
  }

  async fn find_duplicates(&self, table: Table) -> Result<Vec<DuplicateKey>> {
    let Some(statement) = sql::duplicates(table) else {
      return Ok(Vec::new());
    };

    let duplicates = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&statement)?;
        let rows = stmt
          .query_map([], |row| {
            Ok(DuplicateKey {
              key:   row.get::<_, Option<String>>(0)?.unwrap_or_else(|| "NULL".into()),
              count: row.get(1)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(duplicates)
  }
}
