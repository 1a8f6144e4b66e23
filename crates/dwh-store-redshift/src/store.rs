//! [`RedshiftWarehouse`], the Redshift implementation of [`Warehouse`].

use dwh_core::{
  audit::DuplicateKey,
  schema::Table,
  staging::CopySpec,
  transform::Transform,
  warehouse::Warehouse,
};
use serde::Deserialize;
use sqlx::{
  PgPool, Row as _,
  postgres::{PgConnectOptions, PgPoolOptions},
};
use tracing::debug;

use crate::{Error, Result, sql};

/// Where the cluster accepts connections.
#[derive(Debug, Clone, Deserialize)]
pub struct RedshiftConfig {
  pub host:     String,
  pub port:     u16,
  pub database: String,
  pub user:     String,
  pub password: String,
}

/// A warehouse session on a Redshift cluster.
///
/// Cloning is cheap; the pool is reference-counted. The pool holds a single
/// connection, so statements are issued strictly one at a time.
#[derive(Clone)]
pub struct RedshiftWarehouse {
  pool: PgPool,
}

impl RedshiftWarehouse {
  pub async fn connect(config: &RedshiftConfig) -> Result<Self> {
    let options = PgConnectOptions::new()
      .host(&config.host)
      .port(config.port)
      .database(&config.database)
      .username(&config.user)
      .password(&config.password);
    let pool = PgPoolOptions::new()
      .max_connections(1)
      .connect_with(options)
      .await?;
    Ok(Self { pool })
  }

  async fn execute(&self, statement: &str) -> Result<u64> {
    debug!(%statement, "execute");
    let done = sqlx::raw_sql(statement).execute(&self.pool).await?;
    Ok(done.rows_affected())
  }

  async fn query_count(&self, statement: &str) -> Result<u64> {
    let row = sqlx::raw_sql(statement)
      .fetch_optional(&self.pool)
      .await?
      .ok_or_else(|| Error::UnexpectedResult { statement: statement.to_owned() })?;
    let count: i64 = row.try_get(0)?;
    Ok(count.max(0) as u64)
  }
}

// ─── Warehouse impl ──────────────────────────────────────────────────────────

impl Warehouse for RedshiftWarehouse {
  type Error = Error;

  async fn drop_table(&self, table: Table) -> Result<()> {
    self.execute(&sql::drop_table(table)).await?;
    Ok(())
  }

  async fn create_table(&self, table: Table) -> Result<()> {
    self.execute(&sql::create_table(table)).await?;
    Ok(())
  }

  async fn truncate_table(&self, table: Table) -> Result<()> {
    self.execute(&sql::truncate(table)).await?;
    Ok(())
  }

  async fn copy_into<'a>(&'a self, copy: &'a CopySpec) -> Result<()> {
    // Credentials travel inside the statement, so it is not logged.
    let loaded = sqlx::raw_sql(&sql::copy(copy)).execute(&self.pool).await?;
    debug!(table = %copy.table, rows = loaded.rows_affected(), "copied");
    Ok(())
  }

  async fn run_transform(&self, transform: Transform) -> Result<()> {
    let inserted = self.execute(sql::transform(transform)).await?;
    debug!(%transform, rows = inserted, "inserted");
    Ok(())
  }

  async fn table_exists(&self, table: Table) -> Result<bool> {
    Ok(self.query_count(&sql::table_exists(table)).await? > 0)
  }

  async fn count_rows(&self, table: Table) -> Result<u64> {
    self.query_count(&sql::count_rows(table)).await
  }

  async fn find_duplicates(&self, table: Table) -> Result<Vec<DuplicateKey>> {
    let Some(statement) = sql::duplicates(table) else {
      return Ok(Vec::new());
    };
    let rows = sqlx::raw_sql(&statement).fetch_all(&self.pool).await?;
    rows
      .iter()
      .map(|row| -> Result<DuplicateKey> {
        Ok(DuplicateKey {
          key:   row.try_get::<Option<String>, _>(0)?.unwrap_or_else(|| "NULL".into()),
          count: row.try_get(1)?,
        })
      })
      .collect()
  }
}
