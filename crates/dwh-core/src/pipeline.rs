//! [`Pipeline`]: sequences the four data-path stages against a
//! [`Warehouse`].
//!
//! Stages run strictly in order and statements strictly one at a time. Any
//! warehouse error aborts the stage; nothing is rolled back. Recovery is a
//! rerun from [`Pipeline::reset_schema`].

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
  Error, Result,
  audit::{AuditFinding, AuditPolicy, AuditReport},
  schema::Table,
  staging::StagingConfig,
  transform::Transform,
  warehouse::Warehouse,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOptions {
  pub audit_policy:             AuditPolicy,
  /// Refuse to transform into dimensional tables that already hold rows.
  /// Transforms append, so a second run without a reset duplicates keys.
  pub require_empty_dimensions: bool,
}

impl Default for PipelineOptions {
  fn default() -> Self {
    Self { audit_policy: AuditPolicy::ReportOnly, require_empty_dimensions: true }
  }
}

pub struct Pipeline<W> {
  warehouse: W,
  staging:   StagingConfig,
  options:   PipelineOptions,
}

impl<W: Warehouse> Pipeline<W> {
  pub fn new(warehouse: W, staging: StagingConfig, options: PipelineOptions) -> Self {
    Self { warehouse, staging, options }
  }

  pub fn warehouse(&self) -> &W { &self.warehouse }

  // ── Schema Manager ────────────────────────────────────────────────────

  /// Drop every table, then create every table. All drops complete before
  /// the first create.
  pub async fn reset_schema(&self) -> Result<()> {
    info!("resetting schema");
    for table in Table::ALL {
      debug!(%table, "drop");
      self
        .warehouse
        .drop_table(table)
        .await
        .map_err(Error::warehouse(format!("drop {table}")))?;
    }
    for table in Table::ALL {
      debug!(%table, "create");
      self
        .warehouse
        .create_table(table)
        .await
        .map_err(Error::warehouse(format!("create {table}")))?;
    }
    Ok(())
  }

  // ── Staging Loader ────────────────────────────────────────────────────

  /// Overwrite both staging tables from their sources. Each table is
  /// truncated and then bulk-copied.
  pub async fn load_staging(&self) -> Result<()> {
    for copy in self.staging.copies() {
      self
        .warehouse
        .truncate_table(copy.table)
        .await
        .map_err(Error::warehouse(format!("truncate {}", copy.table)))?;
      info!(table = %copy.table, source = %copy.source, "bulk copy");
      self
        .warehouse
        .copy_into(&copy)
        .await
        .map_err(Error::warehouse(format!("copy into {}", copy.table)))?;
    }
    Ok(())
  }

  // ── Transform Engine ──────────────────────────────────────────────────

  pub async fn transform(&self) -> Result<()> {
    if self.options.require_empty_dimensions {
      self.ensure_dimensions_empty().await?;
    }
    for transform in Transform::ORDERED {
      info!(%transform, "transform");
      self
        .warehouse
        .run_transform(transform)
        .await
        .map_err(Error::warehouse(format!("insert into {}", transform.target())))?;
    }
    Ok(())
  }

  async fn ensure_dimensions_empty(&self) -> Result<()> {
    for table in Table::DIMENSIONAL {
      let rows = self
        .warehouse
        .count_rows(table)
        .await
        .map_err(Error::warehouse(format!("count {table}")))?;
      if rows > 0 {
        return Err(Error::DimensionsNotEmpty { table, rows });
      }
    }
    Ok(())
  }

  // ── Integrity Auditor ─────────────────────────────────────────────────

  /// Look for duplicated keys in every dimensional table. Under
  /// [`AuditPolicy::ReportOnly`] findings are logged and returned; under
  /// [`AuditPolicy::FailOnViolation`] they become
  /// [`Error::DuplicatesFound`].
  pub async fn check_duplicates(&self) -> Result<AuditReport> {
    let mut findings = Vec::with_capacity(Table::DIMENSIONAL.len());
    for table in Table::DIMENSIONAL {
      let Some(key) = table.key() else { continue };
      let duplicates = self
        .warehouse
        .find_duplicates(table)
        .await
        .map_err(Error::warehouse(format!("audit {table}")))?;
      for dup in &duplicates {
        warn!(%table, column = key.name, key = %dup.key, count = dup.count, "duplicate key");
      }
      findings.push(AuditFinding { table, key_column: key.name, duplicates });
    }

    let report = AuditReport { checked_at: Utc::now(), findings };
    if report.is_clean() {
      info!("integrity audit clean");
    } else if self.options.audit_policy == AuditPolicy::FailOnViolation {
      return Err(Error::DuplicatesFound(report));
    } else {
      warn!(violations = report.violation_count(), "integrity audit found duplicates");
    }
    Ok(report)
  }

  /// Reset, load, transform, audit.
  pub async fn run(&self) -> Result<AuditReport> {
    self.reset_schema().await?;
    self.load_staging().await?;
    self.transform().await?;
    self.check_duplicates().await
  }
}

#[cfg(test)]
mod tests {
  use std::{collections::HashMap, sync::Mutex};

  use super::*;
  use crate::{
    audit::DuplicateKey,
    staging::{CopySpec, JsonFormat},
  };

  #[derive(Debug, Clone, PartialEq, Eq)]
  enum Call {
    Drop(Table),
    Create(Table),
    Truncate(Table),
    Copy(CopySpec),
    Transform(Transform),
    Count(Table),
    Audit(Table),
  }

  #[derive(Debug, thiserror::Error)]
  #[error("boom")]
  struct Boom;

  /// Records every call; optionally fails on one.
  #[derive(Default)]
  struct Recorder {
    calls:      Mutex<Vec<Call>>,
    rows:       HashMap<Table, u64>,
    duplicates: HashMap<Table, Vec<DuplicateKey>>,
    fail_on:    Option<Call>,
  }

  impl Recorder {
    fn record(&self, call: Call) -> Result<(), Boom> {
      let fail = self.fail_on.as_ref() == Some(&call);
      self.calls.lock().unwrap().push(call);
      if fail { Err(Boom) } else { Ok(()) }
    }

    fn calls(&self) -> Vec<Call> { self.calls.lock().unwrap().clone() }
  }

  impl Warehouse for Recorder {
    type Error = Boom;

    async fn drop_table(&self, table: Table) -> Result<(), Boom> { self.record(Call::Drop(table)) }

    async fn create_table(&self, table: Table) -> Result<(), Boom> {
      self.record(Call::Create(table))
    }

    async fn truncate_table(&self, table: Table) -> Result<(), Boom> {
      self.record(Call::Truncate(table))
    }

    async fn copy_into<'a>(&'a self, copy: &'a CopySpec) -> Result<(), Boom> {
      self.record(Call::Copy(copy.clone()))
    }

    async fn run_transform(&self, transform: Transform) -> Result<(), Boom> {
      self.record(Call::Transform(transform))
    }

    async fn table_exists(&self, _: Table) -> Result<bool, Boom> { Ok(true) }

    async fn count_rows(&self, table: Table) -> Result<u64, Boom> {
      self.record(Call::Count(table))?;
      Ok(self.rows.get(&table).copied().unwrap_or(0))
    }

    async fn find_duplicates(&self, table: Table) -> Result<Vec<DuplicateKey>, Boom> {
      self.record(Call::Audit(table))?;
      Ok(self.duplicates.get(&table).cloned().unwrap_or_default())
    }
  }

  fn staging() -> StagingConfig {
    StagingConfig {
      log_data:     "s3://bucket/log_data".into(),
      log_jsonpath: "s3://bucket/log_json_path.json".into(),
      song_data:    "s3://bucket/song_data".into(),
      role_arn:     "arn:aws:iam::123:role/dwh".into(),
      region:       "us-west-2".into(),
    }
  }

  fn pipeline(recorder: Recorder, options: PipelineOptions) -> Pipeline<Recorder> {
    Pipeline::new(recorder, staging(), options)
  }

  #[tokio::test]
  async fn reset_drops_everything_before_creating() {
    let p = pipeline(Recorder::default(), PipelineOptions::default());
    p.reset_schema().await.unwrap();

    let calls = p.warehouse().calls();
    assert_eq!(calls.len(), 14);
    let (drops, creates) = calls.split_at(7);
    assert!(drops.iter().all(|c| matches!(c, Call::Drop(_))));
    assert!(creates.iter().all(|c| matches!(c, Call::Create(_))));
    assert_eq!(creates[6], Call::Create(Table::Time));
  }

  #[tokio::test]
  async fn failed_drop_aborts_reset() {
    let recorder = Recorder { fail_on: Some(Call::Drop(Table::Songplay)), ..Default::default() };
    let p = pipeline(recorder, PipelineOptions::default());

    let err = p.reset_schema().await.unwrap_err();
    assert!(matches!(err, Error::Warehouse { ref op, .. } if op == "drop songplay"));
    assert_eq!(p.warehouse().calls().len(), 3);
  }

  #[tokio::test]
  async fn load_passes_sources_through() {
    let p = pipeline(Recorder::default(), PipelineOptions::default());
    p.load_staging().await.unwrap();

    let calls = p.warehouse().calls();
    let [
      Call::Truncate(Table::StagingEvents),
      Call::Copy(events),
      Call::Truncate(Table::StagingSongs),
      Call::Copy(songs),
    ] = calls.as_slice()
    else {
      panic!("expected truncate and copy per staging table, got {calls:?}");
    };
    assert_eq!(events.table, Table::StagingEvents);
    assert_eq!(events.format, JsonFormat::JsonPaths("s3://bucket/log_json_path.json".into()));
    assert_eq!(songs.table, Table::StagingSongs);
    assert_eq!(songs.format, JsonFormat::Auto);
    assert_eq!(songs.role_arn, "arn:aws:iam::123:role/dwh");
    assert_eq!(songs.region, "us-west-2");
  }

  #[tokio::test]
  async fn songplay_is_populated_before_time() {
    let p = pipeline(Recorder::default(), PipelineOptions::default());
    p.transform().await.unwrap();

    let transforms: Vec<_> = p
      .warehouse()
      .calls()
      .into_iter()
      .filter_map(|c| match c {
        Call::Transform(t) => Some(t),
        _ => None,
      })
      .collect();
    assert_eq!(transforms, Transform::ORDERED);
  }

  #[tokio::test]
  async fn failed_insert_stops_remaining_transforms() {
    let recorder = Recorder { fail_on: Some(Call::Transform(Transform::Songs)), ..Default::default() };
    let p = pipeline(recorder, PipelineOptions::default());

    let err = p.transform().await.unwrap_err();
    assert!(matches!(err, Error::Warehouse { ref op, .. } if op == "insert into songs"));

    let attempted: Vec<_> = p
      .warehouse()
      .calls()
      .into_iter()
      .filter_map(|c| match c {
        Call::Transform(t) => Some(t),
        _ => None,
      })
      .collect();
    assert_eq!(attempted, [Transform::Songplay, Transform::Users, Transform::Songs]);
  }

  #[tokio::test]
  async fn transform_refuses_populated_dimensions() {
    let recorder = Recorder { rows: HashMap::from([(Table::Users, 4)]), ..Default::default() };
    let p = pipeline(recorder, PipelineOptions::default());

    let err = p.transform().await.unwrap_err();
    assert!(matches!(err, Error::DimensionsNotEmpty { table: Table::Users, rows: 4 }));
    assert!(!p.warehouse().calls().iter().any(|c| matches!(c, Call::Transform(_))));
  }

  #[tokio::test]
  async fn transform_may_append_when_allowed() {
    let recorder = Recorder { rows: HashMap::from([(Table::Users, 4)]), ..Default::default() };
    let options = PipelineOptions { require_empty_dimensions: false, ..Default::default() };
    let p = pipeline(recorder, options);

    p.transform().await.unwrap();
    let calls = p.warehouse().calls();
    assert!(!calls.iter().any(|c| matches!(c, Call::Count(_))));
    assert_eq!(calls.len(), 5);
  }

  fn with_user_duplicates() -> Recorder {
    Recorder {
      duplicates: HashMap::from([(Table::Users, vec![DuplicateKey { key: "15".into(), count: 2 }])]),
      ..Default::default()
    }
  }

  #[tokio::test]
  async fn report_only_returns_findings() {
    let p = pipeline(with_user_duplicates(), PipelineOptions::default());
    let report = p.check_duplicates().await.unwrap();

    assert_eq!(report.findings.len(), 5);
    assert_eq!(report.violation_count(), 1);
    assert_eq!(report.finding(Table::Users).unwrap().key_column, "user_id");
  }

  #[tokio::test]
  async fn fail_on_violation_turns_findings_into_errors() {
    let options = PipelineOptions { audit_policy: AuditPolicy::FailOnViolation, ..Default::default() };
    let p = pipeline(with_user_duplicates(), options);

    match p.check_duplicates().await {
      Err(Error::DuplicatesFound(report)) => assert_eq!(report.violation_count(), 1),
      other => panic!("expected DuplicatesFound, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn fail_on_violation_passes_a_clean_audit() {
    let options = PipelineOptions { audit_policy: AuditPolicy::FailOnViolation, ..Default::default() };
    let p = pipeline(Recorder::default(), options);
    assert!(p.check_duplicates().await.unwrap().is_clean());
  }

  #[tokio::test]
  async fn run_executes_stages_in_order() {
    let p = pipeline(Recorder::default(), PipelineOptions::default());
    p.run().await.unwrap();

    let calls = p.warehouse().calls();
    let first = |pred: fn(&Call) -> bool| calls.iter().position(pred).unwrap();
    let last = |pred: fn(&Call) -> bool| calls.iter().rposition(pred).unwrap();

    assert!(last(|c| matches!(c, Call::Create(_))) < first(|c| matches!(c, Call::Copy(_))));
    assert!(last(|c| matches!(c, Call::Copy(_))) < first(|c| matches!(c, Call::Transform(_))));
    assert!(last(|c| matches!(c, Call::Transform(_))) < first(|c| matches!(c, Call::Audit(_))));
  }
}
