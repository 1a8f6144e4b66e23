//! Duplicate-key audit results and the policy applied to them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::schema::Table;

/// What to do when the audit finds duplicate keys.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditPolicy {
  /// Log the findings and carry on.
  #[default]
  ReportOnly,
  /// Turn any finding into an error.
  FailOnViolation,
}

/// A key value that appears more than once, rendered as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateKey {
  pub key:   String,
  pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditFinding {
  pub table:      Table,
  pub key_column: &'static str,
  pub duplicates: Vec<DuplicateKey>,
}

impl AuditFinding {
  pub fn is_clean(&self) -> bool { self.duplicates.is_empty() }
}

/// One finding per dimensional table, in [`Table::DIMENSIONAL`] order.
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
  pub checked_at: DateTime<Utc>,
  pub findings:   Vec<AuditFinding>,
}

impl AuditReport {
  pub fn is_clean(&self) -> bool { self.findings.iter().all(AuditFinding::is_clean) }

  /// Number of distinct duplicated keys across all tables.
  pub fn violation_count(&self) -> usize {
    self.findings.iter().map(|f| f.duplicates.len()).sum()
  }

  pub fn finding(&self, table: Table) -> Option<&AuditFinding> {
    self.findings.iter().find(|f| f.table == table)
  }
}

impl fmt::Display for AuditReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "integrity audit at {}", self.checked_at.to_rfc3339())?;
    for finding in &self.findings {
      if finding.is_clean() {
        writeln!(f, "  {:<10} {:<12} ok", finding.table.name(), finding.key_column)?;
        continue;
      }
      writeln!(
        f,
        "  {:<10} {:<12} {} duplicated keys",
        finding.table.name(),
        finding.key_column,
        finding.duplicates.len()
      )?;
      for dup in &finding.duplicates {
        writeln!(f, "    {} x{}", dup.key, dup.count)?;
      }
    }
    Ok(())
  }
}
