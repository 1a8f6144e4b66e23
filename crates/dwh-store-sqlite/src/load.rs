//! Local bulk copy: reads JSON records from a file or directory tree and
//! shapes them into staging rows.
//!
//! Follows the warehouse loader's rules. With `auto`, each column takes the
//! top-level key equal to its lowercased name. With a JSONPaths descriptor,
//! the n-th path feeds the n-th column and the path count must match the
//! column count. Missing keys load as NULL.

use std::path::{Path, PathBuf};

use dwh_core::{
  schema::{Column, ColumnType},
  staging::{CopySpec, JsonFormat},
};
use rusqlite::types::Value as SqlValue;
use serde_json::Value;
use walkdir::WalkDir;

use crate::{Error, Result};

pub type Row = Vec<SqlValue>;

/// Read every record named by `copy` and coerce it to the staging table's
/// columns.
pub fn read_rows(copy: &CopySpec) -> Result<Vec<Row>> {
  let columns = copy.table.columns();
  let paths: Vec<Vec<Segment>> = match &copy.format {
    JsonFormat::Auto => {
      columns.iter().map(|c| vec![Segment::Key(c.name.to_ascii_lowercase())]).collect()
    }
    JsonFormat::JsonPaths(descriptor) => read_descriptor(Path::new(descriptor), columns.len())?,
  };

  let mut rows = Vec::new();
  for file in source_files(Path::new(&copy.source))? {
    let text = std::fs::read_to_string(&file)
      .map_err(|source| Error::Io { path: file.clone(), source })?;
    for record in serde_json::Deserializer::from_str(&text).into_iter::<Value>() {
      let record = record.map_err(|source| Error::Json { path: file.clone(), source })?;
      if !record.is_object() {
        return Err(Error::NotAnObject { path: file });
      }
      let row = columns
        .iter()
        .zip(&paths)
        .map(|(column, path)| coerce(&file, column, lookup(&record, path)))
        .collect::<Result<Row>>()?;
      rows.push(row);
    }
  }
  Ok(rows)
}

/// A single file, or every `*.json` file below a directory in path order.
fn source_files(source: &Path) -> Result<Vec<PathBuf>> {
  let metadata = std::fs::metadata(source)
    .map_err(|e| Error::Io { path: source.to_path_buf(), source: e })?;
  if metadata.is_file() {
    return Ok(vec![source.to_path_buf()]);
  }

  let mut files = Vec::new();
  for entry in WalkDir::new(source).sort_by_file_name() {
    let entry = entry?;
    let is_json = entry.path().extension().is_some_and(|ext| ext == "json");
    if entry.file_type().is_file() && is_json {
      files.push(entry.into_path());
    }
  }
  if files.is_empty() {
    return Err(Error::EmptySource(source.to_path_buf()));
  }
  Ok(files)
}

// ─── JSONPaths ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
  Key(String),
  Index(usize),
}

fn read_descriptor(path: &Path, expected: usize) -> Result<Vec<Vec<Segment>>> {
  let invalid = |reason: String| Error::JsonPaths { path: path.to_path_buf(), reason };

  let text = std::fs::read_to_string(path)
    .map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
  let doc: Value = serde_json::from_str(&text)
    .map_err(|source| Error::Json { path: path.to_path_buf(), source })?;
  let entries = doc
    .get("jsonpaths")
    .and_then(Value::as_array)
    .ok_or_else(|| invalid("missing \"jsonpaths\" array".into()))?;

  if entries.len() != expected {
    return Err(invalid(format!("{} paths for {expected} columns", entries.len())));
  }
  entries
    .iter()
    .map(|e| -> Result<Vec<Segment>> {
      let expr = e.as_str().ok_or_else(|| invalid(format!("{e} is not a string")))?;
      parse_path(expr).ok_or_else(|| invalid(format!("cannot parse {expr:?}")))
    })
    .collect()
}

/// Parse `$.a`, `$['a']`, `$["a"]` and `[n]` segments.
fn parse_path(expr: &str) -> Option<Vec<Segment>> {
  let mut rest = expr.strip_prefix('$')?;
  let mut segments = Vec::new();
  while !rest.is_empty() {
    if let Some(after) = rest.strip_prefix('.') {
      let end = after.find(['.', '[']).unwrap_or(after.len());
      if end == 0 {
        return None;
      }
      segments.push(Segment::Key(after[..end].to_owned()));
      rest = &after[end..];
    } else if let Some(after) = rest.strip_prefix('[') {
      let close = after.find(']')?;
      let inner = &after[..close];
      let quoted = inner
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')));
      match quoted {
        Some(key) => segments.push(Segment::Key(key.to_owned())),
        None => segments.push(Segment::Index(inner.parse().ok()?)),
      }
      rest = &after[close + 1..];
    } else {
      return None;
    }
  }
  (!segments.is_empty()).then_some(segments)
}

fn lookup<'v>(record: &'v Value, path: &[Segment]) -> &'v Value {
  path
    .iter()
    .try_fold(record, |v, seg| match seg {
      Segment::Key(k) => v.get(k.as_str()),
      Segment::Index(i) => v.get(*i),
    })
    .unwrap_or(&Value::Null)
}

// ─── Coercion ────────────────────────────────────────────────────────────────

fn coerce(file: &Path, column: &Column, value: &Value) -> Result<SqlValue> {
  let reject = || Error::Coerce {
    path:   file.to_path_buf(),
    column: column.name,
    value:  value.to_string(),
    ty:     type_name(column.ty),
  };

  // Empty strings in numeric columns load as NULL.
  let blank = value.as_str().is_some_and(|s| s.trim().is_empty());
  if value.is_null() || (column.ty.is_numeric() && blank) {
    return Ok(SqlValue::Null);
  }

  match column.ty {
    ColumnType::Integer | ColumnType::BigInt => {
      let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(whole_i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
      };
      parsed
        .filter(|&v| column.ty == ColumnType::BigInt || i32::try_from(v).is_ok())
        .map(SqlValue::Integer)
        .ok_or_else(reject)
    }
    ColumnType::Float => match value {
      Value::Number(n) => n.as_f64().map(SqlValue::Real).ok_or_else(reject),
      Value::String(s) => s.trim().parse().map(SqlValue::Real).map_err(|_| reject()),
      _ => Err(reject()),
    },
    ColumnType::Varchar | ColumnType::Char(_) | ColumnType::Timestamp => match value {
      Value::String(s) => Ok(SqlValue::Text(s.clone())),
      other => Ok(SqlValue::Text(other.to_string())),
    },
  }
}

/// A float that is a whole number within `i64` range.
fn whole_i64(f: f64) -> Option<i64> {
  // i64::MAX as f64 rounds up to 2^63, which is out of range.
  let in_range = f >= i64::MIN as f64 && f < i64::MAX as f64;
  (f.fract() == 0.0 && in_range).then_some(f as i64)
}

fn type_name(ty: ColumnType) -> &'static str {
  match ty {
    ColumnType::Varchar => "varchar",
    ColumnType::Char(_) => "char",
    ColumnType::Integer => "integer",
    ColumnType::BigInt => "bigint",
    ColumnType::Float => "float",
    ColumnType::Timestamp => "timestamp",
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn key(k: &str) -> Segment { Segment::Key(k.into()) }

  #[test]
  fn parses_bracket_and_dot_paths() {
    assert_eq!(parse_path("$['firstName']"), Some(vec![key("firstName")]));
    assert_eq!(parse_path("$[\"ts\"]"), Some(vec![key("ts")]));
    assert_eq!(parse_path("$.song.title"), Some(vec![key("song"), key("title")]));
    assert_eq!(parse_path("$.tags[1]"), Some(vec![key("tags"), Segment::Index(1)]));
  }

  #[test]
  fn rejects_malformed_paths() {
    assert_eq!(parse_path("artist"), None);
    assert_eq!(parse_path("$"), None);
    assert_eq!(parse_path("$.."), None);
    assert_eq!(parse_path("$[abc]"), None);
    assert_eq!(parse_path("$['open"), None);
  }

  #[test]
  fn lookup_misses_are_null() {
    let record = json!({"a": {"b": [1, 2]}});
    assert_eq!(lookup(&record, &[key("a"), key("b"), Segment::Index(1)]), &json!(2));
    assert_eq!(lookup(&record, &[key("missing")]), &Value::Null);
  }

  fn column(ty: ColumnType) -> Column {
    Column { name: "c", ty, constraint: dwh_core::schema::Constraint::None }
  }

  #[test]
  fn numeric_strings_are_parsed() {
    let f = Path::new("f.json");
    assert_eq!(coerce(f, &column(ColumnType::Integer), &json!("39")).unwrap(), SqlValue::Integer(39));
    assert_eq!(coerce(f, &column(ColumnType::Integer), &json!("")).unwrap(), SqlValue::Null);
    assert_eq!(coerce(f, &column(ColumnType::Float), &json!(218.93)).unwrap(), SqlValue::Real(218.93));
    assert_eq!(coerce(f, &column(ColumnType::BigInt), &json!(1.0e3)).unwrap(), SqlValue::Integer(1000));
  }

  #[test]
  fn text_columns_keep_strings_verbatim() {
    let f = Path::new("f.json");
    let v = coerce(f, &column(ColumnType::Varchar), &json!("  padded ")).unwrap();
    assert_eq!(v, SqlValue::Text("  padded ".into()));
    let v = coerce(f, &column(ColumnType::Varchar), &json!(7)).unwrap();
    assert_eq!(v, SqlValue::Text("7".into()));
  }

  #[test]
  fn unparsable_numbers_are_rejected() {
    let f = Path::new("f.json");
    let err = coerce(f, &column(ColumnType::Integer), &json!("abc")).unwrap_err();
    assert!(matches!(err, Error::Coerce { ty: "integer", .. }));
    assert!(coerce(f, &column(ColumnType::Integer), &json!(1.5)).is_err());
    assert!(coerce(f, &column(ColumnType::Float), &json!(true)).is_err());
  }

  #[test]
  fn out_of_range_integers_are_rejected() {
    let f = Path::new("f.json");
    let err = coerce(f, &column(ColumnType::BigInt), &json!(1.0e20)).unwrap_err();
    assert!(matches!(err, Error::Coerce { ty: "bigint", .. }));
    assert!(coerce(f, &column(ColumnType::Integer), &json!(3_000_000_000i64)).is_err());
    assert!(coerce(f, &column(ColumnType::Integer), &json!("3000000000")).is_err());
    assert!(coerce(f, &column(ColumnType::Integer), &json!(-3.0e9)).is_err());
    assert_eq!(
      coerce(f, &column(ColumnType::BigInt), &json!(3_000_000_000i64)).unwrap(),
      SqlValue::Integer(3_000_000_000)
    );
    assert_eq!(
      coerce(f, &column(ColumnType::Integer), &json!(i32::MAX)).unwrap(),
      SqlValue::Integer(i32::MAX.into())
    );
  }
}
