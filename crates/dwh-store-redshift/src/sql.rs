//! Statements in the Redshift dialect.
//!
//! Everything is rendered to plain text because the simple-query protocol
//! carries no bind parameters. Only table and column names from the static
//! catalog and quoted literals are interpolated.

use dwh_core::{
  schema::{Column, ColumnType, Constraint, Table},
  staging::{CopySpec, JsonFormat},
  transform::Transform,
};

// ─── DDL ─────────────────────────────────────────────────────────────────────

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
    ColumnType::Varchar => "VARCHAR(MAX)".to_owned(),
    ColumnType::Char(n) => format!("CHAR({n})"),
    ColumnType::Integer => "INTEGER".to_owned(),
    ColumnType::BigInt => "BIGINT".to_owned(),
    ColumnType::Float => "FLOAT".to_owned(),
    ColumnType::Timestamp => "TIMESTAMP".to_owned(),
  };
  match column.constraint {
    Constraint::None => format!("{} {ty}", column.name),
    Constraint::PrimaryKey => format!("{} {ty} NOT NULL PRIMARY KEY", column.name),
    Constraint::Identity => format!("{} INTEGER IDENTITY(1, 1) PRIMARY KEY", column.name),
  }
}

pub fn truncate(table: Table) -> String { format!("TRUNCATE {}", table.name()) }

// ─── Bulk copy ───────────────────────────────────────────────────────────────

fn quote(literal: &str) -> String { format!("'{}'", literal.replace('\'', "''")) }

pub fn copy(spec: &CopySpec) -> String {
  let format = match &spec.format {
    JsonFormat::Auto => quote("auto"),
    JsonFormat::JsonPaths(path) => quote(path),
  };
  format!(
    "COPY {table}\nFROM {source}\nCREDENTIALS {credentials}\nFORMAT AS JSON {format}\n\
     COMPUPDATE OFF\nREGION {region}",
    table = spec.table.name(),
    source = quote(&spec.source),
    credentials = quote(&format!("aws_iam_role={}", spec.role_arn)),
    region = quote(&spec.region),
  )
}

// ─── Transforms ──────────────────────────────────────────────────────────────

const SONGPLAY_INSERT: &str = "
INSERT INTO songplay (
    start_time, user_id, level, song_id, artist_id, session_id, location, user_agent
)
SELECT DISTINCT
    TIMESTAMP 'epoch' + se.ts / 1000 * INTERVAL '1 second',
    se.userId,
    se.level,
    ss.song_id,
    ss.artist_id,
    se.sessionId,
    se.location,
    se.userAgent
FROM staging_events se
JOIN staging_songs ss ON se.artist = ss.artist_name AND se.song = ss.title
WHERE se.page = 'NextSong' AND se.ts IS NOT NULL";

const USERS_INSERT: &str = "
INSERT INTO users (user_id, first_name, last_name, gender, level)
SELECT user_id, first_name, last_name, gender, level
FROM (
    SELECT
        se.userId    AS user_id,
        se.firstName AS first_name,
        se.lastName  AS last_name,
        se.gender    AS gender,
        se.level     AS level,
        ROW_NUMBER() OVER (
            PARTITION BY se.userId
            ORDER BY se.ts DESC NULLS LAST,
                     se.itemInSession DESC NULLS LAST,
                     se.sessionId DESC NULLS LAST
        ) AS rnk
    FROM staging_events se
    WHERE se.userId IS NOT NULL
) ranked
WHERE rnk = 1";

const SONGS_INSERT: &str = "
INSERT INTO songs (song_id, title, artist_id, year, duration)
SELECT DISTINCT song_id, title, artist_id, year, duration
FROM staging_songs
WHERE song_id IS NOT NULL";

const ARTISTS_INSERT: &str = "
INSERT INTO artists (artist_id, name, location, latitude, longitude)
SELECT artist_id, name, location, latitude, longitude
FROM (
    SELECT
        ss.artist_id,
        ss.artist_name                                AS name,
        ss.artist_location                            AS location,
        CAST(ss.artist_latitude AS DOUBLE PRECISION)  AS latitude,
        CAST(ss.artist_longitude AS DOUBLE PRECISION) AS longitude,
        ROW_NUMBER() OVER (
            PARTITION BY ss.artist_id
            ORDER BY ss.year DESC NULLS LAST, ss.song_id
        ) AS rnk
    FROM staging_songs ss
    WHERE ss.artist_id IS NOT NULL
) ranked
WHERE rnk = 1";

const TIME_INSERT: &str = "
INSERT INTO time (start_time, hour, day, week, month, year, weekday)
SELECT DISTINCT
    start_time,
    EXTRACT(HOUR FROM start_time),
    EXTRACT(DAY FROM start_time),
    EXTRACT(WEEK FROM start_time),
    EXTRACT(MONTH FROM start_time),
    EXTRACT(YEAR FROM start_time),
    EXTRACT(DOW FROM start_time)
FROM songplay
WHERE start_time IS NOT NULL";

pub fn transform(transform: Transform) -> &'static str {
  match transform {
    Transform::Songplay => SONGPLAY_INSERT,
    Transform::Users => USERS_INSERT,
    Transform::Songs => SONGS_INSERT,
    Transform::Artists => ARTISTS_INSERT,
    Transform::Time => TIME_INSERT,
  }
}

// ─── Reads ───────────────────────────────────────────────────────────────────

pub fn duplicates(table: Table) -> Option<String> {
  let key = table.key()?.name;
  Some(format!(
    "SELECT CAST({key} AS VARCHAR), COUNT(*) FROM {table} GROUP BY {key} HAVING COUNT(*) > 1 \
     ORDER BY 1",
    table = table.name(),
  ))
}

pub fn count_rows(table: Table) -> String { format!("SELECT COUNT(*) FROM {}", table.name()) }

pub fn table_exists(table: Table) -> String {
  format!(
    "SELECT COUNT(*) FROM information_schema.tables \
     WHERE table_schema = current_schema() AND table_name = {}",
    quote(table.name()),
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  fn events_copy() -> CopySpec {
    CopySpec {
      table:    Table::StagingEvents,
      source:   "s3://udacity-dend/log_data".into(),
      format:   JsonFormat::JsonPaths("s3://udacity-dend/log_json_path.json".into()),
      role_arn: "arn:aws:iam::123456789012:role/dwhRole".into(),
      region:   "us-west-2".into(),
    }
  }

  #[test]
  fn copy_uses_jsonpaths_and_role() {
    let sql = copy(&events_copy());
    assert_eq!(
      sql,
      "COPY staging_events\n\
       FROM 's3://udacity-dend/log_data'\n\
       CREDENTIALS 'aws_iam_role=arn:aws:iam::123456789012:role/dwhRole'\n\
       FORMAT AS JSON 's3://udacity-dend/log_json_path.json'\n\
       COMPUPDATE OFF\n\
       REGION 'us-west-2'"
    );
  }

  #[test]
  fn copy_auto_format_and_escaping() {
    let spec = CopySpec {
      table: Table::StagingSongs,
      source: "s3://bucket/it's".into(),
      format: JsonFormat::Auto,
      ..events_copy()
    };
    let sql = copy(&spec);
    assert!(sql.contains("FROM 's3://bucket/it''s'"));
    assert!(sql.contains("FORMAT AS JSON 'auto'"));
  }

  #[test]
  fn identity_and_informational_keys() {
    let ddl = create_table(Table::Songplay);
    assert!(ddl.contains("songplay_id INTEGER IDENTITY(1, 1) PRIMARY KEY"));
    assert!(ddl.contains("start_time TIMESTAMP,"));
    let ddl = create_table(Table::Users);
    assert!(ddl.contains("user_id INTEGER NOT NULL PRIMARY KEY"));
    assert!(ddl.contains("gender CHAR(1)"));
  }

  #[test]
  fn staging_has_no_keys() {
    let ddl = create_table(Table::StagingEvents);
    assert!(!ddl.contains("PRIMARY KEY"));
    assert!(ddl.contains("ts BIGINT"));
    assert!(duplicates(Table::StagingEvents).is_none());
  }

  #[test]
  fn fact_insert_filters_next_song() {
    let sql = transform(Transform::Songplay);
    assert!(sql.contains("WHERE se.page = 'NextSong' AND se.ts IS NOT NULL"));
    assert!(sql.contains("se.artist = ss.artist_name AND se.song = ss.title"));
  }

  #[test]
  fn audit_groups_on_the_key() {
    let sql = duplicates(Table::Time).unwrap();
    assert!(sql.starts_with("SELECT CAST(start_time AS VARCHAR), COUNT(*) FROM time GROUP BY start_time"));
  }
}
