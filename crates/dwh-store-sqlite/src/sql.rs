//! Transform and audit statements in the SQLite dialect.

use dwh_core::{schema::Table, transform::Transform};

const SONGPLAY_INSERT: &str = "
INSERT INTO songplay (
    start_time, user_id, level, song_id, artist_id, session_id, location, user_agent
)
SELECT DISTINCT
    datetime(se.ts / 1000, 'unixepoch'),
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
        ss.artist_name              AS name,
        ss.artist_location          AS location,
        CAST(ss.artist_latitude AS REAL)  AS latitude,
        CAST(ss.artist_longitude AS REAL) AS longitude,
        ROW_NUMBER() OVER (
            PARTITION BY ss.artist_id
            ORDER BY ss.year DESC NULLS LAST, ss.song_id
        ) AS rnk
    FROM staging_songs ss
    WHERE ss.artist_id IS NOT NULL
) ranked
WHERE rnk = 1";

// ISO week: day-of-year of the Thursday in the same Monday-based week.
const TIME_INSERT: &str = "
INSERT INTO time (start_time, hour, day, week, month, year, weekday)
SELECT DISTINCT
    start_time,
    CAST(strftime('%H', start_time) AS INTEGER),
    CAST(strftime('%d', start_time) AS INTEGER),
    (CAST(strftime('%j', date(start_time, '-3 days', 'weekday 4')) AS INTEGER) - 1) / 7 + 1,
    CAST(strftime('%m', start_time) AS INTEGER),
    CAST(strftime('%Y', start_time) AS INTEGER),
    CAST(strftime('%w', start_time) AS INTEGER)
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

/// Group-by/having query over the table's key column; `None` for staging
/// tables.
pub fn duplicates(table: Table) -> Option<String> {
  let key = table.key()?.name;
  Some(format!(
    "SELECT CAST({key} AS TEXT), COUNT(*) FROM {table} GROUP BY {key} HAVING COUNT(*) > 1 \
     ORDER BY 1",
    table = table.name(),
  ))
}

pub fn count_rows(table: Table) -> String { format!("SELECT COUNT(*) FROM {}", table.name()) }

pub const TABLE_EXISTS: &str =
  "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1";
