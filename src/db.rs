use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::Connection;
use tracing::warn;

use crate::records::Report;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS reports (
            id          INTEGER PRIMARY KEY,
            link        TEXT UNIQUE NOT NULL,
            occurred    TEXT,
            city        TEXT NOT NULL DEFAULT '',
            state       TEXT NOT NULL DEFAULT '',
            shape       TEXT,
            duration    TEXT NOT NULL DEFAULT '',
            summary     TEXT,
            posted      TEXT,
            imported_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_reports_place ON reports(city, state);

        -- seconds is NULL when no duration pattern matched
        CREATE TABLE IF NOT EXISTS durations (
            report_id  INTEGER PRIMARY KEY REFERENCES reports(id),
            raw        TEXT NOT NULL,
            seconds    REAL,
            parsed_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_durations_seconds ON durations(seconds);

        CREATE TABLE IF NOT EXISTS locations (
            report_id    INTEGER PRIMARY KEY REFERENCES reports(id),
            matched_city TEXT,
            longitude    REAL,
            latitude     REAL,
            confidence   INTEGER NOT NULL CHECK(confidence BETWEEN -1 AND 3),
            error        TEXT,
            located_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_locations_confidence ON locations(confidence);

        -- offline city table
        CREATE TABLE IF NOT EXISTS cities (
            city      TEXT NOT NULL,
            state_id  TEXT NOT NULL,
            lat       REAL NOT NULL,
            lng       REAL NOT NULL,
            PRIMARY KEY (city, state_id)
        );

        -- geocoder answers, write-once
        CREATE TABLE IF NOT EXISTS geo_cache (
            city        TEXT PRIMARY KEY,
            candidates  TEXT NOT NULL,
            fetched_at  TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

// ── Reports ──

/// Reports are keyed by `link`; rows without one cannot be told apart and are
/// skipped with a warning.
pub fn insert_reports(conn: &Connection, reports: &[Report]) -> Result<usize> {
    let (linked, unlinked): (Vec<&Report>, Vec<&Report>) =
        reports.iter().partition(|r| !r.link.trim().is_empty());
    if !unlinked.is_empty() {
        warn!("Skipping {} reports without a link", unlinked.len());
    }

    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO reports
             (link, occurred, city, state, shape, duration, summary, posted)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for r in linked {
            count += stmt.execute(rusqlite::params![
                r.link, r.date, r.city, r.state, r.shape, r.duration, r.summary, r.posted,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

fn limit_clause(limit: Option<usize>) -> String {
    match limit {
        Some(n) => format!(" LIMIT {}", n),
        None => String::new(),
    }
}

// ── Durations ──

pub fn fetch_unparsed_durations(
    conn: &Connection,
    limit: Option<usize>,
) -> Result<Vec<(i64, String)>> {
    let sql = format!(
        "SELECT r.id, r.duration
         FROM reports r
         LEFT JOIN durations d ON d.report_id = r.id
         WHERE d.report_id IS NULL
         ORDER BY r.id{}",
        limit_clause(limit)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct DurationRow {
    pub report_id: i64,
    pub raw: String,
    pub seconds: Option<f64>,
}

pub fn save_durations(conn: &Connection, rows: &[DurationRow]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO durations (report_id, raw, seconds) VALUES (?1, ?2, ?3)",
        )?;
        for r in rows {
            stmt.execute(rusqlite::params![r.report_id, r.raw, r.seconds])?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// Most frequent raw strings the duration grammar could not read.
pub fn top_unmatched_durations(conn: &Connection, limit: usize) -> Result<Vec<(String, usize)>> {
    let mut stmt = conn.prepare(
        "SELECT raw, COUNT(*) AS n
         FROM durations
         WHERE seconds IS NULL
         GROUP BY raw
         ORDER BY n DESC, raw
         LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Locations ──

pub struct ReportPlace {
    pub report_id: i64,
    pub city: String,
    pub state: String,
}

pub fn fetch_unlocated(conn: &Connection, limit: Option<usize>) -> Result<Vec<ReportPlace>> {
    let sql = format!(
        "SELECT r.id, r.city, r.state
         FROM reports r
         LEFT JOIN locations l ON l.report_id = r.id
         WHERE l.report_id IS NULL
         ORDER BY r.id{}",
        limit_clause(limit)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ReportPlace {
                report_id: row.get(0)?,
                city: row.get(1)?,
                state: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct LocationRow {
    pub report_id: i64,
    pub matched_city: Option<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub confidence: i8,
    pub error: Option<String>,
}

pub fn save_locations(conn: &Connection, rows: &[LocationRow]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO locations
             (report_id, matched_city, longitude, latitude, confidence, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for r in rows {
            stmt.execute(rusqlite::params![
                r.report_id, r.matched_city, r.longitude, r.latitude, r.confidence, r.error,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

// ── Offline city table ──

#[derive(Debug, Clone, PartialEq)]
pub struct CityRow {
    pub city: String,
    pub state_id: String,
    pub lat: f64,
    pub lng: f64,
}

pub fn insert_cities(conn: &Connection, rows: &[CityRow]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO cities (city, state_id, lat, lng) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for r in rows {
            count += stmt.execute(rusqlite::params![r.city, r.state_id, r.lat, r.lng])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub fn fetch_cities(conn: &Connection) -> Result<Vec<CityRow>> {
    let mut stmt = conn.prepare("SELECT city, state_id, lat, lng FROM cities")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(CityRow {
                city: row.get(0)?,
                state_id: row.get(1)?,
                lat: row.get(2)?,
                lng: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Distinct (city, state) pairs over all reports, with how many reports name each.
pub fn fetch_report_places(conn: &Connection) -> Result<Vec<(String, String, usize)>> {
    let mut stmt = conn.prepare(
        "SELECT city, state, COUNT(*) FROM reports GROUP BY city, state ORDER BY city, state",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get::<_, i64>(2)? as usize))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Geocoder cache ──

pub fn load_geo_cache(conn: &Connection) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare("SELECT city, candidates FROM geo_cache")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Insert (city, JSON candidates) rows, leaving existing keys alone.
/// Returns how many rows were new.
pub fn save_geo_cache(conn: &Connection, rows: &[(String, String)]) -> Result<usize> {
    let fetched_at = Utc::now().to_rfc3339();
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO geo_cache (city, candidates, fetched_at) VALUES (?1, ?2, ?3)",
        )?;
        for (city, candidates) in rows {
            count += stmt.execute(rusqlite::params![city, candidates, fetched_at])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub fn delete_geo_cache_keys(conn: &Connection, cities: &[String]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare("DELETE FROM geo_cache WHERE city = ?1")?;
        for city in cities {
            count += stmt.execute([city])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

// ── Stats ──

pub struct Stats {
    pub reports: usize,
    pub durations_parsed: usize,
    pub durations_unmatched: usize,
    pub located: usize,
    pub location_errors: usize,
    pub by_confidence: Vec<(i8, usize)>,
    pub cities: usize,
    pub cached_lookups: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<usize> {
        Ok(conn.query_row(sql, [], |row| row.get::<_, i64>(0))? as usize)
    };

    let mut stmt = conn.prepare(
        "SELECT confidence, COUNT(*) FROM locations
         WHERE error IS NULL
         GROUP BY confidence
         ORDER BY confidence DESC",
    )?;
    let by_confidence = stmt
        .query_map([], |row| {
            Ok((row.get::<_, i64>(0)? as i8, row.get::<_, i64>(1)? as usize))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Stats {
        reports: count("SELECT COUNT(*) FROM reports")?,
        durations_parsed: count("SELECT COUNT(*) FROM durations WHERE seconds IS NOT NULL")?,
        durations_unmatched: count("SELECT COUNT(*) FROM durations WHERE seconds IS NULL")?,
        located: count("SELECT COUNT(*) FROM locations WHERE error IS NULL")?,
        location_errors: count("SELECT COUNT(*) FROM locations WHERE error IS NOT NULL")?,
        by_confidence,
        cities: count("SELECT COUNT(*) FROM cities")?,
        cached_lookups: count("SELECT COUNT(*) FROM geo_cache")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn report(link: &str, city: &str, state: &str, duration: &str) -> Report {
        Report {
            link: link.to_string(),
            city: city.to_string(),
            state: state.to_string(),
            duration: duration.to_string(),
            ..Report::default()
        }
    }

    fn seeded() -> Connection {
        let conn = memory_db();
        insert_reports(
            &conn,
            &[
                report("r1.html", "Phoenix", "AZ", "5 minutes"),
                report("r2.html", "Phoenix", "AZ", "sometime"),
                report("r3.html", "Marfa", "TX", "sometime"),
            ],
        )
        .unwrap();
        conn
    }

    #[test]
    fn init_schema_is_repeatable() {
        let conn = memory_db();
        init_schema(&conn).unwrap();
    }

    #[test]
    fn reports_dedupe_by_link() {
        let conn = seeded();
        let again = insert_reports(&conn, &[report("r1.html", "Elsewhere", "NV", "")]).unwrap();
        assert_eq!(again, 0);
        assert_eq!(get_stats(&conn).unwrap().reports, 3);
    }

    #[test]
    fn reports_without_link_are_skipped() {
        let conn = memory_db();
        let inserted = insert_reports(
            &conn,
            &[
                report("", "Phoenix", "AZ", "5 minutes"),
                report("  ", "Marfa", "TX", "1 hour"),
                report("r9.html", "Roswell", "NM", "2 hours"),
            ],
        )
        .unwrap();
        assert_eq!(inserted, 1);
        let places = fetch_unlocated(&conn, None).unwrap();
        assert_eq!(places.len(), 1);
        assert_eq!(places[0].city, "Roswell");
    }

    #[test]
    fn durations_are_fetched_until_saved() {
        let conn = seeded();
        let pending = fetch_unparsed_durations(&conn, None).unwrap();
        assert_eq!(pending.len(), 3);
        assert_eq!(pending[0].1, "5 minutes");
        assert_eq!(fetch_unparsed_durations(&conn, Some(1)).unwrap().len(), 1);

        let rows: Vec<DurationRow> = pending
            .into_iter()
            .map(|(report_id, raw)| DurationRow {
                seconds: (raw == "5 minutes").then_some(300.0),
                report_id,
                raw,
            })
            .collect();
        save_durations(&conn, &rows).unwrap();

        assert!(fetch_unparsed_durations(&conn, None).unwrap().is_empty());
        assert_eq!(
            top_unmatched_durations(&conn, 10).unwrap(),
            vec![("sometime".to_string(), 2)]
        );
        let stats = get_stats(&conn).unwrap();
        assert_eq!(stats.durations_parsed, 1);
        assert_eq!(stats.durations_unmatched, 2);
    }

    #[test]
    fn locations_are_fetched_until_saved() {
        let conn = seeded();
        let pending = fetch_unlocated(&conn, None).unwrap();
        assert_eq!(pending.len(), 3);
        assert_eq!(pending[2].city, "Marfa");

        save_locations(
            &conn,
            &[
                LocationRow {
                    report_id: pending[0].report_id,
                    matched_city: Some("Phoenix".into()),
                    longitude: Some(-112.07),
                    latitude: Some(33.45),
                    confidence: 3,
                    error: None,
                },
                LocationRow {
                    report_id: pending[2].report_id,
                    matched_city: None,
                    longitude: None,
                    latitude: None,
                    confidence: -1,
                    error: Some("Cannot resolve city \"?\"".into()),
                },
            ],
        )
        .unwrap();

        let left = fetch_unlocated(&conn, None).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].report_id, pending[1].report_id);

        let stats = get_stats(&conn).unwrap();
        assert_eq!(stats.located, 1);
        assert_eq!(stats.location_errors, 1);
        assert_eq!(stats.by_confidence, vec![(3, 1)]);
    }

    #[test]
    fn confidence_out_of_range_is_rejected() {
        let conn = seeded();
        let bad = LocationRow {
            report_id: 1,
            matched_city: None,
            longitude: None,
            latitude: None,
            confidence: 7,
            error: None,
        };
        assert!(save_locations(&conn, &[bad]).is_err());
    }

    #[test]
    fn cities_roundtrip() {
        let conn = memory_db();
        let rows = vec![
            CityRow {
                city: "Phoenix".into(),
                state_id: "AZ".into(),
                lat: 33.5722,
                lng: -112.0892,
            },
            CityRow {
                city: "Marfa".into(),
                state_id: "TX".into(),
                lat: 30.3085,
                lng: -104.0205,
            },
        ];
        assert_eq!(insert_cities(&conn, &rows).unwrap(), 2);
        let mut loaded = fetch_cities(&conn).unwrap();
        loaded.sort_by(|a, b| a.city.cmp(&b.city));
        assert_eq!(loaded[0], rows[1]);
        assert_eq!(loaded[1], rows[0]);
    }

    #[test]
    fn report_places_are_distinct() {
        let conn = seeded();
        assert_eq!(
            fetch_report_places(&conn).unwrap(),
            vec![
                ("Marfa".to_string(), "TX".to_string(), 1),
                ("Phoenix".to_string(), "AZ".to_string(), 2),
            ]
        );
    }

    #[test]
    fn geo_cache_is_write_once() {
        let conn = memory_db();
        let first = vec![("Phoenix".to_string(), "[1]".to_string())];
        assert_eq!(save_geo_cache(&conn, &first).unwrap(), 1);
        let second = vec![
            ("Phoenix".to_string(), "[]".to_string()),
            ("Marfa".to_string(), "[]".to_string()),
        ];
        assert_eq!(save_geo_cache(&conn, &second).unwrap(), 1);

        let mut rows = load_geo_cache(&conn).unwrap();
        rows.sort();
        assert_eq!(rows[1], ("Phoenix".to_string(), "[1]".to_string()));

        assert_eq!(delete_geo_cache_keys(&conn, &["Marfa".to_string()]).unwrap(), 1);
        assert_eq!(load_geo_cache(&conn).unwrap().len(), 1);
    }

    #[test]
    fn connect_creates_parent_dir() {
        let dir = std::env::temp_dir().join(format!("nuforc_db_{}", std::process::id()));
        let path = dir.join("nested").join("test.sqlite");
        let conn = connect(&path).unwrap();
        init_schema(&conn).unwrap();
        drop(conn);
        assert!(path.exists());
        fs::remove_dir_all(&dir).unwrap();
    }
}
