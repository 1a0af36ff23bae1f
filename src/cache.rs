//! Local mirror of provider events, one SQLite table keyed by provider
//! event id. The provider is the source of truth: the cache is cleared
//! and rebuilt wholesale after every mutation, so storage failures here
//! are logged and absorbed rather than surfaced to the user.

use std::path::PathBuf;

use chrono::Utc;
use rusqlite::{Connection, Row, params};

use crate::models::event::CalendarEvent;
use crate::timezone::TimezoneManager;

const FALLBACK_SCHEMA: &str = "Table: events\nColumns:\n\
- id (TEXT PRIMARY KEY)\n\
- summary (TEXT)\n\
- start_time (TEXT)\n\
- end_time (TEXT)\n";

#[derive(Debug, Clone)]
pub struct EventCache {
    db_path: PathBuf,
    tz: TimezoneManager,
}

impl EventCache {
    /// Opens (or creates) the cache file and ensures the schema exists.
    pub fn new(db_path: impl Into<PathBuf>, tz: TimezoneManager) -> rusqlite::Result<Self> {
        let cache = Self {
            db_path: db_path.into(),
            tz,
        };
        let conn = cache.connect()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                summary TEXT NOT NULL,
                description TEXT,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                location TEXT,
                attendees TEXT,
                status TEXT,
                html_link TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_start_time ON events(start_time);",
        )?;
        Ok(cache)
    }

    // One connection per logical call; nothing is held open between turns.
    fn connect(&self) -> rusqlite::Result<Connection> {
        Connection::open(&self.db_path)
    }

    /// Truncates the table. Used immediately before a full resync, never
    /// incrementally.
    pub fn clear(&self) -> usize {
        let run = || -> rusqlite::Result<usize> {
            let conn = self.connect()?;
            conn.execute("DELETE FROM events", [])
        };
        match run() {
            Ok(deleted) => deleted,
            Err(err) => {
                tracing::warn!(error = %err, "failed to clear event cache");
                0
            }
        }
    }

    /// Upserts events. `created_at` is preserved from the first insert of
    /// each id; every other column takes the latest values. Returns the
    /// number stored, 0 on storage failure.
    pub fn store_events(&self, events: &[CalendarEvent]) -> usize {
        match self.store_events_inner(events) {
            Ok(stored) => stored,
            Err(err) => {
                tracing::warn!(error = %err, "failed to store events in cache");
                0
            }
        }
    }

    fn store_events_inner(&self, events: &[CalendarEvent]) -> rusqlite::Result<usize> {
        let conn = self.connect()?;
        let now = self.tz.format_for_storage(&Utc::now());
        let mut stmt = conn.prepare(
            "INSERT OR REPLACE INTO events \
             (id, summary, description, start_time, end_time, location, \
              attendees, status, html_link, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, \
                     COALESCE((SELECT created_at FROM events WHERE id = ?1), ?10), ?10)",
        )?;
        let mut stored = 0;
        for event in events {
            let attendees_json =
                serde_json::to_string(&event.attendees).unwrap_or_else(|_| "[]".to_string());
            stmt.execute(params![
                event.id,
                event.summary,
                event.description,
                self.tz.format_for_storage(&event.start),
                self.tz.format_for_storage(&event.end),
                event.location,
                attendees_json,
                event.status,
                event.html_link,
                now,
            ])?;
            stored += 1;
        }
        Ok(stored)
    }

    /// Runs a SELECT produced by the query translator. Rows that cannot be
    /// mapped back to an event (missing id or unparseable times) are
    /// skipped; any storage error yields an empty result.
    pub fn query(&self, sql: &str) -> Vec<CalendarEvent> {
        match self.query_inner(sql) {
            Ok(events) => events,
            Err(err) => {
                tracing::warn!(error = %err, sql, "cache query failed");
                Vec::new()
            }
        }
    }

    fn query_inner(&self, sql: &str) -> rusqlite::Result<Vec<CalendarEvent>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query([])?;
        let mut events = Vec::new();
        while let Some(row) = rows.next()? {
            if let Some(event) = self.row_to_event(row) {
                events.push(event);
            }
        }
        Ok(events)
    }

    pub fn event_by_id(&self, event_id: &str) -> Option<CalendarEvent> {
        let run = || -> rusqlite::Result<Option<CalendarEvent>> {
            let conn = self.connect()?;
            let mut stmt = conn.prepare("SELECT * FROM events WHERE id = ?1")?;
            let mut rows = stmt.query(params![event_id])?;
            match rows.next()? {
                Some(row) => Ok(self.row_to_event(row)),
                None => Ok(None),
            }
        };
        match run() {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(error = %err, event_id, "cache lookup failed");
                None
            }
        }
    }

    /// Live schema rendered for the query-translator prompt, with a static
    /// fallback when the pragma cannot be read.
    pub fn schema_description(&self) -> String {
        match self.schema_inner() {
            Ok(schema) => schema,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read cache schema");
                FALLBACK_SCHEMA.to_string()
            }
        }
    }

    fn schema_inner(&self) -> rusqlite::Result<String> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("PRAGMA table_info(events)")?;
        let mut rows = stmt.query([])?;
        let mut schema = String::from("Table: events\nColumns:\n");
        while let Some(row) = rows.next()? {
            let name: String = row.get(1)?;
            let col_type: String = row.get(2)?;
            let not_null: i64 = row.get(3)?;
            let default: Option<String> = row.get::<_, Option<String>>(4).unwrap_or(None);
            let pk: i64 = row.get(5)?;

            schema.push_str(&format!(
                "- {} ({}{}{}{})\n",
                name,
                col_type,
                if not_null != 0 { " NOT NULL" } else { "" },
                default
                    .map(|d| format!(" DEFAULT {d}"))
                    .unwrap_or_default(),
                if pk != 0 { " PRIMARY KEY" } else { "" },
            ));
        }
        Ok(schema)
    }

    fn row_to_event(&self, row: &Row<'_>) -> Option<CalendarEvent> {
        let text = |name: &str| -> String {
            row.get::<_, Option<String>>(name)
                .ok()
                .flatten()
                .unwrap_or_default()
        };

        let id: String = row.get("id").ok()?;
        let start = self.tz.parse_from_storage(&text("start_time")).ok()?;
        let end = self.tz.parse_from_storage(&text("end_time")).ok()?;
        let attendees: Vec<String> = {
            let raw = text("attendees");
            if raw.is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&raw).unwrap_or_default()
            }
        };

        Some(CalendarEvent {
            id,
            summary: text("summary"),
            description: text("description"),
            start,
            end,
            location: text("location"),
            attendees,
            status: text("status"),
            html_link: text("html_link"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc_event(id: &str, summary: &str, start_hour: u32) -> CalendarEvent {
        let tz = TimezoneManager::default();
        CalendarEvent {
            id: id.to_string(),
            summary: summary.to_string(),
            description: String::new(),
            start: tz.to_user_tz(Utc.with_ymd_and_hms(2024, 3, 11, start_hour, 0, 0).unwrap()),
            end: tz.to_user_tz(Utc.with_ymd_and_hms(2024, 3, 11, start_hour + 1, 0, 0).unwrap()),
            location: String::new(),
            attendees: vec!["ana@example.com".to_string()],
            status: "confirmed".to_string(),
            html_link: String::new(),
        }
    }

    fn temp_cache() -> (tempfile::TempDir, EventCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = EventCache::new(dir.path().join("events.db"), TimezoneManager::default())
            .unwrap();
        (dir, cache)
    }

    #[test]
    fn upsert_preserves_created_at_and_updates_the_rest() {
        let (_dir, cache) = temp_cache();
        assert_eq!(cache.store_events(&[utc_event("e1", "Standup", 9)]), 1);

        // Age the creation stamp so preservation is observable.
        let conn = Connection::open(cache.db_path.clone()).unwrap();
        conn.execute(
            "UPDATE events SET created_at = '2020-01-01 00:00:00' WHERE id = 'e1'",
            [],
        )
        .unwrap();
        drop(conn);

        let mut renamed = utc_event("e1", "Renamed standup", 10);
        renamed.location = "Room 2".to_string();
        assert_eq!(cache.store_events(&[renamed]), 1);

        let conn = Connection::open(cache.db_path.clone()).unwrap();
        let (summary, location, created_at): (String, String, String) = conn
            .query_row(
                "SELECT summary, location, created_at FROM events WHERE id = 'e1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(summary, "Renamed standup");
        assert_eq!(location, "Room 2");
        assert_eq!(created_at, "2020-01-01 00:00:00");
    }

    #[test]
    fn query_maps_rows_and_reads_legacy_iso_timestamps() {
        let (_dir, cache) = temp_cache();
        cache.store_events(&[utc_event("e1", "Standup", 9)]);

        let conn = Connection::open(cache.db_path.clone()).unwrap();
        conn.execute(
            "INSERT INTO events (id, summary, description, start_time, end_time, location, \
             attendees, status, html_link, created_at, updated_at) \
             VALUES ('e2', 'Legacy', '', '2024-03-11T15:00:00+00:00', '2024-03-11T16:00:00+00:00', \
                     '', '[]', 'confirmed', '', '2024-03-11 00:00:00', '2024-03-11 00:00:00')",
            [],
        )
        .unwrap();
        drop(conn);

        let events = cache.query("SELECT * FROM events ORDER BY start_time");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].attendees, vec!["ana@example.com".to_string()]);
        assert_eq!(
            events[1].start.with_timezone(&Utc),
            Utc.with_ymd_and_hms(2024, 3, 11, 15, 0, 0).unwrap()
        );
    }

    #[test]
    fn clear_truncates_and_bad_sql_yields_empty() {
        let (_dir, cache) = temp_cache();
        cache.store_events(&[utc_event("e1", "Standup", 9), utc_event("e2", "Lunch", 12)]);
        assert!(cache.query("SELECT FROM nowhere").is_empty());
        assert_eq!(cache.clear(), 2);
        assert!(cache.query("SELECT * FROM events").is_empty());
    }

    #[test]
    fn schema_description_lists_columns() {
        let (_dir, cache) = temp_cache();
        let schema = cache.schema_description();
        assert!(schema.contains("Table: events"));
        assert!(schema.contains("start_time (TEXT NOT NULL)"));
        assert!(schema.contains("id (TEXT PRIMARY KEY)"));
    }
}
