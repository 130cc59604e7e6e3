//! SQLite implementation of the event repository port

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use calbridge_core::EventRepository;
use calbridge_domain::{Event, Result};
use chrono::DateTime;
use rusqlite::{Row, ToSql};
use tokio::task;

use super::{map_join, map_sql, TenantDb};

const SELECT_COLUMNS: &str = "id, calendar_id, google_id, starts_at, ends_at, activity_id";

// Old SQLite builds allow as few as 999 bound parameters per statement.
const DELETE_BATCH: usize = 500;

pub struct SqliteEventRepository {
    db: Arc<TenantDb>,
}

impl SqliteEventRepository {
    pub fn new(db: Arc<TenantDb>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EventRepository for SqliteEventRepository {
    async fn find_by_google_id(
        &self,
        calendar_id: &str,
        google_id: &str,
    ) -> Result<Option<Event>> {
        let db = Arc::clone(&self.db);
        let calendar_id = calendar_id.to_string();
        let google_id = google_id.to_string();
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM events WHERE calendar_id = ?1 AND google_id = ?2"
                ))
                .map_err(map_sql)?;
            let mut rows = stmt.query_map([calendar_id, google_id], row_to_event).map_err(map_sql)?;
            rows.next().transpose().map_err(map_sql)
        })
        .await
        .map_err(map_join)?
    }

    async fn upsert(&self, event: &Event) -> Result<()> {
        let db = Arc::clone(&self.db);
        let event = event.clone();
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            conn.execute(
                "INSERT INTO events (id, calendar_id, google_id, starts_at, ends_at, activity_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (id) DO UPDATE SET
                     starts_at = excluded.starts_at,
                     ends_at = excluded.ends_at,
                     activity_id = excluded.activity_id",
                (
                    &event.id,
                    &event.calendar_id,
                    &event.google_id,
                    event.starts_at.timestamp(),
                    event.ends_at.timestamp(),
                    &event.activity_id,
                ),
            )
            .map_err(map_sql)?;
            Ok(())
        })
        .await
        .map_err(map_join)?
    }

    async fn delete_by_google_id(
        &self,
        calendar_id: &str,
        google_id: &str,
    ) -> Result<Option<Event>> {
        let db = Arc::clone(&self.db);
        let calendar_id = calendar_id.to_string();
        let google_id = google_id.to_string();
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(&format!(
                    "DELETE FROM events WHERE calendar_id = ?1 AND google_id = ?2 \
                     RETURNING {SELECT_COLUMNS}"
                ))
                .map_err(map_sql)?;
            let mut rows = stmt.query_map([calendar_id, google_id], row_to_event).map_err(map_sql)?;
            rows.next().transpose().map_err(map_sql)
        })
        .await
        .map_err(map_join)?
    }

    async fn delete_absent(&self, calendar_id: &str, keep: &[String]) -> Result<Vec<Event>> {
        let db = Arc::clone(&self.db);
        let calendar_id = calendar_id.to_string();
        let keep: HashSet<String> = keep.iter().cloned().collect();
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;

            // The keep list of a many-page pass can exceed SQLite's bound
            // parameter limit, so the diff runs here and the deletions go
            // out in batches.
            let mut stmt = conn
                .prepare("SELECT google_id FROM events WHERE calendar_id = ?1")
                .map_err(map_sql)?;
            let absent = stmt
                .query_map([&calendar_id], |row| row.get::<_, String>(0))
                .map_err(map_sql)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(map_sql)?
                .into_iter()
                .filter(|google_id| !keep.contains(google_id))
                .collect::<Vec<_>>();

            let mut deleted = Vec::with_capacity(absent.len());
            for chunk in absent.chunks(DELETE_BATCH) {
                let placeholders =
                    (0..chunk.len()).map(|i| format!("?{}", i + 2)).collect::<Vec<_>>().join(", ");
                let sql = format!(
                    "DELETE FROM events WHERE calendar_id = ?1 AND google_id IN ({placeholders}) \
                     RETURNING {SELECT_COLUMNS}"
                );

                let mut params: Vec<&dyn ToSql> = vec![&calendar_id];
                for google_id in chunk {
                    params.push(google_id);
                }

                let mut stmt = conn.prepare(&sql).map_err(map_sql)?;
                let events = stmt
                    .query_map(params.as_slice(), row_to_event)
                    .map_err(map_sql)?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(map_sql)?;
                deleted.extend(events);
            }
            Ok(deleted)
        })
        .await
        .map_err(map_join)?
    }

    async fn delete_all_for_calendar(&self, calendar_id: &str) -> Result<Vec<Event>> {
        let db = Arc::clone(&self.db);
        let calendar_id = calendar_id.to_string();
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(&format!(
                    "DELETE FROM events WHERE calendar_id = ?1 RETURNING {SELECT_COLUMNS}"
                ))
                .map_err(map_sql)?;
            let events = stmt
                .query_map([calendar_id], row_to_event)
                .map_err(map_sql)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(map_sql)?;
            Ok(events)
        })
        .await
        .map_err(map_join)?
    }
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<Event> {
    let starts_at: i64 = row.get(3)?;
    let ends_at: i64 = row.get(4)?;
    Ok(Event {
        id: row.get(0)?,
        calendar_id: row.get(1)?,
        google_id: row.get(2)?,
        starts_at: DateTime::from_timestamp(starts_at, 0).unwrap_or_default(),
        ends_at: DateTime::from_timestamp(ends_at, 0).unwrap_or_default(),
        activity_id: row.get(5)?,
    })
}
