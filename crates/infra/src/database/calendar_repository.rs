//! SQLite implementation of the calendar repository port

use std::sync::Arc;

use async_trait::async_trait;
use calbridge_core::CalendarRepository;
use calbridge_domain::{Calendar, Result};
use rusqlite::Row;
use tokio::task;

use super::{map_join, map_sql, TenantDb};

const SELECT_COLUMNS: &str = "id, account_id, google_id, name, color, timezone, is_primary";

pub struct SqliteCalendarRepository {
    db: Arc<TenantDb>,
}

impl SqliteCalendarRepository {
    pub fn new(db: Arc<TenantDb>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CalendarRepository for SqliteCalendarRepository {
    async fn find(&self, id: &str) -> Result<Option<Calendar>> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(&format!("SELECT {SELECT_COLUMNS} FROM calendars WHERE id = ?1"))
                .map_err(map_sql)?;
            let mut rows = stmt.query_map([id], row_to_calendar).map_err(map_sql)?;
            rows.next().transpose().map_err(map_sql)
        })
        .await
        .map_err(map_join)?
    }

    async fn find_by_google_id(
        &self,
        account_id: &str,
        google_id: &str,
    ) -> Result<Option<Calendar>> {
        let db = Arc::clone(&self.db);
        let account_id = account_id.to_string();
        let google_id = google_id.to_string();
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM calendars WHERE account_id = ?1 AND google_id = ?2"
                ))
                .map_err(map_sql)?;
            let mut rows =
                stmt.query_map([account_id, google_id], row_to_calendar).map_err(map_sql)?;
            rows.next().transpose().map_err(map_sql)
        })
        .await
        .map_err(map_join)?
    }

    async fn list_for_account(&self, account_id: &str) -> Result<Vec<Calendar>> {
        let db = Arc::clone(&self.db);
        let account_id = account_id.to_string();
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM calendars WHERE account_id = ?1 ORDER BY name"
                ))
                .map_err(map_sql)?;
            let calendars = stmt
                .query_map([account_id], row_to_calendar)
                .map_err(map_sql)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(map_sql)?;
            Ok(calendars)
        })
        .await
        .map_err(map_join)?
    }

    async fn upsert(&self, calendar: &Calendar) -> Result<()> {
        let db = Arc::clone(&self.db);
        let calendar = calendar.clone();
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            conn.execute(
                "INSERT INTO calendars (id, account_id, google_id, name, color, timezone, is_primary)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (id) DO UPDATE SET
                     name = excluded.name,
                     color = excluded.color,
                     timezone = excluded.timezone,
                     is_primary = excluded.is_primary",
                (
                    &calendar.id,
                    &calendar.account_id,
                    &calendar.google_id,
                    &calendar.name,
                    &calendar.color,
                    &calendar.timezone,
                    calendar.primary,
                ),
            )
            .map_err(map_sql)?;
            Ok(())
        })
        .await
        .map_err(map_join)?
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            conn.execute("DELETE FROM calendars WHERE id = ?1", [id]).map_err(map_sql)?;
            Ok(())
        })
        .await
        .map_err(map_join)?
    }
}

fn row_to_calendar(row: &Row<'_>) -> rusqlite::Result<Calendar> {
    Ok(Calendar {
        id: row.get(0)?,
        account_id: row.get(1)?,
        google_id: row.get(2)?,
        name: row.get(3)?,
        color: row.get(4)?,
        timezone: row.get(5)?,
        primary: row.get(6)?,
    })
}
