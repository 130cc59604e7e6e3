//! SQLite implementation of the sync cursor repository port
//!
//! Cursors are keyed by (owner kind, owner id), mirroring the polymorphic
//! `SyncTarget` discriminant. The subscription triple lives on the same row
//! so rotation updates it in one statement.

use std::sync::Arc;

use async_trait::async_trait;
use calbridge_core::SyncCursorRepository;
use calbridge_domain::{CalbridgeError, Result, Subscription, SyncCursor, SyncTarget};
use chrono::{DateTime, Utc};
use rusqlite::Row;
use tokio::task;

use super::{map_join, map_sql, TenantDb};

const SELECT_COLUMNS: &str = "owner_kind, owner_id, token, last_synchronized_at, \
     channel_id, resource_id, channel_expires_at, active";

pub struct SqliteCursorRepository {
    db: Arc<TenantDb>,
}

impl SqliteCursorRepository {
    pub fn new(db: Arc<TenantDb>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SyncCursorRepository for SqliteCursorRepository {
    async fn find(&self, target: &SyncTarget) -> Result<Option<SyncCursor>> {
        let db = Arc::clone(&self.db);
        let (kind, owner) = owner_key(target);
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM sync_cursors WHERE owner_kind = ?1 AND owner_id = ?2"
                ))
                .map_err(map_sql)?;
            let mut rows = stmt.query_map([kind, owner], row_to_cursor).map_err(map_sql)?;
            rows.next().transpose().map_err(map_sql)?.transpose()
        })
        .await
        .map_err(map_join)?
    }

    async fn ensure(&self, target: &SyncTarget) -> Result<SyncCursor> {
        let db = Arc::clone(&self.db);
        let (kind, owner) = owner_key(target);
        let fresh = SyncCursor::new(target.clone());
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            conn.execute(
                "INSERT OR IGNORE INTO sync_cursors (owner_kind, owner_id, active) VALUES (?1, ?2, 1)",
                [&kind, &owner],
            )
            .map_err(map_sql)?;

            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM sync_cursors WHERE owner_kind = ?1 AND owner_id = ?2"
                ))
                .map_err(map_sql)?;
            let mut rows = stmt.query_map([kind, owner], row_to_cursor).map_err(map_sql)?;
            match rows.next().transpose().map_err(map_sql)?.transpose()? {
                Some(cursor) => Ok(cursor),
                None => Ok(fresh),
            }
        })
        .await
        .map_err(map_join)?
    }

    async fn commit_pass(
        &self,
        target: &SyncTarget,
        token: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let db = Arc::clone(&self.db);
        let (kind, owner) = owner_key(target);
        let token = token.map(String::from);
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            // COALESCE keeps the stored token when the pass produced none.
            conn.execute(
                "UPDATE sync_cursors SET token = COALESCE(?3, token), last_synchronized_at = ?4 \
                 WHERE owner_kind = ?1 AND owner_id = ?2",
                (&kind, &owner, &token, at.timestamp()),
            )
            .map_err(map_sql)?;
            Ok(())
        })
        .await
        .map_err(map_join)?
    }

    async fn clear_token(&self, target: &SyncTarget) -> Result<()> {
        self.execute_for_owner(
            target,
            "UPDATE sync_cursors SET token = NULL WHERE owner_kind = ?1 AND owner_id = ?2",
        )
        .await
    }

    async fn set_subscription(&self, target: &SyncTarget, sub: &Subscription) -> Result<()> {
        let db = Arc::clone(&self.db);
        let (kind, owner) = owner_key(target);
        let sub = sub.clone();
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            conn.execute(
                "UPDATE sync_cursors SET channel_id = ?3, resource_id = ?4, channel_expires_at = ?5 \
                 WHERE owner_kind = ?1 AND owner_id = ?2",
                (&kind, &owner, &sub.channel_id, &sub.resource_id, sub.expires_at.timestamp()),
            )
            .map_err(map_sql)?;
            Ok(())
        })
        .await
        .map_err(map_join)?
    }

    async fn clear_subscription(&self, target: &SyncTarget) -> Result<()> {
        self.execute_for_owner(
            target,
            "UPDATE sync_cursors SET channel_id = NULL, resource_id = NULL, \
             channel_expires_at = NULL WHERE owner_kind = ?1 AND owner_id = ?2",
        )
        .await
    }

    async fn set_active(&self, target: &SyncTarget, active: bool) -> Result<()> {
        let db = Arc::clone(&self.db);
        let (kind, owner) = owner_key(target);
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            conn.execute(
                "UPDATE sync_cursors SET active = ?3 WHERE owner_kind = ?1 AND owner_id = ?2",
                (&kind, &owner, active),
            )
            .map_err(map_sql)?;
            Ok(())
        })
        .await
        .map_err(map_join)?
    }

    async fn delete(&self, target: &SyncTarget) -> Result<()> {
        self.execute_for_owner(
            target,
            "DELETE FROM sync_cursors WHERE owner_kind = ?1 AND owner_id = ?2",
        )
        .await
    }

    async fn find_by_channel(
        &self,
        channel_id: &str,
        resource_id: &str,
    ) -> Result<Option<SyncCursor>> {
        let db = Arc::clone(&self.db);
        let channel_id = channel_id.to_string();
        let resource_id = resource_id.to_string();
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM sync_cursors \
                     WHERE channel_id = ?1 AND resource_id = ?2"
                ))
                .map_err(map_sql)?;
            let mut rows = stmt.query_map([channel_id, resource_id], row_to_cursor).map_err(map_sql)?;
            rows.next().transpose().map_err(map_sql)?.transpose()
        })
        .await
        .map_err(map_join)?
    }

    async fn list_unwatched(&self) -> Result<Vec<SyncCursor>> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM sync_cursors WHERE active = 1 AND channel_id IS NULL"
                ))
                .map_err(map_sql)?;
            let cursors = stmt
                .query_map([], row_to_cursor)
                .map_err(map_sql)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(map_sql)?
                .into_iter()
                .collect::<Result<Vec<_>>>()?;
            Ok(cursors)
        })
        .await
        .map_err(map_join)?
    }

    async fn list_expiring(&self, lead_hours: i64, now: DateTime<Utc>) -> Result<Vec<SyncCursor>> {
        let db = Arc::clone(&self.db);
        let deadline = (now + chrono::Duration::hours(lead_hours)).timestamp();
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM sync_cursors \
                     WHERE active = 1 AND channel_expires_at IS NOT NULL AND channel_expires_at <= ?1"
                ))
                .map_err(map_sql)?;
            let cursors = stmt
                .query_map([deadline], row_to_cursor)
                .map_err(map_sql)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(map_sql)?
                .into_iter()
                .collect::<Result<Vec<_>>>()?;
            Ok(cursors)
        })
        .await
        .map_err(map_join)?
    }
}

impl SqliteCursorRepository {
    async fn execute_for_owner(&self, target: &SyncTarget, sql: &'static str) -> Result<()> {
        let db = Arc::clone(&self.db);
        let (kind, owner) = owner_key(target);
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            conn.execute(sql, [kind, owner]).map_err(map_sql)?;
            Ok(())
        })
        .await
        .map_err(map_join)?
    }
}

fn owner_key(target: &SyncTarget) -> (String, String) {
    (target.kind().to_string(), target.owner_id().to_string())
}

fn target_from_key(kind: &str, owner_id: String) -> Result<SyncTarget> {
    match kind {
        "account" => Ok(SyncTarget::Calendars { account_id: owner_id }),
        "calendar" => Ok(SyncTarget::Events { calendar_id: owner_id }),
        other => Err(CalbridgeError::Database(format!("unknown cursor owner kind: {other}"))),
    }
}

fn row_to_cursor(row: &Row<'_>) -> rusqlite::Result<Result<SyncCursor>> {
    let kind: String = row.get(0)?;
    let owner_id: String = row.get(1)?;
    let token: Option<String> = row.get(2)?;
    let last_synchronized_at: Option<i64> = row.get(3)?;
    let channel_id: Option<String> = row.get(4)?;
    let resource_id: Option<String> = row.get(5)?;
    let channel_expires_at: Option<i64> = row.get(6)?;
    let active: bool = row.get(7)?;

    Ok(target_from_key(&kind, owner_id).map(|target| {
        let subscription = match (channel_id, resource_id, channel_expires_at) {
            (Some(channel_id), Some(resource_id), Some(expires)) => Some(Subscription {
                channel_id,
                resource_id,
                expires_at: DateTime::from_timestamp(expires, 0).unwrap_or_default(),
            }),
            _ => None,
        };
        SyncCursor {
            target,
            token,
            last_synchronized_at: last_synchronized_at
                .and_then(|ts| DateTime::from_timestamp(ts, 0)),
            subscription,
            active,
        }
    }))
}
