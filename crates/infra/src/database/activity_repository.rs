//! SQLite implementation of the activity writer port

use std::sync::Arc;

use async_trait::async_trait;
use calbridge_core::ActivityWriter;
use calbridge_domain::{Activity, Result};
use tokio::task;

use super::{map_join, map_sql, TenantDb};

pub struct SqliteActivityWriter {
    db: Arc<TenantDb>,
}

impl SqliteActivityWriter {
    pub fn new(db: Arc<TenantDb>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ActivityWriter for SqliteActivityWriter {
    async fn upsert(&self, activity: &Activity) -> Result<()> {
        let db = Arc::clone(&self.db);
        let activity = activity.clone();
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            conn.execute(
                "INSERT INTO activities (id, title, comment, schedule_from, schedule_to)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (id) DO UPDATE SET
                     title = excluded.title,
                     comment = excluded.comment,
                     schedule_from = excluded.schedule_from,
                     schedule_to = excluded.schedule_to",
                (
                    &activity.id,
                    &activity.title,
                    &activity.comment,
                    activity.schedule_from.timestamp(),
                    activity.schedule_to.timestamp(),
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
            conn.execute("DELETE FROM activities WHERE id = ?1", [id]).map_err(map_sql)?;
            Ok(())
        })
        .await
        .map_err(map_join)?
    }
}
