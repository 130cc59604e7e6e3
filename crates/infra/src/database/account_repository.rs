//! SQLite implementation of the account repository port

use std::sync::Arc;

use async_trait::async_trait;
use calbridge_core::AccountRepository;
use calbridge_domain::{Account, CalbridgeError, Credential, Result};
use chrono::DateTime;
use rusqlite::Row;
use tokio::task;

use super::{map_join, map_sql, TenantDb};

const SELECT_COLUMNS: &str = "id, google_id, name, access_token, refresh_token, \
     token_expires_at, scopes, active, reauth_required";

pub struct SqliteAccountRepository {
    db: Arc<TenantDb>,
}

impl SqliteAccountRepository {
    pub fn new(db: Arc<TenantDb>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AccountRepository for SqliteAccountRepository {
    async fn find(&self, id: &str) -> Result<Option<Account>> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(&format!("SELECT {SELECT_COLUMNS} FROM accounts WHERE id = ?1"))
                .map_err(map_sql)?;
            let mut rows = stmt.query_map([id], row_to_account).map_err(map_sql)?;
            rows.next().transpose().map_err(map_sql)
        })
        .await
        .map_err(map_join)?
    }

    async fn find_by_google_id(&self, google_id: &str) -> Result<Option<Account>> {
        let db = Arc::clone(&self.db);
        let google_id = google_id.to_string();
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(&format!("SELECT {SELECT_COLUMNS} FROM accounts WHERE google_id = ?1"))
                .map_err(map_sql)?;
            let mut rows = stmt.query_map([google_id], row_to_account).map_err(map_sql)?;
            rows.next().transpose().map_err(map_sql)
        })
        .await
        .map_err(map_join)?
    }

    async fn list(&self) -> Result<Vec<Account>> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(&format!("SELECT {SELECT_COLUMNS} FROM accounts ORDER BY name"))
                .map_err(map_sql)?;
            let accounts = stmt
                .query_map([], row_to_account)
                .map_err(map_sql)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(map_sql)?;
            Ok(accounts)
        })
        .await
        .map_err(map_join)?
    }

    async fn upsert(&self, account: &Account) -> Result<()> {
        let db = Arc::clone(&self.db);
        let account = account.clone();
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            let scopes = serde_json::to_string(&account.scopes)
                .map_err(|e| CalbridgeError::Internal(e.to_string()))?;
            conn.execute(
                "INSERT INTO accounts (id, google_id, name, access_token, refresh_token, \
                     token_expires_at, scopes, active, reauth_required)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT (id) DO UPDATE SET
                     google_id = excluded.google_id,
                     name = excluded.name,
                     access_token = excluded.access_token,
                     refresh_token = excluded.refresh_token,
                     token_expires_at = excluded.token_expires_at,
                     scopes = excluded.scopes,
                     active = excluded.active,
                     reauth_required = excluded.reauth_required",
                (
                    &account.id,
                    &account.google_id,
                    &account.name,
                    &account.credential.access_token,
                    &account.credential.refresh_token,
                    account.credential.expires_at.timestamp(),
                    scopes,
                    account.active,
                    account.reauth_required,
                ),
            )
            .map_err(map_sql)?;
            Ok(())
        })
        .await
        .map_err(map_join)?
    }

    async fn update_credential(&self, id: &str, credential: &Credential) -> Result<()> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();
        let credential = credential.clone();
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            let updated = conn
                .execute(
                    "UPDATE accounts SET access_token = ?2, refresh_token = ?3, \
                         token_expires_at = ?4 WHERE id = ?1",
                    (
                        &id,
                        &credential.access_token,
                        &credential.refresh_token,
                        credential.expires_at.timestamp(),
                    ),
                )
                .map_err(map_sql)?;
            if updated == 0 {
                return Err(CalbridgeError::NotFound(format!("account {id} not found")));
            }
            Ok(())
        })
        .await
        .map_err(map_join)?
    }

    async fn set_reauth_required(&self, id: &str, required: bool) -> Result<()> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();
        task::spawn_blocking(move || {
            let conn = db.get_connection()?;
            conn.execute("UPDATE accounts SET reauth_required = ?2 WHERE id = ?1", (&id, required))
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
            conn.execute("DELETE FROM accounts WHERE id = ?1", [id]).map_err(map_sql)?;
            Ok(())
        })
        .await
        .map_err(map_join)?
    }
}

fn row_to_account(row: &Row<'_>) -> rusqlite::Result<Account> {
    let expires_at: i64 = row.get(5)?;
    let scopes_json: String = row.get(6)?;
    Ok(Account {
        id: row.get(0)?,
        google_id: row.get(1)?,
        name: row.get(2)?,
        credential: Credential {
            access_token: row.get(3)?,
            refresh_token: row.get(4)?,
            expires_at: DateTime::from_timestamp(expires_at, 0).unwrap_or_default(),
        },
        scopes: serde_json::from_str(&scopes_json).unwrap_or_default(),
        active: row.get(7)?,
        reauth_required: row.get(8)?,
    })
}
