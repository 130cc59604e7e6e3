//! SQLite storage, one database per tenant
//!
//! Repositories implement the async ports from `calbridge-core` with
//! blocking rusqlite calls moved onto the blocking thread pool.

mod account_repository;
mod activity_repository;
mod calendar_repository;
mod cursor_repository;
mod event_repository;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use calbridge_domain::{CalbridgeError, Result};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use tracing::info;

pub use account_repository::SqliteAccountRepository;
pub use activity_repository::SqliteActivityWriter;
pub use calendar_repository::SqliteCalendarRepository;
pub use cursor_repository::SqliteCursorRepository;
pub use event_repository::SqliteEventRepository;

use crate::errors::InfraError;

const SCHEMA_VERSION: i32 = 1;
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Connection pool over one tenant's database file.
pub struct TenantDb {
    pool: Pool<SqliteConnectionManager>,
    path: PathBuf,
}

impl TenantDb {
    /// Open (creating if needed) the tenant database at `db_path`.
    pub fn open<P: AsRef<Path>>(db_path: P, pool_size: u32) -> Result<Arc<Self>> {
        let path = db_path.as_ref().to_path_buf();

        let manager = SqliteConnectionManager::file(&path).with_init(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")
        });

        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)
            .map_err(|e| CalbridgeError::Database(format!("failed to open pool: {e}")))?;

        info!(db_path = %path.display(), max_connections = pool.max_size(), "sqlite pool initialised");

        let db = Arc::new(Self { pool, path });
        db.run_migrations()?;
        Ok(db)
    }

    /// Acquire a connection from the pool.
    pub fn get_connection(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| InfraError::from(e).into())
    }

    /// Ensure the full schema exists on the current database.
    pub fn run_migrations(&self) -> Result<()> {
        let conn = self.get_connection()?;
        conn.execute_batch(SCHEMA_SQL).map_err(map_sql)?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, CAST(strftime('%s','now') AS INTEGER))",
            params![SCHEMA_VERSION],
        )
        .map_err(map_sql)?;
        Ok(())
    }

    /// Return the configured database path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire a connection and run a trivial query to verify the database
    /// is responsive.
    pub fn health_check(&self) -> Result<()> {
        let conn = self.get_connection()?;
        conn.query_row("SELECT 1", params![], |row| row.get::<_, i32>(0)).map_err(map_sql)?;
        Ok(())
    }
}

pub(crate) fn map_sql(err: rusqlite::Error) -> CalbridgeError {
    InfraError::from(err).into()
}

pub(crate) fn map_join(err: tokio::task::JoinError) -> CalbridgeError {
    InfraError::from(err).into()
}
