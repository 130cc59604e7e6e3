//! Tenant resolution backed by the static configuration file
//!
//! Each tenant owns an isolated SQLite database. Contexts are built lazily on
//! first use and cached for the life of the process; the pool inside
//! `TenantDb` handles connection reuse from there.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use calbridge_core::{TenantContext, TenantDirectory};
use calbridge_domain::{CalbridgeError, Config, GoogleAppConfig, Result, TenantConfig, TenantId};
use tracing::info;

use crate::database::{
    SqliteAccountRepository, SqliteActivityWriter, SqliteCalendarRepository,
    SqliteCursorRepository, SqliteEventRepository, TenantDb,
};
use crate::google::{GoogleCalendarClient, GoogleCredentialProvider};

const POOL_SIZE: u32 = 8;

/// Directory over the tenants named in the configuration. Host routing is an
/// exact-match lookup; unknown hosts resolve to `NotFound`.
pub struct StaticTenantDirectory {
    google: GoogleAppConfig,
    refresh_threshold_secs: i64,
    hosts: HashMap<String, TenantId>,
    configs: HashMap<TenantId, TenantConfig>,
    ordered: Vec<TenantId>,
    open_contexts: parking_lot::Mutex<HashMap<TenantId, Arc<TenantContext>>>,
}

impl StaticTenantDirectory {
    pub fn new(config: &Config) -> Self {
        let mut hosts = HashMap::new();
        let mut configs = HashMap::new();
        let mut ordered = Vec::new();
        for tenant in &config.tenants {
            let id = TenantId(tenant.id.clone());
            hosts.insert(tenant.host.clone(), id.clone());
            configs.insert(id.clone(), tenant.clone());
            ordered.push(id);
        }
        Self {
            google: config.google.clone(),
            refresh_threshold_secs: config.sync.refresh_threshold_secs,
            hosts,
            configs,
            ordered,
            open_contexts: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    fn build_context(&self, tenant: &TenantId, config: &TenantConfig) -> Result<Arc<TenantContext>> {
        let db = TenantDb::open(&config.db_path, POOL_SIZE)?;
        let accounts = Arc::new(SqliteAccountRepository::new(db.clone()));
        let credentials = Arc::new(GoogleCredentialProvider::new(
            self.google.clone(),
            accounts.clone(),
            self.refresh_threshold_secs,
        )?);
        let remote = Arc::new(GoogleCalendarClient::new(&self.google, credentials.clone())?);
        info!(tenant = %tenant, db = %db.path().display(), "tenant context opened");
        Ok(Arc::new(TenantContext {
            tenant: tenant.clone(),
            accounts,
            calendars: Arc::new(SqliteCalendarRepository::new(db.clone())),
            events: Arc::new(SqliteEventRepository::new(db.clone())),
            activities: Arc::new(SqliteActivityWriter::new(db.clone())),
            cursors: Arc::new(SqliteCursorRepository::new(db)),
            remote,
            credentials,
        }))
    }
}

#[async_trait]
impl TenantDirectory for StaticTenantDirectory {
    async fn resolve_host(&self, host: &str) -> Result<TenantId> {
        // Hosts arrive with or without a port, depending on the proxy in
        // front. Match on the name alone.
        let name = host.split(':').next().unwrap_or(host);
        self.hosts
            .get(name)
            .cloned()
            .ok_or_else(|| CalbridgeError::NotFound(format!("no tenant for host {name}")))
    }

    async fn open(&self, tenant: &TenantId) -> Result<Arc<TenantContext>> {
        let mut open = self.open_contexts.lock();
        if let Some(ctx) = open.get(tenant) {
            return Ok(ctx.clone());
        }
        let config = self
            .configs
            .get(tenant)
            .ok_or_else(|| CalbridgeError::NotFound(format!("unknown tenant {tenant}")))?;
        let ctx = self.build_context(tenant, config)?;
        open.insert(tenant.clone(), ctx.clone());
        Ok(ctx)
    }

    async fn tenants(&self) -> Result<Vec<TenantId>> {
        Ok(self.ordered.clone())
    }
}
