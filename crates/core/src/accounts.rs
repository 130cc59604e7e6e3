//! Account lifecycle orchestration
//!
//! Explicit replacements for the persistence-hook side effects of the
//! original design: connecting an account seeds its cursor and first sync,
//! disconnecting tears down every subscription before anything is deleted.

use std::sync::Arc;

use calbridge_domain::{Account, CalbridgeError, Result, SyncTarget};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::channels::ChannelManager;
use crate::sync::ports::{SyncQueue, SyncTask, TaskKind, TenantContext};

/// Connect/disconnect orchestration for tenant accounts.
pub struct AccountService {
    queue: Arc<dyn SyncQueue>,
    channels: Arc<ChannelManager>,
}

impl AccountService {
    pub fn new(queue: Arc<dyn SyncQueue>, channels: Arc<ChannelManager>) -> Self {
        Self { queue, channels }
    }

    /// Complete an OAuth connection: exchange the authorization code, store
    /// the account, seed its calendar-list cursor, and queue the initial
    /// pass plus a watch registration.
    #[instrument(skip(self, ctx, code), fields(tenant = %ctx.tenant))]
    pub async fn connect(
        &self,
        ctx: &TenantContext,
        code: &str,
        scopes: Vec<String>,
    ) -> Result<Account> {
        let (credential, profile) = ctx.credentials.exchange_code(code).await?;

        let existing = ctx.accounts.find_by_google_id(&profile.google_id).await?;
        let account = Account {
            id: existing
                .as_ref()
                .map_or_else(|| Uuid::new_v4().to_string(), |account| account.id.clone()),
            google_id: profile.google_id,
            name: profile.email,
            credential,
            scopes,
            active: true,
            reauth_required: false,
        };
        ctx.accounts.upsert(&account).await?;

        let target = SyncTarget::Calendars { account_id: account.id.clone() };
        ctx.cursors.ensure(&target).await?;
        self.queue
            .enqueue(SyncTask {
                tenant: ctx.tenant.clone(),
                kind: TaskKind::Synchronize(target.clone()),
            })
            .await?;
        self.queue
            .enqueue(SyncTask { tenant: ctx.tenant.clone(), kind: TaskKind::Renew(target) })
            .await?;

        info!(account_id = %account.id, "account connected");
        Ok(account)
    }

    /// Remove an account and everything mirrored under it. Channel stops and
    /// credential revocation are best-effort; local deletion always proceeds.
    #[instrument(skip(self, ctx), fields(tenant = %ctx.tenant, account_id))]
    pub async fn disconnect(&self, ctx: &TenantContext, account_id: &str) -> Result<()> {
        let account = ctx
            .accounts
            .find(account_id)
            .await?
            .ok_or_else(|| CalbridgeError::NotFound(format!("account {account_id} not found")))?;

        for calendar in ctx.calendars.list_for_account(&account.id).await? {
            let events_target = SyncTarget::Events { calendar_id: calendar.id.clone() };
            self.channels.teardown(ctx, &events_target).await?;
            for event in ctx.events.delete_all_for_calendar(&calendar.id).await? {
                if let Some(activity_id) = event.activity_id {
                    ctx.activities.delete(&activity_id).await?;
                }
            }
            ctx.calendars.delete(&calendar.id).await?;
            ctx.cursors.delete(&events_target).await?;
        }

        let target = SyncTarget::Calendars { account_id: account.id.clone() };
        self.channels.teardown(ctx, &target).await?;
        ctx.cursors.delete(&target).await?;

        if let Err(error) = ctx.credentials.revoke(&account.id).await {
            warn!(%error, "credential revocation failed; deleting account anyway");
        }

        ctx.accounts.delete(&account.id).await?;
        info!(account_id = %account.id, "account disconnected");
        Ok(())
    }
}
