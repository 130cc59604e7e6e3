//! Webhook channel lifecycle
//!
//! Creates, renews, and tears down push-notification channels. Renewal is
//! start-before-stop: the replacement channel is registered and persisted
//! before the old one is stopped, so there is never a window with zero
//! active subscriptions. The short overlap can deliver duplicate
//! notifications, which only trigger idempotent sync passes.

use calbridge_domain::{
    CalbridgeError, ChannelDescriptor, ChannelLease, Result, Subscription, SyncTarget,
};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::sync::ports::TenantContext;

/// What a channel operation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOutcome {
    /// A fresh channel was registered
    Started,
    /// An expiring channel was replaced by a new one
    Rotated,
    /// The existing channel is healthy; nothing done
    AlreadyActive,
    /// The cursor is inactive; no channel is kept for it
    Skipped,
}

/// A channel whose cursor has already been deleted locally. It stays
/// registered remotely until stopped or expired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedChannel {
    pub account_id: String,
    pub subscription: Subscription,
}

/// Manages push channel registrations per synchronizable resource.
pub struct ChannelManager {
    webhook_address: String,
    renewal_lead_hours: i64,
}

impl ChannelManager {
    pub fn new(webhook_address: String, renewal_lead_hours: i64) -> Self {
        Self { webhook_address, renewal_lead_hours }
    }

    /// Make sure `target` has a live channel: register one if none exists,
    /// rotate it if it expires within the renewal window, otherwise leave it
    /// alone.
    #[instrument(skip(self, ctx), fields(tenant = %ctx.tenant, target = %target))]
    pub async fn ensure_watch(
        &self,
        ctx: &TenantContext,
        target: &SyncTarget,
    ) -> Result<ChannelOutcome> {
        let cursor = ctx.cursors.ensure(target).await?;
        if !cursor.active {
            debug!("cursor inactive; not watching");
            return Ok(ChannelOutcome::Skipped);
        }

        match cursor.subscription {
            None => {
                self.start(ctx, target, None).await?;
                Ok(ChannelOutcome::Started)
            }
            Some(ref sub) if sub.expires_within(self.renewal_lead_hours, Utc::now()) => {
                self.start(ctx, target, Some(sub.clone())).await?;
                Ok(ChannelOutcome::Rotated)
            }
            Some(_) => Ok(ChannelOutcome::AlreadyActive),
        }
    }

    /// Stop the channel (best-effort) and clear the subscription fields. A
    /// failed remote stop never blocks local cleanup.
    #[instrument(skip(self, ctx), fields(tenant = %ctx.tenant, target = %target))]
    pub async fn teardown(&self, ctx: &TenantContext, target: &SyncTarget) -> Result<()> {
        let Some(cursor) = ctx.cursors.find(target).await? else {
            return Ok(());
        };

        if let Some(sub) = cursor.subscription {
            self.stop_best_effort(ctx, target, &sub).await;
            ctx.cursors.clear_subscription(target).await?;
        }

        Ok(())
    }

    /// Stop a channel whose cursor no longer exists. Best-effort: a failed
    /// stop is logged and the channel is left to expire.
    #[instrument(skip(self, ctx, channel), fields(tenant = %ctx.tenant, channel_id = %channel.subscription.channel_id))]
    pub async fn stop_detached(&self, ctx: &TenantContext, channel: &DetachedChannel) {
        if let Err(error) = ctx
            .remote
            .stop_watch(
                &channel.account_id,
                &channel.subscription.channel_id,
                &channel.subscription.resource_id,
            )
            .await
        {
            warn!(%error, "stop-watch failed for detached channel");
        }
    }

    /// Register a channel under a fresh surrogate id, persist the new
    /// subscription, then stop the replaced channel. Channel ids are never
    /// reused, so a stale notification can never match a rotated channel.
    async fn start(
        &self,
        ctx: &TenantContext,
        target: &SyncTarget,
        replacing: Option<Subscription>,
    ) -> Result<()> {
        let descriptor = ChannelDescriptor {
            channel_id: Uuid::new_v4().to_string(),
            address: self.webhook_address.clone(),
        };

        let lease = self.watch(ctx, target, &descriptor).await?;

        ctx.cursors
            .set_subscription(
                target,
                &Subscription {
                    channel_id: lease.channel_id.clone(),
                    resource_id: lease.resource_id.clone(),
                    expires_at: lease.expires_at,
                },
            )
            .await?;

        info!(channel_id = %lease.channel_id, expires_at = %lease.expires_at, "channel registered");

        if let Some(old) = replacing {
            self.stop_best_effort(ctx, target, &old).await;
        }

        Ok(())
    }

    async fn watch(
        &self,
        ctx: &TenantContext,
        target: &SyncTarget,
        descriptor: &ChannelDescriptor,
    ) -> Result<ChannelLease> {
        match target {
            SyncTarget::Calendars { account_id } => {
                ctx.remote.watch_calendars(account_id, descriptor).await
            }
            SyncTarget::Events { calendar_id } => {
                let calendar = ctx.calendars.find(calendar_id).await?.ok_or_else(|| {
                    CalbridgeError::NotFound(format!("calendar {calendar_id} not found"))
                })?;
                ctx.remote
                    .watch_events(&calendar.account_id, &calendar.google_id, descriptor)
                    .await
            }
        }
    }

    async fn stop_best_effort(&self, ctx: &TenantContext, target: &SyncTarget, sub: &Subscription) {
        let account_id = match ctx.owning_account_id(target).await {
            Ok(id) => id,
            Err(error) => {
                warn!(%error, channel_id = %sub.channel_id, "could not resolve owner for channel stop");
                return;
            }
        };

        if let Err(error) =
            ctx.remote.stop_watch(&account_id, &sub.channel_id, &sub.resource_id).await
        {
            warn!(%error, channel_id = %sub.channel_id, "stop-watch failed; continuing cleanup");
        }
    }
}
