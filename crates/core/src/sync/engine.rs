//! Synchronization engine
//!
//! Orchestrates one sync pass for one resource: decides full vs. incremental,
//! paginates, applies the item-level upsert/delete policy, and commits the
//! cursor as the last action of the pass. Passes are idempotent; items are
//! applied at-least-once by natural external key, so a crash mid-pass only
//! repeats work, never skips it.

use std::sync::Arc;

use calbridge_domain::{
    Activity, Calendar, CalbridgeError, Event, ListRequest, RemoteCalendar, RemoteEvent,
    RemoteEventStatus, Result, Subscription, SyncSettings, SyncTarget, TimeWindow,
};
use chrono::{Duration, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::lease::LeaseRegistry;
use super::ports::{SyncQueue, SyncTask, TaskKind, TenantContext};
use crate::channels::{ChannelManager, DetachedChannel};

/// Calendar access role whose events are mirrored. Non-owner calendars are
/// filtered at list level and never mirrored at event level.
const OWNER_ROLE: &str = "owner";

/// Engine tuning derived from configuration.
#[derive(Debug, Clone)]
pub struct SyncPolicy {
    /// Full-mode event window: how far back to mirror
    pub lookback_days: i64,
    /// Full-mode event window: how far ahead to mirror
    pub lookahead_days: i64,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self { lookback_days: 365, lookahead_days: 730 }
    }
}

impl From<&SyncSettings> for SyncPolicy {
    fn from(settings: &SyncSettings) -> Self {
        Self {
            lookback_days: settings.lookback_days,
            lookahead_days: settings.lookahead_days,
        }
    }
}

/// Terminal result of a synchronization invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The pass ran and committed its cursor
    Completed { upserted: usize, deleted: usize },
    /// Another pass holds the resource lease; this invocation was dropped
    InFlight,
    /// The cursor is deactivated; nothing to do until reconnected
    Inactive,
    /// The remote resource no longer exists; cursor deactivated
    Gone,
    /// The credential is unusable and the account was flagged
    ReauthRequired,
}

/// The synchronization engine. Safe to share across workers.
pub struct SyncEngine {
    leases: LeaseRegistry,
    queue: Arc<dyn SyncQueue>,
    channels: Arc<ChannelManager>,
    policy: SyncPolicy,
}

impl SyncEngine {
    pub fn new(
        leases: LeaseRegistry,
        queue: Arc<dyn SyncQueue>,
        channels: Arc<ChannelManager>,
        policy: SyncPolicy,
    ) -> Self {
        Self { leases, queue, channels, policy }
    }

    /// Run one synchronization pass for `target`.
    ///
    /// Concurrent invocations for different resources are independent;
    /// concurrent invocations for the same resource are serialized by the
    /// lease, with the loser dropped. Transient remote failures propagate to
    /// the caller's retry policy; everything else is resolved here.
    #[instrument(skip(self, ctx), fields(tenant = %ctx.tenant, target = %target))]
    pub async fn synchronize(&self, ctx: &TenantContext, target: &SyncTarget) -> Result<SyncOutcome> {
        let Some(_lease) = self.leases.try_acquire(&ctx.tenant, target) else {
            debug!("pass already in flight; dropping duplicate invocation");
            return Ok(SyncOutcome::InFlight);
        };

        let cursor = ctx.cursors.ensure(target).await?;
        if !cursor.active {
            debug!("cursor inactive; skipping");
            return Ok(SyncOutcome::Inactive);
        }

        let mut token = cursor.token;
        let mut reset_attempted = false;

        loop {
            match self.run_pass(ctx, target, token.as_deref()).await {
                Ok(outcome) => return Ok(outcome),
                Err(CalbridgeError::CursorExpired) if !reset_attempted => {
                    warn!("delta token rejected; dropping mirrors and retrying as full pass");
                    reset_attempted = true;
                    self.drop_mirrored_children(ctx, target).await?;
                    ctx.cursors.clear_token(target).await?;
                    token = None;
                }
                Err(CalbridgeError::CursorExpired) => {
                    return Err(CalbridgeError::Internal(
                        "remote rejected a token-free full pass as expired".into(),
                    ));
                }
                Err(CalbridgeError::ResourceGone(reason)) => {
                    info!(%reason, "remote resource gone; deactivating cursor");
                    ctx.cursors.set_active(target, false).await?;
                    return Ok(SyncOutcome::Gone);
                }
                Err(CalbridgeError::ReauthRequired(reason)) => {
                    warn!(%reason, "credential unusable; flagging account for re-authentication");
                    let account_id = ctx.owning_account_id(target).await?;
                    ctx.accounts.set_reauth_required(&account_id, true).await?;
                    return Ok(SyncOutcome::ReauthRequired);
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Delete every mirrored child of `target`, including derived records and
    /// (for calendars) their own cursors and subscriptions. Used for
    /// expired-cursor recovery and for "resource removed" notifications.
    pub async fn drop_mirrored_children(
        &self,
        ctx: &TenantContext,
        target: &SyncTarget,
    ) -> Result<()> {
        match target {
            SyncTarget::Calendars { account_id } => {
                for calendar in ctx.calendars.list_for_account(account_id).await? {
                    self.remove_calendar(ctx, &calendar).await?;
                }
            }
            SyncTarget::Events { calendar_id } => {
                self.drop_events(ctx, calendar_id).await?;
            }
        }
        Ok(())
    }

    /// Local-only variant of [`Self::drop_mirrored_children`] for the webhook
    /// path: mirrors and cursors go without any remote call, and child
    /// channels still registered remotely are returned so the caller can
    /// queue their stops.
    pub async fn detach_mirrored_children(
        &self,
        ctx: &TenantContext,
        target: &SyncTarget,
    ) -> Result<Vec<DetachedChannel>> {
        match target {
            SyncTarget::Calendars { account_id } => {
                let mut detached = Vec::new();
                for calendar in ctx.calendars.list_for_account(account_id).await? {
                    if let Some(subscription) = self.remove_calendar_local(ctx, &calendar).await? {
                        detached.push(DetachedChannel {
                            account_id: account_id.clone(),
                            subscription,
                        });
                    }
                }
                Ok(detached)
            }
            SyncTarget::Events { calendar_id } => {
                self.drop_events(ctx, calendar_id).await?;
                Ok(Vec::new())
            }
        }
    }

    async fn run_pass(
        &self,
        ctx: &TenantContext,
        target: &SyncTarget,
        token: Option<&str>,
    ) -> Result<SyncOutcome> {
        let full = token.is_none();
        let request = match token {
            Some(token) => ListRequest::Delta { token: token.to_string(), page_token: None },
            None => ListRequest::Full { window: self.window_for(target), page_token: None },
        };

        match target {
            SyncTarget::Calendars { account_id } => {
                self.sync_calendars(ctx, target, account_id, request, full).await
            }
            SyncTarget::Events { calendar_id } => {
                self.sync_events(ctx, target, calendar_id, request, full).await
            }
        }
    }

    /// Full event listings are bounded by a configured window; the calendar
    /// list has no meaningful time axis.
    fn window_for(&self, target: &SyncTarget) -> Option<TimeWindow> {
        match target {
            SyncTarget::Calendars { .. } => None,
            SyncTarget::Events { .. } => {
                let now = Utc::now();
                Some(TimeWindow {
                    from: now - Duration::days(self.policy.lookback_days),
                    to: now + Duration::days(self.policy.lookahead_days),
                })
            }
        }
    }

    async fn sync_calendars(
        &self,
        ctx: &TenantContext,
        target: &SyncTarget,
        account_id: &str,
        initial: ListRequest,
        full: bool,
    ) -> Result<SyncOutcome> {
        let mut request = initial;
        let mut items: Vec<RemoteCalendar> = Vec::new();
        let mut sync_token: Option<String> = None;

        loop {
            let page = ctx.remote.list_calendars(account_id, &request).await?;
            sync_token = page.next_sync_token.or(sync_token);
            items.extend(page.items);
            match page.next_page_token {
                Some(next) => request = request.with_page(next),
                None => break,
            }
        }

        let mut upserted = 0usize;
        let mut deleted = 0usize;
        let mut seen: Vec<String> = Vec::with_capacity(items.len());

        for item in &items {
            if item.deleted {
                if self.delete_calendar_mirror(ctx, account_id, &item.google_id).await? {
                    deleted += 1;
                }
                continue;
            }

            if item.access_role != OWNER_ROLE {
                debug!(google_id = %item.google_id, role = %item.access_role, "calendar not owned; not mirroring");
                if self.delete_calendar_mirror(ctx, account_id, &item.google_id).await? {
                    deleted += 1;
                }
                continue;
            }

            seen.push(item.google_id.clone());

            let existing = ctx.calendars.find_by_google_id(account_id, &item.google_id).await?;
            let id = existing
                .as_ref()
                .map_or_else(|| Uuid::new_v4().to_string(), |calendar| calendar.id.clone());

            ctx.calendars
                .upsert(&Calendar {
                    id: id.clone(),
                    account_id: account_id.to_string(),
                    google_id: item.google_id.clone(),
                    name: item.summary.clone(),
                    color: item.color.clone(),
                    timezone: item.timezone.clone(),
                    primary: item.primary,
                })
                .await?;
            upserted += 1;

            if existing.is_none() {
                // First sighting: give the calendar its own cursor and queue
                // its initial pass plus a watch registration.
                let events_target = SyncTarget::Events { calendar_id: id };
                ctx.cursors.ensure(&events_target).await?;
                self.queue
                    .enqueue(SyncTask {
                        tenant: ctx.tenant.clone(),
                        kind: TaskKind::Synchronize(events_target.clone()),
                    })
                    .await?;
                self.queue
                    .enqueue(SyncTask {
                        tenant: ctx.tenant.clone(),
                        kind: TaskKind::Renew(events_target),
                    })
                    .await?;
            }
        }

        if full {
            for calendar in ctx.calendars.list_for_account(account_id).await? {
                if !seen.contains(&calendar.google_id) {
                    self.remove_calendar(ctx, &calendar).await?;
                    deleted += 1;
                }
            }
        }

        ctx.cursors.commit_pass(target, sync_token.as_deref(), Utc::now()).await?;
        info!(upserted, deleted, full, "calendar list pass committed");
        Ok(SyncOutcome::Completed { upserted, deleted })
    }

    async fn sync_events(
        &self,
        ctx: &TenantContext,
        target: &SyncTarget,
        calendar_id: &str,
        initial: ListRequest,
        full: bool,
    ) -> Result<SyncOutcome> {
        let calendar = ctx.calendars.find(calendar_id).await?.ok_or_else(|| {
            CalbridgeError::NotFound(format!("calendar {calendar_id} not found"))
        })?;

        let mut request = initial;
        let mut items: Vec<RemoteEvent> = Vec::new();
        let mut sync_token: Option<String> = None;

        loop {
            let page = ctx
                .remote
                .list_events(&calendar.account_id, &calendar.google_id, &request)
                .await?;
            sync_token = page.next_sync_token.or(sync_token);
            items.extend(page.items);
            match page.next_page_token {
                Some(next) => request = request.with_page(next),
                None => break,
            }
        }

        let now = Utc::now();
        let mut upserted = 0usize;
        let mut deleted = 0usize;
        let mut seen: Vec<String> = Vec::with_capacity(items.len());

        for item in &items {
            if item.status == RemoteEventStatus::Cancelled {
                if let Some(event) =
                    ctx.events.delete_by_google_id(calendar_id, &item.google_id).await?
                {
                    if let Some(activity_id) = event.activity_id {
                        ctx.activities.delete(&activity_id).await?;
                    }
                    deleted += 1;
                }
                continue;
            }

            let existing = ctx.events.find_by_google_id(calendar_id, &item.google_id).await?;

            // Policy: past events are not newly mirrored, but an existing
            // mirror keeps receiving updates and is never deleted for age.
            if existing.is_none() && item.starts_at < now {
                debug!(google_id = %item.google_id, "skipping creation of past event");
                continue;
            }

            seen.push(item.google_id.clone());

            let (id, activity_id) = match &existing {
                Some(event) => (
                    event.id.clone(),
                    event.activity_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string()),
                ),
                None => (Uuid::new_v4().to_string(), Uuid::new_v4().to_string()),
            };

            ctx.activities
                .upsert(&Activity {
                    id: activity_id.clone(),
                    title: item.summary.clone().unwrap_or_default(),
                    comment: item.description.clone().unwrap_or_default(),
                    schedule_from: item.starts_at,
                    schedule_to: item.ends_at,
                })
                .await?;
            ctx.events
                .upsert(&Event {
                    id,
                    calendar_id: calendar_id.to_string(),
                    google_id: item.google_id.clone(),
                    starts_at: item.starts_at,
                    ends_at: item.ends_at,
                    activity_id: Some(activity_id),
                })
                .await?;
            upserted += 1;
        }

        if full {
            for event in ctx.events.delete_absent(calendar_id, &seen).await? {
                if let Some(activity_id) = event.activity_id {
                    ctx.activities.delete(&activity_id).await?;
                }
                deleted += 1;
            }
        }

        ctx.cursors.commit_pass(target, sync_token.as_deref(), Utc::now()).await?;
        info!(upserted, deleted, full, "event pass committed");
        Ok(SyncOutcome::Completed { upserted, deleted })
    }

    async fn delete_calendar_mirror(
        &self,
        ctx: &TenantContext,
        account_id: &str,
        google_id: &str,
    ) -> Result<bool> {
        match ctx.calendars.find_by_google_id(account_id, google_id).await? {
            Some(calendar) => {
                self.remove_calendar(ctx, &calendar).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove a calendar mirror with everything hanging off it. Subscription
    /// teardown runs first, best-effort, before the cursor is destroyed.
    async fn remove_calendar(&self, ctx: &TenantContext, calendar: &Calendar) -> Result<()> {
        let events_target = SyncTarget::Events { calendar_id: calendar.id.clone() };
        self.channels.teardown(ctx, &events_target).await?;
        self.remove_calendar_local(ctx, calendar).await?;
        Ok(())
    }

    /// Drops the calendar's events, the calendar, and its cursor. Returns the
    /// subscription that was still attached, if any, without stopping it.
    async fn remove_calendar_local(
        &self,
        ctx: &TenantContext,
        calendar: &Calendar,
    ) -> Result<Option<Subscription>> {
        let events_target = SyncTarget::Events { calendar_id: calendar.id.clone() };
        let subscription =
            ctx.cursors.find(&events_target).await?.and_then(|cursor| cursor.subscription);
        self.drop_events(ctx, &calendar.id).await?;
        ctx.calendars.delete(&calendar.id).await?;
        ctx.cursors.delete(&events_target).await?;
        Ok(subscription)
    }

    async fn drop_events(&self, ctx: &TenantContext, calendar_id: &str) -> Result<()> {
        for event in ctx.events.delete_all_for_calendar(calendar_id).await? {
            if let Some(activity_id) = event.activity_id {
                ctx.activities.delete(&activity_id).await?;
            }
        }
        Ok(())
    }
}
