//! Port interfaces for synchronization and tenant-bound data access

use std::sync::Arc;

use async_trait::async_trait;
use calbridge_domain::{
    Account, Activity, Calendar, CalbridgeError, ChannelDescriptor, ChannelLease, Credential,
    Event, ListPage, ListRequest, RemoteCalendar, RemoteEvent, Result, Subscription, SyncCursor,
    SyncTarget, TenantId,
};
use chrono::{DateTime, Utc};

use crate::channels::DetachedChannel;

/// Engine-level calls against the remote calendar protocol.
///
/// Implementations inject credentials per account and map every remote error
/// code into the domain taxonomy; nothing above this trait sees raw codes.
#[async_trait]
pub trait RemoteCalendarApi: Send + Sync {
    /// List the account's calendar list, one page per call.
    async fn list_calendars(
        &self,
        account_id: &str,
        request: &ListRequest,
    ) -> Result<ListPage<RemoteCalendar>>;

    /// List one calendar's events, recurrences expanded and deletions
    /// included so cancellations are observable.
    async fn list_events(
        &self,
        account_id: &str,
        calendar_google_id: &str,
        request: &ListRequest,
    ) -> Result<ListPage<RemoteEvent>>;

    /// Register a push channel on the account's calendar list.
    async fn watch_calendars(
        &self,
        account_id: &str,
        channel: &ChannelDescriptor,
    ) -> Result<ChannelLease>;

    /// Register a push channel on one calendar's events.
    async fn watch_events(
        &self,
        account_id: &str,
        calendar_google_id: &str,
        channel: &ChannelDescriptor,
    ) -> Result<ChannelLease>;

    /// Stop a push channel. Callers treat failures as best-effort.
    async fn stop_watch(&self, account_id: &str, channel_id: &str, resource_id: &str)
        -> Result<()>;
}

/// Usable-credential capability: refresh-if-expired with atomic persistence.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Current access token for the account, refreshed when close to expiry.
    async fn access_token(&self, account_id: &str) -> Result<String>;

    /// Force a refresh regardless of expiry (after a remote 401). At most one
    /// refresh runs per account at a time.
    async fn force_refresh(&self, account_id: &str) -> Result<String>;

    /// Exchange an OAuth authorization code for a credential and the remote
    /// profile it belongs to.
    async fn exchange_code(&self, code: &str) -> Result<(Credential, AccountProfile)>;

    /// Revoke the account's grant. Best-effort on disconnect.
    async fn revoke(&self, account_id: &str) -> Result<bool>;
}

/// Remote identity returned alongside an exchanged credential.
#[derive(Debug, Clone)]
pub struct AccountProfile {
    pub google_id: String,
    pub email: String,
}

/// Account storage, keyed by local id.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn find(&self, id: &str) -> Result<Option<Account>>;
    async fn find_by_google_id(&self, google_id: &str) -> Result<Option<Account>>;
    async fn list(&self) -> Result<Vec<Account>>;
    async fn upsert(&self, account: &Account) -> Result<()>;
    /// Single atomic update of the stored token pair.
    async fn update_credential(&self, id: &str, credential: &Credential) -> Result<()>;
    async fn set_reauth_required(&self, id: &str, required: bool) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Calendar mirror storage. Deleting a calendar cascades its events and
/// their activities; subscription teardown is the caller's job.
#[async_trait]
pub trait CalendarRepository: Send + Sync {
    async fn find(&self, id: &str) -> Result<Option<Calendar>>;
    async fn find_by_google_id(&self, account_id: &str, google_id: &str)
        -> Result<Option<Calendar>>;
    async fn list_for_account(&self, account_id: &str) -> Result<Vec<Calendar>>;
    async fn upsert(&self, calendar: &Calendar) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Event mirror storage, keyed by (calendar, external id).
#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn find_by_google_id(&self, calendar_id: &str, google_id: &str)
        -> Result<Option<Event>>;
    async fn upsert(&self, event: &Event) -> Result<()>;
    /// Returns the deleted row so the caller can drop its derived record.
    async fn delete_by_google_id(
        &self,
        calendar_id: &str,
        google_id: &str,
    ) -> Result<Option<Event>>;
    /// Full-mode reconciliation: delete mirrors whose external id is not in
    /// `keep`. Returns the deleted rows.
    async fn delete_absent(&self, calendar_id: &str, keep: &[String]) -> Result<Vec<Event>>;
    async fn delete_all_for_calendar(&self, calendar_id: &str) -> Result<Vec<Event>>;
}

/// Writer for the derived local activity records events reference.
#[async_trait]
pub trait ActivityWriter: Send + Sync {
    async fn upsert(&self, activity: &Activity) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Sync cursor storage, keyed by the owning resource.
#[async_trait]
pub trait SyncCursorRepository: Send + Sync {
    async fn find(&self, target: &SyncTarget) -> Result<Option<SyncCursor>>;
    /// Create-if-missing; a fresh cursor means the next pass runs full.
    async fn ensure(&self, target: &SyncTarget) -> Result<SyncCursor>;
    /// One logical update of token + last-synchronized timestamp, performed
    /// as the final step of a pass. `None` keeps the existing token.
    async fn commit_pass(
        &self,
        target: &SyncTarget,
        token: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()>;
    async fn clear_token(&self, target: &SyncTarget) -> Result<()>;
    async fn set_subscription(&self, target: &SyncTarget, sub: &Subscription) -> Result<()>;
    async fn clear_subscription(&self, target: &SyncTarget) -> Result<()>;
    async fn set_active(&self, target: &SyncTarget, active: bool) -> Result<()>;
    async fn delete(&self, target: &SyncTarget) -> Result<()>;
    /// Resolve a notification's (channel id, resource id) pair.
    async fn find_by_channel(
        &self,
        channel_id: &str,
        resource_id: &str,
    ) -> Result<Option<SyncCursor>>;
    /// Active cursors with no subscription (periodic sweep input).
    async fn list_unwatched(&self) -> Result<Vec<SyncCursor>>;
    /// Active cursors whose subscription expires within the lead time.
    async fn list_expiring(&self, lead_hours: i64, now: DateTime<Utc>) -> Result<Vec<SyncCursor>>;
}

/// A unit of queued work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    /// Run a synchronization pass for the resource
    Synchronize(SyncTarget),
    /// Ensure/renew the resource's push channel
    Renew(SyncTarget),
    /// Stop a channel left behind by a locally deleted cursor
    StopChannel(DetachedChannel),
}

/// A queued task, bound to the tenant it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTask {
    pub tenant: TenantId,
    pub kind: TaskKind,
}

/// Work queue consumed by the worker pool. Enqueueing never blocks on the
/// work itself; webhook handlers only ever enqueue and return.
#[async_trait]
pub trait SyncQueue: Send + Sync {
    async fn enqueue(&self, task: SyncTask) -> Result<()>;
}

/// Everything a task needs, bound to one tenant's storage partition.
///
/// Resolved once per task and passed explicitly; there is no ambient
/// "current tenant" state anywhere in the engine.
pub struct TenantContext {
    pub tenant: TenantId,
    pub accounts: Arc<dyn AccountRepository>,
    pub calendars: Arc<dyn CalendarRepository>,
    pub events: Arc<dyn EventRepository>,
    pub activities: Arc<dyn ActivityWriter>,
    pub cursors: Arc<dyn SyncCursorRepository>,
    pub remote: Arc<dyn RemoteCalendarApi>,
    pub credentials: Arc<dyn CredentialProvider>,
}

impl TenantContext {
    /// Local id of the account that owns a sync target.
    pub async fn owning_account_id(&self, target: &SyncTarget) -> Result<String> {
        match target {
            SyncTarget::Calendars { account_id } => Ok(account_id.clone()),
            SyncTarget::Events { calendar_id } => {
                let calendar = self.calendars.find(calendar_id).await?.ok_or_else(|| {
                    CalbridgeError::NotFound(format!("calendar {calendar_id} not found"))
                })?;
                Ok(calendar.account_id)
            }
        }
    }
}

/// Multi-tenant context resolution, implemented by infrastructure.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Resolve an inbound request host to a tenant.
    async fn resolve_host(&self, host: &str) -> Result<TenantId>;
    /// Open (or reuse) the tenant's bound context.
    async fn open(&self, tenant: &TenantId) -> Result<Arc<TenantContext>>;
    /// All known tenants, for scheduler sweeps.
    async fn tenants(&self) -> Result<Vec<TenantId>>;
}
