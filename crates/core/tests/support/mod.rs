//! Mock port implementations for core tests
//!
//! In-memory mocks for every port the engine, channel manager, and
//! dispatcher consume, enabling deterministic tests without a database or
//! network.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use calbridge_domain::{
    Account, Activity, Calendar, CalbridgeError, ChannelDescriptor, ChannelLease, Credential,
    Event, ListPage, ListRequest, RemoteCalendar, RemoteEvent, Result, Subscription, SyncCursor,
    SyncTarget, TenantId,
};
use calbridge_core::{
    AccountProfile, AccountRepository, ActivityWriter, CalendarRepository, CredentialProvider,
    EventRepository, RemoteCalendarApi, SyncCursorRepository, SyncQueue, SyncTask, TenantContext,
};
use chrono::{DateTime, Duration, Utc};

/// A recorded remote call, for asserting call order and shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    ListCalendars { delta: bool },
    ListEvents { delta: bool },
    Watch { channel_id: String },
    StopWatch { channel_id: String },
}

/// Scripted remote API: pages and watch results are consumed in order.
#[derive(Default)]
pub struct MockRemote {
    calendar_pages: Mutex<VecDeque<Result<ListPage<RemoteCalendar>>>>,
    event_pages: Mutex<VecDeque<Result<ListPage<RemoteEvent>>>>,
    watch_results: Mutex<VecDeque<Result<ChannelLease>>>,
    stop_error: Mutex<Option<CalbridgeError>>,
    pub calls: Mutex<Vec<RemoteCall>>,
}

impl MockRemote {
    pub fn push_calendar_page(&self, page: Result<ListPage<RemoteCalendar>>) {
        self.calendar_pages.lock().unwrap().push_back(page);
    }

    pub fn push_event_page(&self, page: Result<ListPage<RemoteEvent>>) {
        self.event_pages.lock().unwrap().push_back(page);
    }

    pub fn push_watch(&self, result: Result<ChannelLease>) {
        self.watch_results.lock().unwrap().push_back(result);
    }

    pub fn fail_stops_with(&self, error: CalbridgeError) {
        *self.stop_error.lock().unwrap() = Some(error);
    }

    pub fn recorded_calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }
}

fn empty_page<T>() -> ListPage<T> {
    ListPage { items: Vec::new(), next_page_token: None, next_sync_token: None }
}

#[async_trait]
impl RemoteCalendarApi for MockRemote {
    async fn list_calendars(
        &self,
        _account_id: &str,
        request: &ListRequest,
    ) -> Result<ListPage<RemoteCalendar>> {
        self.calls.lock().unwrap().push(RemoteCall::ListCalendars {
            delta: matches!(request, ListRequest::Delta { .. }),
        });
        self.calendar_pages.lock().unwrap().pop_front().unwrap_or_else(|| Ok(empty_page()))
    }

    async fn list_events(
        &self,
        _account_id: &str,
        _calendar_google_id: &str,
        request: &ListRequest,
    ) -> Result<ListPage<RemoteEvent>> {
        self.calls.lock().unwrap().push(RemoteCall::ListEvents {
            delta: matches!(request, ListRequest::Delta { .. }),
        });
        self.event_pages.lock().unwrap().pop_front().unwrap_or_else(|| Ok(empty_page()))
    }

    async fn watch_calendars(
        &self,
        _account_id: &str,
        channel: &ChannelDescriptor,
    ) -> Result<ChannelLease> {
        self.record_watch(channel)
    }

    async fn watch_events(
        &self,
        _account_id: &str,
        _calendar_google_id: &str,
        channel: &ChannelDescriptor,
    ) -> Result<ChannelLease> {
        self.record_watch(channel)
    }

    async fn stop_watch(
        &self,
        _account_id: &str,
        channel_id: &str,
        _resource_id: &str,
    ) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(RemoteCall::StopWatch { channel_id: channel_id.to_string() });
        match self.stop_error.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl MockRemote {
    fn record_watch(&self, channel: &ChannelDescriptor) -> Result<ChannelLease> {
        self.calls
            .lock()
            .unwrap()
            .push(RemoteCall::Watch { channel_id: channel.channel_id.clone() });
        self.watch_results.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(ChannelLease {
                channel_id: channel.channel_id.clone(),
                resource_id: format!("res-{}", channel.channel_id),
                expires_at: Utc::now() + Duration::days(7),
            })
        })
    }
}

/// In-memory account storage.
#[derive(Default)]
pub struct MemoryAccounts {
    rows: Mutex<HashMap<String, Account>>,
}

impl MemoryAccounts {
    pub fn with_account(self, account: Account) -> Self {
        self.rows.lock().unwrap().insert(account.id.clone(), account);
        self
    }

    pub fn get(&self, id: &str) -> Option<Account> {
        self.rows.lock().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl AccountRepository for MemoryAccounts {
    async fn find(&self, id: &str) -> Result<Option<Account>> {
        Ok(self.rows.lock().unwrap().get(id).cloned())
    }

    async fn find_by_google_id(&self, google_id: &str) -> Result<Option<Account>> {
        Ok(self.rows.lock().unwrap().values().find(|a| a.google_id == google_id).cloned())
    }

    async fn list(&self) -> Result<Vec<Account>> {
        Ok(self.rows.lock().unwrap().values().cloned().collect())
    }

    async fn upsert(&self, account: &Account) -> Result<()> {
        self.rows.lock().unwrap().insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn update_credential(&self, id: &str, credential: &Credential) -> Result<()> {
        if let Some(account) = self.rows.lock().unwrap().get_mut(id) {
            account.credential = credential.clone();
        }
        Ok(())
    }

    async fn set_reauth_required(&self, id: &str, required: bool) -> Result<()> {
        if let Some(account) = self.rows.lock().unwrap().get_mut(id) {
            account.reauth_required = required;
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.rows.lock().unwrap().remove(id);
        Ok(())
    }
}

/// In-memory calendar storage.
#[derive(Default)]
pub struct MemoryCalendars {
    rows: Mutex<HashMap<String, Calendar>>,
}

impl MemoryCalendars {
    pub fn with_calendar(self, calendar: Calendar) -> Self {
        self.rows.lock().unwrap().insert(calendar.id.clone(), calendar);
        self
    }

    pub fn all(&self) -> Vec<Calendar> {
        self.rows.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl CalendarRepository for MemoryCalendars {
    async fn find(&self, id: &str) -> Result<Option<Calendar>> {
        Ok(self.rows.lock().unwrap().get(id).cloned())
    }

    async fn find_by_google_id(
        &self,
        account_id: &str,
        google_id: &str,
    ) -> Result<Option<Calendar>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|c| c.account_id == account_id && c.google_id == google_id)
            .cloned())
    }

    async fn list_for_account(&self, account_id: &str) -> Result<Vec<Calendar>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn upsert(&self, calendar: &Calendar) -> Result<()> {
        self.rows.lock().unwrap().insert(calendar.id.clone(), calendar.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.rows.lock().unwrap().remove(id);
        Ok(())
    }
}

/// In-memory event storage.
#[derive(Default)]
pub struct MemoryEvents {
    rows: Mutex<HashMap<String, Event>>,
}

impl MemoryEvents {
    pub fn with_event(self, event: Event) -> Self {
        self.rows.lock().unwrap().insert(event.id.clone(), event);
        self
    }

    pub fn for_calendar(&self, calendar_id: &str) -> Vec<Event> {
        let mut events: Vec<Event> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.calendar_id == calendar_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| a.google_id.cmp(&b.google_id));
        events
    }
}

#[async_trait]
impl EventRepository for MemoryEvents {
    async fn find_by_google_id(
        &self,
        calendar_id: &str,
        google_id: &str,
    ) -> Result<Option<Event>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|e| e.calendar_id == calendar_id && e.google_id == google_id)
            .cloned())
    }

    async fn upsert(&self, event: &Event) -> Result<()> {
        self.rows.lock().unwrap().insert(event.id.clone(), event.clone());
        Ok(())
    }

    async fn delete_by_google_id(
        &self,
        calendar_id: &str,
        google_id: &str,
    ) -> Result<Option<Event>> {
        let mut rows = self.rows.lock().unwrap();
        let id = rows
            .values()
            .find(|e| e.calendar_id == calendar_id && e.google_id == google_id)
            .map(|e| e.id.clone());
        Ok(id.and_then(|id| rows.remove(&id)))
    }

    async fn delete_absent(&self, calendar_id: &str, keep: &[String]) -> Result<Vec<Event>> {
        let mut rows = self.rows.lock().unwrap();
        let doomed: Vec<String> = rows
            .values()
            .filter(|e| e.calendar_id == calendar_id && !keep.contains(&e.google_id))
            .map(|e| e.id.clone())
            .collect();
        Ok(doomed.into_iter().filter_map(|id| rows.remove(&id)).collect())
    }

    async fn delete_all_for_calendar(&self, calendar_id: &str) -> Result<Vec<Event>> {
        let mut rows = self.rows.lock().unwrap();
        let doomed: Vec<String> = rows
            .values()
            .filter(|e| e.calendar_id == calendar_id)
            .map(|e| e.id.clone())
            .collect();
        Ok(doomed.into_iter().filter_map(|id| rows.remove(&id)).collect())
    }
}

/// In-memory activity storage.
#[derive(Default)]
pub struct MemoryActivities {
    rows: Mutex<HashMap<String, Activity>>,
}

impl MemoryActivities {
    pub fn count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn get(&self, id: &str) -> Option<Activity> {
        self.rows.lock().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl ActivityWriter for MemoryActivities {
    async fn upsert(&self, activity: &Activity) -> Result<()> {
        self.rows.lock().unwrap().insert(activity.id.clone(), activity.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.rows.lock().unwrap().remove(id);
        Ok(())
    }
}

/// In-memory cursor storage keyed by (kind, owner id).
#[derive(Default)]
pub struct MemoryCursors {
    rows: Mutex<HashMap<(String, String), SyncCursor>>,
}

impl MemoryCursors {
    fn key(target: &SyncTarget) -> (String, String) {
        (target.kind().to_string(), target.owner_id().to_string())
    }

    pub fn with_cursor(self, cursor: SyncCursor) -> Self {
        let key = Self::key(&cursor.target);
        self.rows.lock().unwrap().insert(key, cursor);
        self
    }

    pub fn get(&self, target: &SyncTarget) -> Option<SyncCursor> {
        self.rows.lock().unwrap().get(&Self::key(target)).cloned()
    }
}

#[async_trait]
impl SyncCursorRepository for MemoryCursors {
    async fn find(&self, target: &SyncTarget) -> Result<Option<SyncCursor>> {
        Ok(self.get(target))
    }

    async fn ensure(&self, target: &SyncTarget) -> Result<SyncCursor> {
        let mut rows = self.rows.lock().unwrap();
        Ok(rows
            .entry(Self::key(target))
            .or_insert_with(|| SyncCursor::new(target.clone()))
            .clone())
    }

    async fn commit_pass(
        &self,
        target: &SyncTarget,
        token: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(cursor) = rows.get_mut(&Self::key(target)) {
            if let Some(token) = token {
                cursor.token = Some(token.to_string());
            }
            cursor.last_synchronized_at = Some(at);
        }
        Ok(())
    }

    async fn clear_token(&self, target: &SyncTarget) -> Result<()> {
        if let Some(cursor) = self.rows.lock().unwrap().get_mut(&Self::key(target)) {
            cursor.token = None;
        }
        Ok(())
    }

    async fn set_subscription(&self, target: &SyncTarget, sub: &Subscription) -> Result<()> {
        if let Some(cursor) = self.rows.lock().unwrap().get_mut(&Self::key(target)) {
            cursor.subscription = Some(sub.clone());
        }
        Ok(())
    }

    async fn clear_subscription(&self, target: &SyncTarget) -> Result<()> {
        if let Some(cursor) = self.rows.lock().unwrap().get_mut(&Self::key(target)) {
            cursor.subscription = None;
        }
        Ok(())
    }

    async fn set_active(&self, target: &SyncTarget, active: bool) -> Result<()> {
        if let Some(cursor) = self.rows.lock().unwrap().get_mut(&Self::key(target)) {
            cursor.active = active;
        }
        Ok(())
    }

    async fn delete(&self, target: &SyncTarget) -> Result<()> {
        self.rows.lock().unwrap().remove(&Self::key(target));
        Ok(())
    }

    async fn find_by_channel(
        &self,
        channel_id: &str,
        resource_id: &str,
    ) -> Result<Option<SyncCursor>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|cursor| {
                cursor.subscription.as_ref().is_some_and(|sub| {
                    sub.channel_id == channel_id && sub.resource_id == resource_id
                })
            })
            .cloned())
    }

    async fn list_unwatched(&self) -> Result<Vec<SyncCursor>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.active && c.subscription.is_none())
            .cloned()
            .collect())
    }

    async fn list_expiring(&self, lead_hours: i64, now: DateTime<Utc>) -> Result<Vec<SyncCursor>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|c| {
                c.active
                    && c.subscription
                        .as_ref()
                        .is_some_and(|sub| sub.expires_within(lead_hours, now))
            })
            .cloned()
            .collect())
    }
}

/// Recording queue.
#[derive(Default)]
pub struct MemoryQueue {
    pub tasks: Mutex<Vec<SyncTask>>,
}

impl MemoryQueue {
    pub fn drained(&self) -> Vec<SyncTask> {
        self.tasks.lock().unwrap().clone()
    }
}

#[async_trait]
impl SyncQueue for MemoryQueue {
    async fn enqueue(&self, task: SyncTask) -> Result<()> {
        self.tasks.lock().unwrap().push(task);
        Ok(())
    }
}

/// Credential provider stub; `exchange_code` hands out a fixed profile.
#[derive(Default)]
pub struct StubCredentials;

#[async_trait]
impl CredentialProvider for StubCredentials {
    async fn access_token(&self, _account_id: &str) -> Result<String> {
        Ok("test-token".to_string())
    }

    async fn force_refresh(&self, _account_id: &str) -> Result<String> {
        Ok("refreshed-token".to_string())
    }

    async fn exchange_code(&self, _code: &str) -> Result<(Credential, AccountProfile)> {
        Ok((
            Credential {
                access_token: "access".to_string(),
                refresh_token: Some("refresh".to_string()),
                expires_at: Utc::now() + Duration::hours(1),
            },
            AccountProfile { google_id: "g-user".to_string(), email: "user@example.com".to_string() },
        ))
    }

    async fn revoke(&self, _account_id: &str) -> Result<bool> {
        Ok(true)
    }
}

/// All the mocks behind one tenant context, with handles kept for asserts.
pub struct Harness {
    pub ctx: TenantContext,
    pub remote: Arc<MockRemote>,
    pub accounts: Arc<MemoryAccounts>,
    pub calendars: Arc<MemoryCalendars>,
    pub events: Arc<MemoryEvents>,
    pub activities: Arc<MemoryActivities>,
    pub cursors: Arc<MemoryCursors>,
    pub queue: Arc<MemoryQueue>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(
            MemoryAccounts::default(),
            MemoryCalendars::default(),
            MemoryEvents::default(),
            MemoryCursors::default(),
        )
    }

    pub fn build(
        accounts: MemoryAccounts,
        calendars: MemoryCalendars,
        events: MemoryEvents,
        cursors: MemoryCursors,
    ) -> Self {
        let remote = Arc::new(MockRemote::default());
        let accounts = Arc::new(accounts);
        let calendars = Arc::new(calendars);
        let events = Arc::new(events);
        let activities = Arc::new(MemoryActivities::default());
        let cursors = Arc::new(cursors);
        let queue = Arc::new(MemoryQueue::default());

        let ctx = TenantContext {
            tenant: TenantId::new("tenant-1"),
            accounts: accounts.clone(),
            calendars: calendars.clone(),
            events: events.clone(),
            activities: activities.clone(),
            cursors: cursors.clone(),
            remote: remote.clone(),
            credentials: Arc::new(StubCredentials),
        };

        Self { ctx, remote, accounts, calendars, events, activities, cursors, queue }
    }
}

/// Remote event helper with sensible defaults.
pub fn remote_event(google_id: &str, starts_in_hours: i64) -> RemoteEvent {
    let starts_at = Utc::now() + Duration::hours(starts_in_hours);
    RemoteEvent {
        google_id: google_id.to_string(),
        status: calbridge_domain::RemoteEventStatus::Confirmed,
        summary: Some(format!("event {google_id}")),
        description: None,
        starts_at,
        ends_at: starts_at + Duration::hours(1),
    }
}

/// Remote calendar helper with owner access.
pub fn remote_calendar(google_id: &str) -> RemoteCalendar {
    RemoteCalendar {
        google_id: google_id.to_string(),
        summary: format!("calendar {google_id}"),
        color: Some("#4986e7".to_string()),
        timezone: Some("UTC".to_string()),
        primary: false,
        deleted: false,
        access_role: "owner".to_string(),
    }
}

/// One-page listing response.
pub fn page<T>(items: Vec<T>, next_sync_token: Option<&str>) -> ListPage<T> {
    ListPage {
        items,
        next_page_token: None,
        next_sync_token: next_sync_token.map(String::from),
    }
}
