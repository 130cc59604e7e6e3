//! Sync cursors and the resources that own them

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Stable tenant identifier used to partition storage access.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A synchronizable resource: either an account's calendar list or one
/// calendar's events. Dispatch is on the variant, never on downcasts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum SyncTarget {
    /// Sync the calendar list of an account
    Calendars { account_id: String },
    /// Sync the events of a single calendar
    Events { calendar_id: String },
}

impl SyncTarget {
    /// Local id of the owning resource.
    pub fn owner_id(&self) -> &str {
        match self {
            Self::Calendars { account_id } => account_id,
            Self::Events { calendar_id } => calendar_id,
        }
    }

    /// Stable discriminant used as the polymorphic owner type in storage.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Calendars { .. } => "account",
            Self::Events { .. } => "calendar",
        }
    }
}

impl fmt::Display for SyncTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.owner_id())
    }
}

/// An active webhook subscription, as stored on a cursor.
///
/// The channel id is a surrogate identity re-issued on every renewal, so a
/// stale notification can never match a rotated subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub channel_id: String,
    pub resource_id: String,
    pub expires_at: DateTime<Utc>,
}

impl Subscription {
    /// Whether the subscription should be renewed `lead_hours` before expiry.
    pub fn expires_within(&self, lead_hours: i64, now: DateTime<Utc>) -> bool {
        self.expires_at <= now + Duration::hours(lead_hours)
    }
}

/// Per-resource synchronization state.
///
/// `token` is only ever written from a `nextSyncToken` the remote returned
/// after a fully committed pass; a `None` token forces the next pass to run
/// in full mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncCursor {
    pub target: SyncTarget,
    pub token: Option<String>,
    pub last_synchronized_at: Option<DateTime<Utc>>,
    pub subscription: Option<Subscription>,
    /// Cleared when the remote resource is gone; terminal until reconnected
    pub active: bool,
}

impl SyncCursor {
    /// Fresh cursor for a newly created resource: full sync pending, no
    /// subscription yet.
    pub fn new(target: SyncTarget) -> Self {
        Self {
            target,
            token: None,
            last_synchronized_at: None,
            subscription: None,
            active: true,
        }
    }
}
