//! Engine-level view of the remote listing and watch protocol
//!
//! These types are what the core ports speak. Wire formats stay in the infra
//! adapter; raw status codes never cross this boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bounded time window for full-mode listings. A design choice, not a remote
/// requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// One page request against the remote listing capability.
///
/// Full and delta filters are mutually exclusive at the protocol level; the
/// enum makes passing both unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListRequest {
    /// Complete state, bounded by a window where the resource supports one
    Full { window: Option<TimeWindow>, page_token: Option<String> },
    /// Changes since the stored delta token
    Delta { token: String, page_token: Option<String> },
}

impl ListRequest {
    /// Same request pointed at a continuation page.
    pub fn with_page(&self, page_token: String) -> Self {
        match self {
            Self::Full { window, .. } => {
                Self::Full { window: *window, page_token: Some(page_token) }
            }
            Self::Delta { token, .. } => {
                Self::Delta { token: token.clone(), page_token: Some(page_token) }
            }
        }
    }
}

/// One page of a listing response.
#[derive(Debug, Clone)]
pub struct ListPage<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
    /// Only present on the final page of a pass
    pub next_sync_token: Option<String>,
}

/// Calendar list entry as the engine sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteCalendar {
    pub google_id: String,
    pub summary: String,
    pub color: Option<String>,
    pub timezone: Option<String>,
    pub primary: bool,
    pub deleted: bool,
    /// `owner` calendars are the only ones mirrored at event level
    pub access_role: String,
}

/// Event status as reported by the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteEventStatus {
    Confirmed,
    Tentative,
    Cancelled,
}

/// Event occurrence as the engine sees it (recurrences pre-expanded).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteEvent {
    pub google_id: String,
    pub status: RemoteEventStatus,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

/// Parameters for a watch call: the surrogate channel identity and the
/// address notifications should be delivered to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    pub channel_id: String,
    pub address: String,
}

/// What the remote returns from a successful watch call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelLease {
    pub channel_id: String,
    pub resource_id: String,
    pub expires_at: DateTime<Utc>,
}
