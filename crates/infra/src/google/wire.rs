//! Serde shapes for the Google Calendar REST surface
//!
//! Everything here is private to the adapter. The conversion functions at the
//! bottom are the only place raw payloads turn into engine types.

use calbridge_domain::{
    CalbridgeError, ChannelLease, RemoteCalendar, RemoteEvent, RemoteEventStatus, Result,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(super) struct CalendarListResponse {
    #[serde(default)]
    pub items: Vec<CalendarListEntry>,
    #[serde(rename = "nextPageToken")]
    pub next_page_token: Option<String>,
    #[serde(rename = "nextSyncToken")]
    pub next_sync_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CalendarListEntry {
    pub id: String,
    pub summary: Option<String>,
    #[serde(rename = "backgroundColor")]
    pub background_color: Option<String>,
    #[serde(rename = "timeZone")]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(rename = "accessRole")]
    pub access_role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct EventsResponse {
    #[serde(default)]
    pub items: Vec<EventResource>,
    #[serde(rename = "nextPageToken")]
    pub next_page_token: Option<String>,
    #[serde(rename = "nextSyncToken")]
    pub next_sync_token: Option<String>,
}

/// A single-instance event row. Cancelled rows in a delta listing arrive as
/// tombstones carrying only `id` and `status`, so the time fields are
/// optional here even though confirmed rows always have them.
#[derive(Debug, Deserialize)]
pub(super) struct EventResource {
    pub id: String,
    pub status: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub start: Option<EventDateTime>,
    pub end: Option<EventDateTime>,
}

/// Either a timed instant (`dateTime`) or an all-day date (`date`).
#[derive(Debug, Deserialize)]
pub(super) struct EventDateTime {
    #[serde(rename = "dateTime")]
    pub date_time: Option<DateTime<Utc>>,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub(super) struct WatchResponse {
    pub id: String,
    #[serde(rename = "resourceId")]
    pub resource_id: String,
    /// Epoch milliseconds, serialized as a decimal string
    pub expiration: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct ApiErrorEnvelope {
    #[serde(default)]
    pub error: ApiError,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct ApiError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub errors: Vec<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ApiErrorDetail {
    #[serde(default)]
    pub reason: String,
}

impl ApiError {
    pub fn has_reason(&self, reason: &str) -> bool {
        self.errors.iter().any(|detail| detail.reason == reason)
    }
}

impl EventDateTime {
    /// All-day dates resolve to midnight UTC; the mirror does not track the
    /// calendar's local zone.
    fn resolve(&self) -> Option<DateTime<Utc>> {
        self.date_time.or_else(|| {
            self.date
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
    }
}

fn parse_status(raw: Option<&str>) -> RemoteEventStatus {
    match raw {
        Some("cancelled") => RemoteEventStatus::Cancelled,
        Some("tentative") => RemoteEventStatus::Tentative,
        _ => RemoteEventStatus::Confirmed,
    }
}

impl CalendarListEntry {
    pub fn into_remote(self) -> RemoteCalendar {
        RemoteCalendar {
            google_id: self.id,
            summary: self.summary.unwrap_or_default(),
            color: self.background_color,
            timezone: self.time_zone,
            primary: self.primary,
            deleted: self.deleted,
            access_role: self.access_role.unwrap_or_default(),
        }
    }
}

impl EventResource {
    pub fn into_remote(self) -> RemoteEvent {
        let status = parse_status(self.status.as_deref());
        // Tombstones carry no times; the engine only looks at the id for
        // cancelled items.
        let starts_at = self
            .start
            .as_ref()
            .and_then(EventDateTime::resolve)
            .unwrap_or(DateTime::UNIX_EPOCH);
        let ends_at = self
            .end
            .as_ref()
            .and_then(EventDateTime::resolve)
            .unwrap_or(starts_at);
        RemoteEvent {
            google_id: self.id,
            status,
            summary: self.summary,
            description: self.description,
            starts_at,
            ends_at,
        }
    }
}

impl WatchResponse {
    pub fn into_lease(self) -> Result<ChannelLease> {
        let raw = self.expiration.ok_or_else(|| {
            CalbridgeError::InvalidInput("watch response carried no expiration".to_string())
        })?;
        let millis: i64 = raw.parse().map_err(|_| {
            CalbridgeError::InvalidInput(format!("unparseable channel expiration: {raw}"))
        })?;
        let expires_at = DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
            CalbridgeError::InvalidInput(format!("channel expiration out of range: {millis}"))
        })?;
        Ok(ChannelLease { channel_id: self.id, resource_id: self.resource_id, expires_at })
    }
}
