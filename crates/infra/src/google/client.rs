//! Google Calendar REST adapter
//!
//! Speaks the calendarList, events, watch and channel-stop endpoints. All
//! status-code interpretation lives in [`interpret_failure`] so the rest of
//! the system only ever sees the domain error taxonomy.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use calbridge_domain::{
    CalbridgeError, ChannelDescriptor, ChannelLease, GoogleAppConfig, ListPage, ListRequest,
    RemoteCalendar, RemoteEvent, Result,
};
use calbridge_core::{CredentialProvider, RemoteCalendarApi};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::json;
use tracing::{debug, warn};

use crate::errors::InfraError;

use super::wire::{ApiErrorEnvelope, CalendarListResponse, EventsResponse, WatchResponse};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// REST client for one Google application, shared across tenants. Account
/// identity comes in per call; tokens come from the credential provider.
pub struct GoogleCalendarClient {
    http: Client,
    api_base: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl GoogleCalendarClient {
    pub fn new(config: &GoogleAppConfig, credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(InfraError::from)?;
        Ok(Self { http, api_base: config.api_base.trim_end_matches('/').to_string(), credentials })
    }

    /// Issues a bearer-authorized request. A 401 triggers exactly one forced
    /// token refresh and one retry; a second 401 surfaces through the
    /// taxonomy as `ReauthRequired`.
    async fn send_authorized<F>(&self, account_id: &str, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let token = self.credentials.access_token(account_id).await?;
        let response = build(&self.http)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(InfraError::from)?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return check(response).await;
        }

        debug!(account_id, "access token rejected, forcing refresh");
        let token = self.credentials.force_refresh(account_id).await?;
        let retried = build(&self.http)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(InfraError::from)?;
        check(retried).await
    }
}

/// Passes successful responses through and maps everything else onto the
/// domain taxonomy.
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(interpret_failure(status, &body))
}

fn interpret_failure(status: StatusCode, body: &str) -> CalbridgeError {
    let envelope: ApiErrorEnvelope = serde_json::from_str(body).unwrap_or_default();
    let detail = &envelope.error;
    let message = if detail.message.is_empty() {
        format!("google returned {status}")
    } else {
        detail.message.clone()
    };

    match status {
        // Expired sync token; the engine recovers with a fresh full pass.
        StatusCode::GONE => CalbridgeError::CursorExpired,
        StatusCode::NOT_FOUND => CalbridgeError::ResourceGone(message),
        StatusCode::UNAUTHORIZED => CalbridgeError::ReauthRequired(message),
        StatusCode::TOO_MANY_REQUESTS => CalbridgeError::RateLimited(message),
        StatusCode::FORBIDDEN
            if detail.has_reason("rateLimitExceeded")
                || detail.has_reason("userRateLimitExceeded")
                || detail.has_reason("quotaExceeded") =>
        {
            CalbridgeError::RateLimited(message)
        }
        // A hard 403 means the grant no longer covers the resource.
        StatusCode::FORBIDDEN => CalbridgeError::ReauthRequired(message),
        s if s.is_server_error() => CalbridgeError::Network(message),
        _ => CalbridgeError::Internal(format!("unexpected google response {status}: {message}")),
    }
}

fn calendar_query(request: &ListRequest) -> Vec<(&'static str, String)> {
    let mut query = vec![("showDeleted", "true".to_string())];
    match request {
        ListRequest::Full { page_token, .. } => {
            if let Some(token) = page_token {
                query.push(("pageToken", token.clone()));
            }
        }
        ListRequest::Delta { token, page_token } => {
            query.push(("syncToken", token.clone()));
            if let Some(token) = page_token {
                query.push(("pageToken", token.clone()));
            }
        }
    }
    query
}

fn event_query(request: &ListRequest) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("singleEvents", "true".to_string()),
        ("showDeleted", "true".to_string()),
        ("maxResults", "2500".to_string()),
    ];
    match request {
        ListRequest::Full { window, page_token } => {
            if let Some(window) = window {
                query.push(("timeMin", window.from.to_rfc3339()));
                query.push(("timeMax", window.to.to_rfc3339()));
            }
            if let Some(token) = page_token {
                query.push(("pageToken", token.clone()));
            }
        }
        ListRequest::Delta { token, page_token } => {
            query.push(("syncToken", token.clone()));
            if let Some(token) = page_token {
                query.push(("pageToken", token.clone()));
            }
        }
    }
    query
}

#[async_trait]
impl RemoteCalendarApi for GoogleCalendarClient {
    async fn list_calendars(
        &self,
        account_id: &str,
        request: &ListRequest,
    ) -> Result<ListPage<RemoteCalendar>> {
        let url = format!("{}/users/me/calendarList", self.api_base);
        let query = calendar_query(request);
        let response = self
            .send_authorized(account_id, |http| http.get(&url).query(&query))
            .await?;
        let payload: CalendarListResponse = response.json().await.map_err(InfraError::from)?;
        Ok(ListPage {
            items: payload.items.into_iter().map(|entry| entry.into_remote()).collect(),
            next_page_token: payload.next_page_token,
            next_sync_token: payload.next_sync_token,
        })
    }

    async fn list_events(
        &self,
        account_id: &str,
        calendar_google_id: &str,
        request: &ListRequest,
    ) -> Result<ListPage<RemoteEvent>> {
        let url = format!("{}/calendars/{}/events", self.api_base, calendar_google_id);
        let query = event_query(request);
        let response = self
            .send_authorized(account_id, |http| http.get(&url).query(&query))
            .await?;
        let payload: EventsResponse = response.json().await.map_err(InfraError::from)?;
        Ok(ListPage {
            items: payload.items.into_iter().map(|item| item.into_remote()).collect(),
            next_page_token: payload.next_page_token,
            next_sync_token: payload.next_sync_token,
        })
    }

    async fn watch_calendars(
        &self,
        account_id: &str,
        channel: &ChannelDescriptor,
    ) -> Result<ChannelLease> {
        let url = format!("{}/users/me/calendarList/watch", self.api_base);
        self.watch(account_id, &url, channel).await
    }

    async fn watch_events(
        &self,
        account_id: &str,
        calendar_google_id: &str,
        channel: &ChannelDescriptor,
    ) -> Result<ChannelLease> {
        let url = format!("{}/calendars/{}/events/watch", self.api_base, calendar_google_id);
        self.watch(account_id, &url, channel).await
    }

    async fn stop_watch(
        &self,
        account_id: &str,
        channel_id: &str,
        resource_id: &str,
    ) -> Result<()> {
        let url = format!("{}/channels/stop", self.api_base);
        let body = json!({ "id": channel_id, "resourceId": resource_id });
        let result = self
            .send_authorized(account_id, |http| http.post(&url).json(&body))
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                warn!(channel_id, error = %err, "channel stop failed");
                Err(err)
            }
        }
    }
}

impl GoogleCalendarClient {
    async fn watch(
        &self,
        account_id: &str,
        url: &str,
        channel: &ChannelDescriptor,
    ) -> Result<ChannelLease> {
        let body = json!({
            "id": channel.channel_id,
            "type": "web_hook",
            "address": channel.address,
        });
        let response = self
            .send_authorized(account_id, |http| http.post(url).json(&body))
            .await?;
        let payload: WatchResponse = response.json().await.map_err(InfraError::from)?;
        payload.into_lease()
    }
}
