//! Push notification receiver
//!
//! Google retries on non-2xx and backs off on repeated failures, so the
//! handler classifies quickly and leaves the actual work to the queue. No
//! remote I/O happens on this path.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::routing::{get, post};
use axum::Router;
use calbridge_core::{DispatchOutcome, TenantDirectory, WebhookDispatcher};
use calbridge_domain::{CalbridgeError, Notification, ResourceState};
use tracing::{debug, warn};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub directory: Arc<dyn TenantDirectory>,
    pub dispatcher: Arc<WebhookDispatcher>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/google/webhook", post(google_webhook))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

async fn google_webhook(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
) -> StatusCode {
    let Some(channel_id) = header(&headers, "x-goog-channel-id") else {
        warn!("notification without channel id dropped");
        return StatusCode::BAD_REQUEST;
    };
    let Some(resource_id) = header(&headers, "x-goog-resource-id") else {
        warn!(channel_id, "notification without resource id dropped");
        return StatusCode::BAD_REQUEST;
    };
    let raw_state = header(&headers, "x-goog-resource-state").unwrap_or_default();
    let Some(resource_state) = ResourceState::parse(raw_state) else {
        // Unknown states are acknowledged so the remote does not retry them.
        warn!(channel_id, raw_state, "notification with unknown state dropped");
        return StatusCode::OK;
    };

    // HTTP/2 carries the authority in the URI rather than a Host header.
    let host = header(&headers, "host")
        .or_else(|| uri.authority().map(|authority| authority.as_str()))
        .unwrap_or_default();
    let tenant = match state.directory.resolve_host(host).await {
        Ok(tenant) => tenant,
        Err(CalbridgeError::NotFound(_)) => {
            warn!(host, "notification for unknown host dropped");
            return StatusCode::NOT_FOUND;
        }
        Err(err) => {
            warn!(host, error = %err, "tenant resolution failed");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };
    let ctx = match state.directory.open(&tenant).await {
        Ok(ctx) => ctx,
        Err(err) => {
            warn!(tenant = %tenant, error = %err, "tenant context unavailable");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };

    let notification = Notification {
        channel_id: channel_id.to_string(),
        resource_id: resource_id.to_string(),
        state: resource_state,
    };
    match state.dispatcher.dispatch(&ctx, &notification).await {
        Ok(DispatchOutcome::Unknown) => StatusCode::NOT_FOUND,
        Ok(outcome) => {
            debug!(tenant = %tenant, ?outcome, "notification handled");
            StatusCode::OK
        }
        Err(err) => {
            warn!(tenant = %tenant, error = %err, "notification dispatch failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
