//! Inbound webhook notification metadata

use serde::{Deserialize, Serialize};

/// Resource-state signal carried by a push notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    /// Handshake sent on channel creation; acknowledge only
    Sync,
    /// Something changed on the watched resource
    Exists,
    /// The watched resource was removed
    NotExists,
}

impl ResourceState {
    /// Parse the `x-goog-resource-state` header value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sync" => Some(Self::Sync),
            "exists" => Some(Self::Exists),
            "not_exists" => Some(Self::NotExists),
            _ => None,
        }
    }
}

/// Notification metadata extracted from an inbound webhook request.
///
/// Notifications carry no payload state; they only identify a subscription
/// and signal that an idempotent sync pass should run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub channel_id: String,
    pub resource_id: String,
    pub state: ResourceState,
}
