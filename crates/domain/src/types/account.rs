//! Connected Google account and its OAuth credential

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// OAuth token pair for a connected account.
///
/// Opaque to the engine beyond the expiry check; refresh is the credential
/// provider's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Whether the access token expires within `threshold_secs` from `now`.
    pub fn expires_within(&self, threshold_secs: i64, now: DateTime<Utc>) -> bool {
        self.expires_at <= now + Duration::seconds(threshold_secs)
    }
}

/// A tenant's connected remote identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    /// Remote identity, unique per tenant
    pub google_id: String,
    /// Display name (usually the email address)
    pub name: String,
    pub credential: Credential,
    /// Granted capability scopes
    pub scopes: Vec<String>,
    pub active: bool,
    /// Set when the refresh grant was revoked; cleared on reconnect
    pub reauth_required: bool,
}
