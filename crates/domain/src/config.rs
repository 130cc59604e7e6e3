//! Configuration structures
//!
//! Typed application configuration. Loading (environment variables with a
//! file fallback) lives in the infra crate.

use serde::{Deserialize, Serialize};

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub google: GoogleAppConfig,
    #[serde(default)]
    pub sync: SyncSettings,
    pub tenants: Vec<TenantConfig>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the webhook endpoint, e.g. `0.0.0.0:8470`
    pub bind_addr: String,
}

/// Google application (OAuth client) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleAppConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Redirect URI registered for the OAuth client
    pub redirect_uri: String,
    /// Public HTTPS address Google delivers push notifications to
    pub webhook_address: String,
    /// Overridable for tests (wiremock)
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_token_endpoint")]
    pub token_endpoint: String,
    #[serde(default = "default_userinfo_endpoint")]
    pub userinfo_endpoint: String,
}

/// Synchronization tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Full-mode event window: how far back to mirror
    pub lookback_days: i64,
    /// Full-mode event window: how far ahead to mirror
    pub lookahead_days: i64,
    /// Renew a channel when its expiry is within this lead time
    pub renewal_lead_hours: i64,
    /// Sweep interval for resources without an active channel
    pub periodic_interval_secs: u64,
    /// Sweep interval for expiring channels
    pub renewal_interval_secs: u64,
    /// Worker pool size
    pub workers: usize,
    /// Retry budget for transient remote failures
    pub max_retry_attempts: u32,
    /// Refresh the access token when it expires within this threshold
    pub refresh_threshold_secs: i64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            lookback_days: 365,
            lookahead_days: 730,
            renewal_lead_hours: 48,
            periodic_interval_secs: 300,
            renewal_interval_secs: 3600,
            workers: 4,
            max_retry_attempts: 5,
            refresh_threshold_secs: 300,
        }
    }
}

/// One tenant in the static registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    /// Stable tenant identifier
    pub id: String,
    /// Inbound host name used to route webhook notifications
    pub host: String,
    /// Path to the tenant's sqlite database file
    pub db_path: String,
}

fn default_api_base() -> String {
    "https://www.googleapis.com/calendar/v3".to_string()
}

fn default_token_endpoint() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_userinfo_endpoint() -> String {
    "https://openidconnect.googleapis.com/v1/userinfo".to_string()
}
