//! Error types used throughout the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Calbridge.
///
/// Remote protocol errors are mapped into this taxonomy exactly once, at the
/// client adapter boundary. No other component interprets raw status codes.
#[derive(Error, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum CalbridgeError {
    /// The remote rejected the stored delta token. Recovered locally by
    /// dropping mirrored children and retrying once as a full pass.
    #[error("Sync cursor expired")]
    CursorExpired,

    /// The remote resource no longer exists. Terminal for the cursor, not
    /// retried.
    #[error("Remote resource gone: {0}")]
    ResourceGone(String),

    /// The credential could not be refreshed (revoked grant). Terminal until
    /// a human reconnects the account.
    #[error("Re-authentication required: {0}")]
    ReauthRequired(String),

    /// Remote throttling. Surfaced to the worker backoff policy.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CalbridgeError {
    /// Whether the worker retry policy should re-attempt the task.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Network(_))
    }
}

/// Result type alias for Calbridge operations
pub type Result<T> = std::result::Result<T, CalbridgeError>;
