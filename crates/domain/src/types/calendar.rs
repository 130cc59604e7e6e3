//! Locally mirrored calendar resource

use serde::{Deserialize, Serialize};

/// A remote calendar mirrored locally. Owned by exactly one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Calendar {
    pub id: String,
    pub account_id: String,
    /// Remote identity, unique per account
    pub google_id: String,
    pub name: String,
    pub color: Option<String>,
    pub timezone: Option<String>,
    pub primary: bool,
}
