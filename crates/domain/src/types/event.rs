//! Mirrored event occurrences and their derived activity records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A mirrored event occurrence. Owned by exactly one calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub calendar_id: String,
    /// Remote identity, unique per calendar
    pub google_id: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    /// Reference to the derived local activity record
    pub activity_id: Option<String>,
}

/// Derived local record kept in step with a mirrored event.
///
/// Created and removed alongside its event; the engine is the only writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub title: String,
    pub comment: String,
    pub schedule_from: DateTime<Utc>,
    pub schedule_to: DateTime<Utc>,
}
