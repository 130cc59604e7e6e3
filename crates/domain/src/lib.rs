//! # Calbridge Domain
//!
//! Business domain types and models for Calbridge.
//!
//! This crate contains:
//! - Domain data types (Account, Calendar, Event, SyncCursor, ...)
//! - Domain error types and Result definitions
//! - Configuration structures
//!
//! ## Architecture
//! - No dependencies on other Calbridge crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use config::{Config, GoogleAppConfig, ServerConfig, SyncSettings, TenantConfig};
pub use errors::{CalbridgeError, Result};
pub use types::account::{Account, Credential};
pub use types::calendar::Calendar;
pub use types::cursor::{Subscription, SyncCursor, SyncTarget, TenantId};
pub use types::event::{Activity, Event};
pub use types::notification::{Notification, ResourceState};
pub use types::remote::{
    ChannelDescriptor, ChannelLease, ListPage, ListRequest, RemoteCalendar, RemoteEvent,
    RemoteEventStatus, TimeWindow,
};
