//! # Calbridge Core
//!
//! Pure orchestration layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - The synchronization engine and its per-resource lease registry
//! - The webhook channel manager and dispatcher
//! - Account lifecycle orchestration
//! - Port/adapter interfaces (traits)
//!
//! ## Architecture Principles
//! - Only depends on `calbridge-domain`
//! - No database, HTTP, or transport code
//! - All external dependencies via traits
//! - Tenant context is passed explicitly into every call, never ambient

pub mod accounts;
pub mod channels;
pub mod dispatch;
pub mod sync;

// Re-export specific items to avoid ambiguity
pub use accounts::AccountService;
pub use channels::{ChannelManager, ChannelOutcome, DetachedChannel};
pub use dispatch::{DispatchOutcome, WebhookDispatcher};
pub use sync::engine::{SyncEngine, SyncOutcome, SyncPolicy};
pub use sync::lease::{LeaseGuard, LeaseRegistry};
pub use sync::ports::{
    AccountProfile, AccountRepository, ActivityWriter, CalendarRepository, CredentialProvider,
    EventRepository, RemoteCalendarApi, SyncCursorRepository, SyncQueue, SyncTask, TaskKind,
    TenantContext, TenantDirectory,
};
