//! # Calbridge Infrastructure
//!
//! Infrastructure implementations of core domain ports.
//!
//! This crate contains:
//! - SQLite-backed repositories (one database per tenant)
//! - The Google Calendar HTTP client and OAuth credential provider
//! - The webhook HTTP endpoint, task queue, worker pool, and schedulers
//!
//! ## Architecture
//! - Implements traits defined in `calbridge-core`
//! - Depends on `calbridge-domain` and `calbridge-core`
//! - Contains all "impure" code (I/O, protocol details, storage)

pub mod config;
pub mod database;
pub mod errors;
pub mod google;
pub mod http;
pub mod queue;
pub mod scheduler;
pub mod tenants;

pub use database::TenantDb;
pub use errors::InfraError;
pub use google::{GoogleCalendarClient, GoogleCredentialProvider};
pub use http::{router, AppState};
pub use queue::{QueueHandle, TaskQueue, WorkerPool};
pub use scheduler::{SweepScheduler, SweepSchedulerConfig};
pub use tenants::StaticTenantDirectory;
