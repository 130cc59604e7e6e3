//! Synchronization engine, lease registry, and the ports they consume

pub mod engine;
pub mod lease;
pub mod ports;

pub use engine::{SyncEngine, SyncOutcome, SyncPolicy};
pub use lease::LeaseRegistry;
