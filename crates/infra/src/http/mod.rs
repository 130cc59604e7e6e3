//! HTTP surface: the webhook receiver

mod webhook;

pub use webhook::{router, AppState};
