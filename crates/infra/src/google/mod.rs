//! Google Calendar and OAuth adapters

mod client;
mod credentials;
mod wire;

pub use client::GoogleCalendarClient;
pub use credentials::GoogleCredentialProvider;
