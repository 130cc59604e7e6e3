//! Common data types used throughout the application

pub mod account;
pub mod calendar;
pub mod cursor;
pub mod event;
pub mod notification;
pub mod remote;
