//! HTTP handlers grouped by resource.

pub mod admin;
pub mod events;
pub mod health;
pub mod reports;
