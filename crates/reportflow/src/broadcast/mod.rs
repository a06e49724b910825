//! Broadcasting for real-time event streaming.

pub mod job_events;

pub use job_events::{JobEventBroadcaster, UserEvent};
