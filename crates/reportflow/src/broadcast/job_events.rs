//! Job event broadcaster for live progress streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::{EventType, JobEvent};

/// The user-facing projection of a [`JobEvent`]. Internal diagnostics are
/// never part of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEvent {
    pub id: i64,
    pub job_id: String,
    pub report_id: String,
    pub event_type: EventType,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl From<&JobEvent> for UserEvent {
    fn from(event: &JobEvent) -> Self {
        Self {
            id: event.id,
            job_id: event.job_id.clone(),
            report_id: event.report_id.clone(),
            event_type: event.event_type,
            message: event.message_user.clone(),
            created_at: event.created_at,
        }
    }
}

/// Broadcasts appended job events to live subscribers.
#[derive(Clone)]
pub struct JobEventBroadcaster {
    sender: Arc<broadcast::Sender<UserEvent>>,
}

impl JobEventBroadcaster {
    /// Creates a new broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends an event to all subscribers.
    pub fn send(&self, event: UserEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    /// Creates a new subscriber.
    pub fn subscribe(&self) -> broadcast::Receiver<UserEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for JobEventBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}
