//! Append-only event log scoped to `(report, job)`.
//!
//! Every append is persisted first and then published to live
//! subscribers.

use crate::broadcast::{JobEventBroadcaster, UserEvent};
use crate::db::event_repo::NewEvent;
use crate::db::DatabaseError;
use crate::model::{EventType, JobEvent};
use crate::store::StatusStore;

#[derive(Clone)]
pub struct EventLog {
    store: StatusStore,
    broadcaster: JobEventBroadcaster,
}

impl EventLog {
    pub fn new(store: StatusStore, broadcaster: JobEventBroadcaster) -> Self {
        Self { store, broadcaster }
    }

    pub fn append(
        &self,
        report_id: &str,
        job_id: &str,
        event_type: EventType,
        message_user: &str,
        message_internal: Option<&str>,
    ) -> Result<JobEvent, DatabaseError> {
        let event = self.store.append_event(&NewEvent {
            job_id,
            report_id,
            event_type,
            message_user,
            message_internal,
        })?;
        self.publish(&event);
        Ok(event)
    }

    /// Publishes an event persisted elsewhere, e.g. inside an admission
    /// transaction. Call only after the write committed.
    pub fn publish(&self, event: &JobEvent) {
        self.broadcaster.send(UserEvent::from(event));
    }

    /// The `limit` most recent events of a job, oldest first.
    pub fn recent(&self, job_id: &str, limit: u32) -> Result<Vec<JobEvent>, DatabaseError> {
        self.store.recent_events(job_id, limit)
    }

    pub fn broadcaster(&self) -> &JobEventBroadcaster {
        &self.broadcaster
    }
}
