use tracing::{debug, info, warn};

use crate::db::DatabaseError;
use crate::events::EventLog;
use crate::model::EventType;

/// The event log scoped to one run.
///
/// Each entry is mirrored to tracing with its internal detail; only the
/// user message reaches live subscribers.
pub struct RunLog {
    events: EventLog,
    report_id: String,
    job_id: String,
}

impl RunLog {
    pub fn new(events: EventLog, report_id: &str, job_id: &str) -> Self {
        Self {
            events,
            report_id: report_id.to_string(),
            job_id: job_id.to_string(),
        }
    }

    fn append(
        &self,
        event_type: EventType,
        message: &str,
        internal: Option<&str>,
    ) -> Result<(), DatabaseError> {
        self.events
            .append(&self.report_id, &self.job_id, event_type, message, internal)?;
        Ok(())
    }

    pub fn info(&self, message: &str) -> Result<(), DatabaseError> {
        info!("{}", message);
        self.append(EventType::Info, message, None)
    }

    pub fn info_with(&self, message: &str, internal: &str) -> Result<(), DatabaseError> {
        info!(detail = internal, "{}", message);
        self.append(EventType::Info, message, Some(internal))
    }

    pub fn progress(&self, message: &str) -> Result<(), DatabaseError> {
        debug!("{}", message);
        self.append(EventType::Progress, message, None)
    }

    pub fn error(&self, message: &str, internal: &str) -> Result<(), DatabaseError> {
        warn!(detail = internal, "{}", message);
        self.append(EventType::Error, message, Some(internal))
    }
}
