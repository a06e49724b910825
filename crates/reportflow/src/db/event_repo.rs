//! Event repository: the append-only `job_events` table.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use super::{format_timestamp, parse_column, parse_timestamp};
use super::DatabaseError;
use crate::model::{EventType, JobEvent};

/// A raw event row from the database.
#[derive(Debug, Clone)]
pub struct EventRow {
    pub id: i64,
    pub job_id: String,
    pub report_id: String,
    pub event_type: String,
    pub message_user: String,
    pub message_internal: Option<String>,
    pub created_at: String,
}

impl EventRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            report_id: row.get("report_id")?,
            event_type: row.get("event_type")?,
            message_user: row.get("message_user")?,
            message_internal: row.get("message_internal")?,
            created_at: row.get("created_at")?,
        })
    }

    pub fn into_event(self) -> Result<JobEvent, DatabaseError> {
        Ok(JobEvent {
            event_type: parse_column("job_events.event_type", &self.event_type)?,
            created_at: parse_timestamp(&self.created_at)?,
            id: self.id,
            job_id: self.job_id,
            report_id: self.report_id,
            message_user: self.message_user,
            message_internal: self.message_internal,
        })
    }
}

/// Fields of an event to be appended.
#[derive(Debug, Clone)]
pub struct NewEvent<'a> {
    pub job_id: &'a str,
    pub report_id: &'a str,
    pub event_type: EventType,
    pub message_user: &'a str,
    pub message_internal: Option<&'a str>,
}

/// Appends an event.
///
/// `created_at` is clamped to the job's latest event so per-job order is
/// monotonic even if the wall clock steps back.
pub fn append(
    conn: &Connection,
    event: &NewEvent<'_>,
    now: DateTime<Utc>,
) -> Result<JobEvent, DatabaseError> {
    let candidate = format_timestamp(now);
    let latest: Option<String> = conn.query_row(
        "SELECT MAX(created_at) FROM job_events WHERE job_id = ?1",
        params![event.job_id],
        |r| r.get(0),
    )?;
    let created_at = match latest {
        Some(latest) if latest > candidate => latest,
        _ => candidate,
    };

    conn.execute(
        "INSERT INTO job_events (job_id, report_id, event_type, message_user, message_internal,
         created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            event.job_id,
            event.report_id,
            event.event_type.as_str(),
            event.message_user,
            event.message_internal,
            created_at,
        ],
    )?;

    Ok(JobEvent {
        id: conn.last_insert_rowid(),
        job_id: event.job_id.to_string(),
        report_id: event.report_id.to_string(),
        event_type: event.event_type,
        message_user: event.message_user.to_string(),
        message_internal: event.message_internal.map(str::to_string),
        created_at: parse_timestamp(&created_at)?,
    })
}

/// The `limit` most recent events of a job, returned oldest first.
pub fn recent_for_job(
    conn: &Connection,
    job_id: &str,
    limit: u32,
) -> Result<Vec<JobEvent>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM job_events WHERE job_id = ?1
         ORDER BY created_at DESC, id DESC LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![job_id, limit], EventRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    let mut events = rows
        .into_iter()
        .map(EventRow::into_event)
        .collect::<Result<Vec<_>, _>>()?;
    events.reverse();
    Ok(events)
}

/// Events of a report after the given id, oldest first.
pub fn after_id_for_report(
    conn: &Connection,
    report_id: &str,
    after_id: i64,
) -> Result<Vec<JobEvent>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM job_events WHERE report_id = ?1 AND id > ?2 ORDER BY id",
    )?;
    let rows = stmt
        .query_map(params![report_id, after_id], EventRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(EventRow::into_event).collect()
}
