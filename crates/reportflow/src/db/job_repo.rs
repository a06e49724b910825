//! Job repository: CRUD and state transitions for the `jobs` table.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{format_timestamp, parse_column, parse_optional_timestamp, parse_timestamp};
use super::DatabaseError;
use crate::model::{Job, JobScope, JobStatus};

/// A raw job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub report_id: String,
    pub status: String,
    pub attempts: u32,
    pub scope_section: Option<u32>,
    pub failure_reason: Option<String>,
    pub cancel_requested_at: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            report_id: row.get("report_id")?,
            status: row.get("status")?,
            attempts: row.get("attempts")?,
            scope_section: row.get("scope_section")?,
            failure_reason: row.get("failure_reason")?,
            cancel_requested_at: row.get("cancel_requested_at")?,
            created_at: row.get("created_at")?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
        })
    }

    pub fn into_job(self) -> Result<Job, DatabaseError> {
        Ok(Job {
            status: parse_column("jobs.status", &self.status)?,
            scope: JobScope::from_column(self.scope_section),
            cancel_requested_at: parse_optional_timestamp(self.cancel_requested_at)?,
            created_at: parse_timestamp(&self.created_at)?,
            started_at: parse_optional_timestamp(self.started_at)?,
            completed_at: parse_optional_timestamp(self.completed_at)?,
            id: self.id,
            report_id: self.report_id,
            attempts: self.attempts,
            failure_reason: self.failure_reason,
        })
    }
}

/// Job plus the theme of its report.
#[derive(Debug, Clone)]
pub struct JobListing {
    pub job: Job,
    pub theme_text: String,
}

/// Query filter parameters for job listing.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub report_id: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Inserts a new job in `queued` with zero attempts.
pub fn insert(
    conn: &Connection,
    id: &str,
    report_id: &str,
    scope: JobScope,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO jobs (id, report_id, status, attempts, scope_section, created_at)
         VALUES (?1, ?2, ?3, 0, ?4, ?5)",
        params![
            id,
            report_id,
            JobStatus::Queued.as_str(),
            scope.to_column(),
            format_timestamp(now),
        ],
    )?;
    Ok(())
}

/// Finds a job by its ID.
pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<Job>, DatabaseError> {
    conn.query_row("SELECT * FROM jobs WHERE id = ?1", params![id], JobRow::from_row)
        .optional()?
        .map(JobRow::into_job)
        .transpose()
}

fn require(conn: &Connection, id: &str) -> Result<Job, DatabaseError> {
    find_by_id(conn, id)?.ok_or_else(|| DatabaseError::NotFound {
        entity: "job",
        id: id.to_string(),
    })
}

/// Most recently created job for a report.
pub fn latest_for_report(conn: &Connection, report_id: &str) -> Result<Option<Job>, DatabaseError> {
    conn.query_row(
        "SELECT * FROM jobs WHERE report_id = ?1
         ORDER BY created_at DESC, rowid DESC LIMIT 1",
        params![report_id],
        JobRow::from_row,
    )
    .optional()?
    .map(JobRow::into_job)
    .transpose()
}

/// The queued or running job for a report, if any.
pub fn active_for_report(conn: &Connection, report_id: &str) -> Result<Option<Job>, DatabaseError> {
    conn.query_row(
        "SELECT * FROM jobs WHERE report_id = ?1 AND status IN ('queued', 'running')
         ORDER BY created_at DESC, rowid DESC LIMIT 1",
        params![report_id],
        JobRow::from_row,
    )
    .optional()?
    .map(JobRow::into_job)
    .transpose()
}

/// System-wide number of jobs in `running`.
pub fn count_running(conn: &Connection) -> Result<u32, DatabaseError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM jobs WHERE status = 'running'",
        [],
        |r| r.get(0),
    )?)
}

/// Every job still `queued`, oldest first.
pub fn list_queued(conn: &Connection) -> Result<Vec<Job>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT * FROM jobs WHERE status = 'queued' ORDER BY created_at, rowid")?;
    let rows = stmt
        .query_map([], JobRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(JobRow::into_job).collect()
}

fn check_transition(job: &Job, next: JobStatus) -> Result<(), DatabaseError> {
    if job.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(DatabaseError::InvalidTransition {
            entity: "job",
            id: job.id.clone(),
            from: job.status.to_string(),
            to: next.to_string(),
        })
    }
}

/// Moves a job to `running`, bumping `attempts`. `started_at` keeps the
/// first start.
pub fn mark_running(conn: &Connection, id: &str, now: DateTime<Utc>) -> Result<Job, DatabaseError> {
    let job = require(conn, id)?;
    check_transition(&job, JobStatus::Running)?;
    conn.execute(
        "UPDATE jobs SET status = 'running', attempts = attempts + 1,
         started_at = COALESCE(started_at, ?2)
         WHERE id = ?1",
        params![id, format_timestamp(now)],
    )?;
    require(conn, id)
}

/// Moves a job to a terminal status.
pub fn finish(
    conn: &Connection,
    id: &str,
    status: JobStatus,
    failure_reason: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Job, DatabaseError> {
    let job = require(conn, id)?;
    if !status.is_terminal() {
        return Err(DatabaseError::InvalidTransition {
            entity: "job",
            id: id.to_string(),
            from: job.status.to_string(),
            to: status.to_string(),
        });
    }
    check_transition(&job, status)?;
    conn.execute(
        "UPDATE jobs SET status = ?2, failure_reason = ?3, completed_at = ?4 WHERE id = ?1",
        params![id, status.as_str(), failure_reason, format_timestamp(now)],
    )?;
    require(conn, id)
}

/// Records a cancel request. Returns false if the job is already terminal.
/// The status column is left to the pipeline.
pub fn request_cancel(conn: &Connection, id: &str, now: DateTime<Utc>) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE jobs SET cancel_requested_at = COALESCE(cancel_requested_at, ?2)
         WHERE id = ?1 AND status IN ('queued', 'running')",
        params![id, format_timestamp(now)],
    )?;
    Ok(changed > 0)
}

/// Queries jobs newest first, returning (rows, total_count).
pub fn query(conn: &Connection, filter: &JobFilter) -> Result<(Vec<JobListing>, u64), DatabaseError> {
    let mut conditions = Vec::new();
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(status) = filter.status {
        conditions.push(format!("j.status = ?{}", param_values.len() + 1));
        param_values.push(Box::new(status.as_str()));
    }
    if let Some(ref report_id) = filter.report_id {
        conditions.push(format!("j.report_id = ?{}", param_values.len() + 1));
        param_values.push(Box::new(report_id.clone()));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM jobs j {}", where_clause);
    let params_ref: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();
    let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

    let limit = filter.limit.unwrap_or(100) as i64;
    let offset = filter.offset.unwrap_or(0) as i64;
    param_values.push(Box::new(limit));
    param_values.push(Box::new(offset));
    let query_sql = format!(
        "SELECT j.*, i.theme_text FROM jobs j
         JOIN report_inputs i ON i.report_id = j.report_id
         {} ORDER BY j.created_at DESC, j.rowid DESC LIMIT ?{} OFFSET ?{}",
        where_clause,
        param_values.len() - 1,
        param_values.len()
    );

    let params_ref: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&query_sql)?;
    let rows = stmt
        .query_map(params_ref.as_slice(), |r| {
            Ok((JobRow::from_row(r)?, r.get::<_, String>("theme_text")?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let listings = rows
        .into_iter()
        .map(|(row, theme_text)| {
            Ok(JobListing {
                job: row.into_job()?,
                theme_text,
            })
        })
        .collect::<Result<Vec<_>, DatabaseError>>()?;

    Ok((listings, total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{report_repo, Database};
    use crate::model::ReportInput;

    fn seed(conn: &Connection, report_id: &str, job_id: &str, now: DateTime<Utc>) {
        report_repo::insert(conn, report_id, "o", now).unwrap();
        report_repo::insert_input(conn, report_id, &ReportInput::new("theme"), now).unwrap();
        insert(conn, job_id, report_id, JobScope::Full, now).unwrap();
    }

    #[test]
    fn test_insert_defaults() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            seed(conn, "r1", "j1", Utc::now());
            let job = find_by_id(conn, "j1")?.unwrap();
            assert_eq!(job.status, JobStatus::Queued);
            assert_eq!(job.attempts, 0);
            assert_eq!(job.scope, JobScope::Full);
            assert!(job.started_at.is_none());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_mark_running_keeps_first_start() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let t0 = Utc::now();
            seed(conn, "r1", "j1", t0);

            let first = mark_running(conn, "j1", t0)?;
            assert_eq!(first.attempts, 1);
            let second = mark_running(conn, "j1", t0 + chrono::Duration::seconds(5))?;
            assert_eq!(second.attempts, 2);
            assert_eq!(second.started_at, first.started_at);
            assert_eq!(count_running(conn)?, 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_status_never_moves_backward() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let now = Utc::now();
            seed(conn, "r1", "j1", now);
            mark_running(conn, "j1", now)?;
            let done = finish(conn, "j1", JobStatus::Completed, None, now)?;
            assert!(done.completed_at.is_some());

            let err = mark_running(conn, "j1", now).unwrap_err();
            assert!(matches!(err, DatabaseError::InvalidTransition { .. }));
            let err = finish(conn, "j1", JobStatus::Failed, Some("timeout"), now).unwrap_err();
            assert!(matches!(err, DatabaseError::InvalidTransition { .. }));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_finish_records_reason() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let now = Utc::now();
            seed(conn, "r1", "j1", now);
            mark_running(conn, "j1", now)?;
            let job = finish(conn, "j1", JobStatus::Failed, Some("timeout"), now)?;
            assert_eq!(job.failure_reason.as_deref(), Some("timeout"));
            assert_eq!(count_running(conn)?, 0);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_cancel_request_only_on_active_jobs() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let now = Utc::now();
            seed(conn, "r1", "j1", now);
            assert!(request_cancel(conn, "j1", now)?);
            let job = find_by_id(conn, "j1")?.unwrap();
            assert!(job.is_cancel_requested());
            assert_eq!(job.status, JobStatus::Queued);

            finish(conn, "j1", JobStatus::Failed, Some("cancelled"), now)?;
            assert!(!request_cancel(conn, "j1", now)?);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_latest_and_active_for_report() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let t0 = Utc::now();
            seed(conn, "r1", "j1", t0);
            finish(conn, "j1", JobStatus::Failed, Some("timeout"), t0)?;
            insert(conn, "j2", "r1", JobScope::Section(3), t0 + chrono::Duration::seconds(1))?;

            assert_eq!(latest_for_report(conn, "r1")?.unwrap().id, "j2");
            let active = active_for_report(conn, "r1")?.unwrap();
            assert_eq!(active.id, "j2");
            assert_eq!(active.scope, JobScope::Section(3));
            assert!(latest_for_report(conn, "r-none")?.is_none());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_list_queued_and_query() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let t0 = Utc::now();
            seed(conn, "r1", "j1", t0);
            seed(conn, "r2", "j2", t0 + chrono::Duration::seconds(1));
            mark_running(conn, "j2", t0)?;

            let queued = list_queued(conn)?;
            assert_eq!(queued.len(), 1);
            assert_eq!(queued[0].id, "j1");

            let filter = JobFilter {
                status: Some(JobStatus::Running),
                ..Default::default()
            };
            let (rows, total) = query(conn, &filter)?;
            assert_eq!(total, 1);
            assert_eq!(rows[0].job.id, "j2");
            assert_eq!(rows[0].theme_text, "theme");

            let (rows, total) = query(conn, &JobFilter::default())?;
            assert_eq!(total, 2);
            assert_eq!(rows[0].job.id, "j2");
            Ok(())
        })
        .unwrap();
    }
}
