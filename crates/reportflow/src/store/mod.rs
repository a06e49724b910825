//! Status store: the persisted current state of reports, jobs and
//! sections, and the single source of truth for readers.
//!
//! Wraps [`Database`] with typed operations. Multi-row changes run in one
//! immediate transaction.

use chrono::Utc;
use rusqlite::Transaction;

use crate::db::event_repo::{self, NewEvent};
use crate::db::job_repo::{self, JobFilter, JobListing};
use crate::db::report_repo::{self, ReportFilter, ReportListing};
use crate::db::{evidence_repo, section_repo, Database, DatabaseError};
use crate::model::{
    Evidence, EvidenceCounts, EvidenceItem, Job, JobEvent, JobStatus, Report, ReportInput,
    ReportStatus, Section, SectionStatus,
};

#[derive(Clone)]
pub struct StatusStore {
    db: Database,
}

impl StatusStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Runs `f` inside one `BEGIN IMMEDIATE` transaction.
    pub fn transaction<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, DatabaseError>,
    {
        self.db.with_transaction(f)
    }

    // Reports

    pub fn report(&self, id: &str) -> Result<Option<Report>, DatabaseError> {
        self.db.with_conn(|conn| report_repo::find_by_id(conn, id))
    }

    pub fn input(&self, report_id: &str) -> Result<Option<ReportInput>, DatabaseError> {
        self.db.with_conn(|conn| report_repo::find_input(conn, report_id))
    }

    pub fn list_reports(
        &self,
        filter: &ReportFilter,
    ) -> Result<(Vec<ReportListing>, u64), DatabaseError> {
        self.db.with_conn(|conn| report_repo::query(conn, filter))
    }

    // Jobs

    pub fn job(&self, id: &str) -> Result<Option<Job>, DatabaseError> {
        self.db.with_conn(|conn| job_repo::find_by_id(conn, id))
    }

    pub fn latest_job(&self, report_id: &str) -> Result<Option<Job>, DatabaseError> {
        self.db
            .with_conn(|conn| job_repo::latest_for_report(conn, report_id))
    }

    pub fn queued_jobs(&self) -> Result<Vec<Job>, DatabaseError> {
        self.db.with_conn(job_repo::list_queued)
    }

    pub fn running_count(&self) -> Result<u32, DatabaseError> {
        self.db.with_conn(job_repo::count_running)
    }

    pub fn list_jobs(&self, filter: &JobFilter) -> Result<(Vec<JobListing>, u64), DatabaseError> {
        self.db.with_conn(|conn| job_repo::query(conn, filter))
    }

    /// Marks the job running and its report running.
    pub fn start_job(&self, job_id: &str) -> Result<Job, DatabaseError> {
        self.db.with_transaction(|tx| {
            let now = Utc::now();
            let job = job_repo::mark_running(tx, job_id, now)?;
            report_repo::set_status(tx, &job.report_id, ReportStatus::Running, now)?;
            Ok(job)
        })
    }

    /// Moves the job to a terminal status and mirrors it on the report.
    pub fn finish_job(
        &self,
        job_id: &str,
        status: JobStatus,
        failure_reason: Option<&str>,
    ) -> Result<Job, DatabaseError> {
        self.db.with_transaction(|tx| {
            let now = Utc::now();
            let job = job_repo::finish(tx, job_id, status, failure_reason, now)?;
            let report_status = match status {
                JobStatus::Completed => ReportStatus::Completed,
                _ => ReportStatus::Failed,
            };
            report_repo::set_status(tx, &job.report_id, report_status, now)?;
            Ok(job)
        })
    }

    /// Records a cancel request. Returns false if the job is already
    /// terminal.
    pub fn request_cancel(&self, job_id: &str) -> Result<bool, DatabaseError> {
        self.db
            .with_conn(|conn| job_repo::request_cancel(conn, job_id, Utc::now()))
    }

    pub fn is_cancel_requested(&self, job_id: &str) -> Result<bool, DatabaseError> {
        Ok(self
            .job(job_id)?
            .map(|job| job.is_cancel_requested())
            .unwrap_or(false))
    }

    // Sections

    /// Materializes the section skeleton. Returns the number of rows
    /// created; zero when the sections already exist.
    pub fn ensure_sections(&self, report_id: &str) -> Result<usize, DatabaseError> {
        self.db
            .with_transaction(|tx| section_repo::ensure_skeleton(tx, report_id, Utc::now()))
    }

    pub fn sections(&self, report_id: &str) -> Result<Vec<Section>, DatabaseError> {
        self.db
            .with_conn(|conn| section_repo::list_for_report(conn, report_id))
    }

    pub fn section(&self, report_id: &str, order_no: u32) -> Result<Option<Section>, DatabaseError> {
        self.db
            .with_conn(|conn| section_repo::find_by_order(conn, report_id, order_no))
    }

    pub fn set_section_status(
        &self,
        section_id: &str,
        status: SectionStatus,
    ) -> Result<Section, DatabaseError> {
        self.db
            .with_conn(|conn| section_repo::set_status(conn, section_id, status, Utc::now()))
    }

    /// Stores a collection and replaces the section's counters.
    pub fn record_collection(
        &self,
        report_id: &str,
        section_id: &str,
        job_id: &str,
        items: &[EvidenceItem],
    ) -> Result<EvidenceCounts, DatabaseError> {
        self.db.with_transaction(|tx| {
            let now = Utc::now();
            evidence_repo::insert_collection(tx, report_id, section_id, job_id, items, now)?;
            let counts = EvidenceCounts::tally(items);
            section_repo::set_evidence_counts(tx, section_id, counts, now)?;
            Ok(counts)
        })
    }

    pub fn record_draft(&self, section_id: &str, body: &str) -> Result<(), DatabaseError> {
        self.db
            .with_conn(|conn| section_repo::set_body(conn, section_id, body, Utc::now()))
    }

    pub fn section_evidence(&self, section_id: &str) -> Result<Vec<Evidence>, DatabaseError> {
        self.db
            .with_conn(|conn| evidence_repo::latest_for_section(conn, section_id))
    }

    /// Latest evidence of every other section of the report.
    pub fn sibling_evidence(
        &self,
        report_id: &str,
        section_id: &str,
    ) -> Result<Vec<Evidence>, DatabaseError> {
        self.db
            .with_conn(|conn| evidence_repo::latest_for_siblings(conn, report_id, section_id))
    }

    // Events

    pub fn append_event(&self, event: &NewEvent<'_>) -> Result<JobEvent, DatabaseError> {
        self.db
            .with_conn(|conn| event_repo::append(conn, event, Utc::now()))
    }

    pub fn recent_events(&self, job_id: &str, limit: u32) -> Result<Vec<JobEvent>, DatabaseError> {
        self.db
            .with_conn(|conn| event_repo::recent_for_job(conn, job_id, limit))
    }

    pub fn events_after(&self, report_id: &str, after_id: i64) -> Result<Vec<JobEvent>, DatabaseError> {
        self.db
            .with_conn(|conn| event_repo::after_id_for_report(conn, report_id, after_id))
    }
}
