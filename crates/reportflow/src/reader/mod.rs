//! Read-only views over the status store and event log.
//!
//! Nothing returned from here carries internal diagnostic messages.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::broadcast::UserEvent;
use crate::db::job_repo::JobFilter;
use crate::db::report_repo::ReportFilter;
use crate::db::DatabaseError;
use crate::model::{
    taxonomy, Evidence, EvidenceCounts, Job, JobScope, JobStatus, Report, ReportInput,
    ReportStatus, Section, SectionStatus,
};
use crate::store::StatusStore;

/// A section without its drafted body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionSummary {
    pub order_no: u32,
    pub title: String,
    pub status: SectionStatus,
    pub evidence: EvidenceCounts,
    pub updated_at: DateTime<Utc>,
}

impl From<&Section> for SectionSummary {
    fn from(section: &Section) -> Self {
        Self {
            order_no: section.order_no,
            title: section.title.clone(),
            status: section.status,
            evidence: section.evidence,
            updated_at: section.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportProgress {
    pub report: Report,
    pub input: ReportInput,
    pub sections: Vec<SectionSummary>,
    pub job: Option<Job>,
    pub events: Vec<UserEvent>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub id: String,
    pub status: ReportStatus,
    pub owner: String,
    pub theme_text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub id: String,
    pub report_id: String,
    pub theme_text: String,
    pub status: JobStatus,
    pub scope: JobScope,
    pub attempts: u32,
    /// Terminal sections out of the full taxonomy, 0..=100.
    pub progress_percent: u32,
    pub current_phase: String,
    pub failure_reason: Option<String>,
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionDetail {
    pub section: Section,
    pub evidence: Vec<Evidence>,
}

fn progress_percent(sections: &[Section]) -> u32 {
    let terminal = sections.iter().filter(|s| s.status.is_terminal()).count() as u32;
    terminal * 100 / taxonomy::section_count()
}

fn current_phase(job: &Job, sections: &[Section]) -> String {
    match job.status {
        JobStatus::Running => sections
            .iter()
            .find(|s| s.status.is_in_progress())
            .map(|s| format!("{} (section {})", s.status, s.order_no))
            .unwrap_or_else(|| "planning".to_string()),
        status => status.to_string(),
    }
}

#[derive(Clone)]
pub struct ProgressReader {
    store: StatusStore,
    events_limit: u32,
}

impl ProgressReader {
    pub fn new(store: StatusStore, events_limit: u32) -> Self {
        Self {
            store,
            events_limit,
        }
    }

    /// Full progress of one report, or `None` if it does not exist.
    /// Events are those of the most recent job only.
    pub fn report_progress(&self, report_id: &str) -> Result<Option<ReportProgress>, DatabaseError> {
        let Some(report) = self.store.report(report_id)? else {
            return Ok(None);
        };
        let input = self
            .store
            .input(report_id)?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "report_input",
                id: report_id.to_string(),
            })?;
        let sections = self
            .store
            .sections(report_id)?
            .iter()
            .map(SectionSummary::from)
            .collect();
        let job = self.store.latest_job(report_id)?;
        let events = match &job {
            Some(job) => self
                .store
                .recent_events(&job.id, self.events_limit)?
                .iter()
                .map(UserEvent::from)
                .collect(),
            None => Vec::new(),
        };

        Ok(Some(ReportProgress {
            report,
            input,
            sections,
            job,
            events,
        }))
    }

    pub fn list_reports(&self, filter: &ReportFilter) -> Result<Page<ReportSummary>, DatabaseError> {
        let (listings, total) = self.store.list_reports(filter)?;
        let items = listings
            .into_iter()
            .map(|listing| ReportSummary {
                id: listing.report.id,
                status: listing.report.status,
                owner: listing.report.owner,
                theme_text: listing.theme_text,
                created_at: listing.report.created_at,
                updated_at: listing.report.updated_at,
                completed_at: listing.report.completed_at,
            })
            .collect();
        Ok(Page { items, total })
    }

    /// Operator view of jobs with derived progress.
    pub fn list_jobs(&self, filter: &JobFilter) -> Result<Page<JobSummary>, DatabaseError> {
        let (listings, total) = self.store.list_jobs(filter)?;
        let mut items = Vec::with_capacity(listings.len());
        for listing in listings {
            let job = listing.job;
            let sections = self.store.sections(&job.report_id)?;
            items.push(JobSummary {
                progress_percent: progress_percent(&sections),
                current_phase: current_phase(&job, &sections),
                cancel_requested: job.is_cancel_requested(),
                id: job.id,
                report_id: job.report_id,
                theme_text: listing.theme_text,
                status: job.status,
                scope: job.scope,
                attempts: job.attempts,
                failure_reason: job.failure_reason,
                created_at: job.created_at,
                started_at: job.started_at,
                completed_at: job.completed_at,
            });
        }
        Ok(Page { items, total })
    }

    pub fn section_detail(
        &self,
        report_id: &str,
        order_no: u32,
    ) -> Result<Option<SectionDetail>, DatabaseError> {
        let Some(section) = self.store.section(report_id, order_no)? else {
            return Ok(None);
        };
        let evidence = self.store.section_evidence(&section.id)?;
        Ok(Some(SectionDetail { section, evidence }))
    }
}
