//! Persisted entities as read back from the status store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::input::SourceType;
use super::status::{EventType, JobStatus, ReportStatus, SectionStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: String,
    pub status: ReportStatus,
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// What a job executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "orderNo")]
pub enum JobScope {
    /// Every section not yet completed.
    Full,
    /// A single section, by order number.
    Section(u32),
}

impl JobScope {
    pub fn from_column(value: Option<u32>) -> Self {
        match value {
            Some(order_no) => JobScope::Section(order_no),
            None => JobScope::Full,
        }
    }

    pub fn to_column(&self) -> Option<u32> {
        match self {
            JobScope::Full => None,
            JobScope::Section(order_no) => Some(*order_no),
        }
    }

    pub fn includes(&self, order_no: u32) -> bool {
        match self {
            JobScope::Full => true,
            JobScope::Section(target) => *target == order_no,
        }
    }
}

/// One execution attempt for a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub report_id: String,
    pub status: JobStatus,
    pub attempts: u32,
    pub scope: JobScope,
    pub failure_reason: Option<String>,
    pub cancel_requested_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested_at.is_some()
    }
}

/// Per-source evidence tallies for one section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceCounts {
    pub internal: u32,
    pub video: u32,
    pub web: u32,
}

impl EvidenceCounts {
    pub fn tally<'a, I>(items: I) -> Self
    where
        I: IntoIterator<Item = &'a EvidenceItem>,
    {
        let mut counts = Self::default();
        for item in items {
            match item.source_type {
                SourceType::Internal => counts.internal += 1,
                SourceType::Video => counts.video += 1,
                SourceType::Web => counts.web += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> u32 {
        self.internal + self.video + self.web
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    pub report_id: String,
    pub order_no: u32,
    pub title: String,
    pub status: SectionStatus,
    pub evidence: EvidenceCounts,
    pub body: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable log entry for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub id: i64,
    pub job_id: String,
    pub report_id: String,
    pub event_type: EventType,
    pub message_user: String,
    pub message_internal: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Evidence as produced by a collector, before it is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceItem {
    pub source_type: SourceType,
    pub title: String,
    pub locator: String,
    pub excerpt: String,
}

impl EvidenceItem {
    pub fn new(
        source_type: SourceType,
        title: impl Into<String>,
        locator: impl Into<String>,
        excerpt: impl Into<String>,
    ) -> Self {
        Self {
            source_type,
            title: title.into(),
            locator: locator.into(),
            excerpt: excerpt.into(),
        }
    }
}

/// Stored evidence row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub id: String,
    pub report_id: String,
    pub section_id: String,
    pub job_id: String,
    pub source_type: SourceType,
    pub title: String,
    pub locator: String,
    pub excerpt: String,
    pub created_at: DateTime<Utc>,
}

impl Evidence {
    pub fn item(&self) -> EvidenceItem {
        EvidenceItem::new(
            self.source_type,
            self.title.clone(),
            self.locator.clone(),
            self.excerpt.clone(),
        )
    }
}
