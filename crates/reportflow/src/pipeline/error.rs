use std::time::Duration;

use thiserror::Error;

use crate::collaborators::{CollectorError, DraftError};
use crate::db::DatabaseError;
use crate::model::{Section, SectionStatus};

/// An error that escapes section isolation and fails the whole run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Status store error: {0}")]
    Store(#[from] DatabaseError),

    #[error("Run exceeded its time limit of {}s", limit.as_secs())]
    Timeout { limit: Duration },

    #[error("Job '{0}' not found")]
    UnknownJob(String),

    #[error("Input for report '{0}' not found")]
    MissingInput(String),

    #[error("Section {order_no} of report '{report_id}' not found")]
    MissingSection { report_id: String, order_no: u32 },

    #[error("Delivery budget exhausted after {deliveries} deliveries without an outcome")]
    Abandoned { deliveries: u32 },
}

impl PipelineError {
    /// Short reason stored on the failed job.
    pub fn failure_reason(&self) -> &'static str {
        match self {
            PipelineError::Timeout { .. } => "timeout",
            PipelineError::Store(_) => "store_unavailable",
            PipelineError::Abandoned { .. } => "delivery_budget_exhausted",
            _ => "internal_error",
        }
    }

    /// Message safe to show to the report's owner.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::Timeout { .. } => "Generation timed out".to_string(),
            PipelineError::Store(_) => "Generation stopped: storage unavailable".to_string(),
            PipelineError::Abandoned { .. } => {
                "Generation stopped: processing was interrupted".to_string()
            }
            _ => "Generation failed due to an internal error".to_string(),
        }
    }
}

/// A failure contained within one section.
#[derive(Error, Debug)]
pub enum SectionError {
    #[error(transparent)]
    Collector(#[from] CollectorError),

    #[error(transparent)]
    Draft(#[from] DraftError),

    #[error("Only {found} evidence items collected, {required} required")]
    TooLittleEvidence { found: u32, required: u32 },
}

impl SectionError {
    /// Status the section ends in.
    pub fn terminal_status(&self) -> SectionStatus {
        match self {
            SectionError::Collector(CollectorError::InsufficientEvidence(_))
            | SectionError::Draft(DraftError::InsufficientEvidence(_))
            | SectionError::TooLittleEvidence { .. } => SectionStatus::InsufficientEvidence,
            _ => SectionStatus::Failed,
        }
    }

    pub fn user_message(&self, section: &Section) -> String {
        let summary = match self {
            SectionError::Collector(CollectorError::SourceUnavailable { source_type, .. }) => {
                format!("{} source unavailable", source_type)
            }
            SectionError::Collector(CollectorError::RateLimited { source_type }) => {
                format!("{} source rate limited", source_type)
            }
            SectionError::Collector(CollectorError::Other(_)) => {
                "evidence collection failed".to_string()
            }
            SectionError::Draft(DraftError::Failed(_)) => "drafting failed".to_string(),
            SectionError::Collector(CollectorError::InsufficientEvidence(_))
            | SectionError::Draft(DraftError::InsufficientEvidence(_))
            | SectionError::TooLittleEvidence { .. } => "not enough evidence".to_string(),
        };
        format!(
            "Section {} ({}) failed: {}",
            section.order_no, section.title, summary
        )
    }
}
