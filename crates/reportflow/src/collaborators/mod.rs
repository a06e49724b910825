//! Boundaries to the content-producing services the pipeline drives.
//!
//! The pipeline only sequences, observes and isolates these calls; how
//! evidence is found or prose is written lives behind the traits.

pub mod fallback;
pub mod review;
pub mod simulated;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{CollaboratorMode, CollaboratorsConfig};
use crate::model::{EvidenceItem, FallbackPolicy, ReportInput, SourcePriority, SourceType};

pub use fallback::{EvidenceSource, FallbackCollector};
pub use review::ThresholdReviewer;
pub use simulated::{SimulatedDrafter, SimulatedSource};

/// What a section is about: its chapter plus the report's request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionTopic {
    pub report_id: String,
    pub order_no: u32,
    pub title: String,
    pub theme_text: String,
    pub purpose: Option<String>,
    pub region: Option<String>,
    pub period: Option<String>,
    pub assumptions: Option<String>,
    pub focus_points: Vec<String>,
}

impl SectionTopic {
    pub fn new(report_id: &str, order_no: u32, title: &str, input: &ReportInput) -> Self {
        Self {
            report_id: report_id.to_string(),
            order_no,
            title: title.to_string(),
            theme_text: input.theme_text.clone(),
            purpose: input.purpose.clone(),
            region: input.region.clone(),
            period: input.period.clone(),
            assumptions: input.assumptions.clone(),
            focus_points: input.focus_points.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EvidenceRequest {
    pub topic: SectionTopic,
    pub sources: SourcePriority,
    pub fallback: FallbackPolicy,
    /// Evidence already gathered for sibling sections.
    pub prior_evidence: Vec<EvidenceItem>,
}

/// A source passed over during collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedSource {
    pub source_type: SourceType,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvidenceSet {
    pub items: Vec<EvidenceItem>,
    pub skipped: Vec<SkippedSource>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectorError {
    #[error("Source {source_type} unavailable: {reason}")]
    SourceUnavailable {
        source_type: SourceType,
        reason: String,
    },

    #[error("Source {source_type} rate limited")]
    RateLimited { source_type: SourceType },

    #[error("Insufficient evidence: {0}")]
    InsufficientEvidence(String),

    #[error("Evidence collection failed: {0}")]
    Other(String),
}

impl CollectorError {
    /// A single-source failure another source can stand in for.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CollectorError::SourceUnavailable { .. } | CollectorError::RateLimited { .. }
        )
    }

    pub fn is_evidence_shortage(&self) -> bool {
        matches!(self, CollectorError::InsufficientEvidence(_))
    }
}

#[async_trait]
pub trait EvidenceCollector: Send + Sync {
    async fn collect(&self, request: &EvidenceRequest) -> Result<EvidenceSet, CollectorError>;
}

/// Drafted chapter text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub body: String,
    /// Indices into the evidence the draft was written from.
    pub citations: Vec<usize>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DraftError {
    #[error("Insufficient evidence to draft: {0}")]
    InsufficientEvidence(String),

    #[error("Drafting failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait DraftingEngine: Send + Sync {
    async fn draft(
        &self,
        topic: &SectionTopic,
        evidence: &[EvidenceItem],
    ) -> Result<Draft, DraftError>;
}

/// Limits a draft is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityThresholds {
    pub min_body_chars: usize,
    pub min_citations: usize,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_body_chars: 200,
            min_citations: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub rule: String,
    pub detail: String,
}

#[async_trait]
pub trait QualityReviewer: Send + Sync {
    /// Returns the violated rules; empty means the draft passes.
    async fn review(
        &self,
        topic: &SectionTopic,
        draft: &Draft,
        thresholds: &QualityThresholds,
    ) -> Vec<Violation>;
}

/// The services one pipeline instance calls.
#[derive(Clone)]
pub struct Collaborators {
    pub collector: Arc<dyn EvidenceCollector>,
    pub drafter: Arc<dyn DraftingEngine>,
    pub reviewer: Option<Arc<dyn QualityReviewer>>,
}

impl Collaborators {
    pub fn new(collector: Arc<dyn EvidenceCollector>, drafter: Arc<dyn DraftingEngine>) -> Self {
        Self {
            collector,
            drafter,
            reviewer: None,
        }
    }

    pub fn with_reviewer(mut self, reviewer: Arc<dyn QualityReviewer>) -> Self {
        self.reviewer = Some(reviewer);
        self
    }

    pub fn from_config(config: &CollaboratorsConfig) -> Self {
        let collaborators = match config.mode {
            CollaboratorMode::Simulated => {
                Self::simulated(std::time::Duration::from_millis(config.delay_ms))
            }
        };
        if config.review {
            collaborators.with_reviewer(Arc::new(ThresholdReviewer))
        } else {
            collaborators
        }
    }

    /// Offline collaborators with a fixed per-call delay.
    pub fn simulated(delay: std::time::Duration) -> Self {
        let sources: Vec<Arc<dyn EvidenceSource>> = SourceType::ALL
            .iter()
            .map(|source_type| {
                Arc::new(SimulatedSource::new(*source_type, delay)) as Arc<dyn EvidenceSource>
            })
            .collect();
        Self::new(
            Arc::new(FallbackCollector::new(sources)),
            Arc::new(SimulatedDrafter::new(delay)),
        )
    }
}
