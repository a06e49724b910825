use std::time::Duration;

use crate::collaborators::QualityThresholds;
use crate::config::Config;

pub struct PipelineConfig {
    /// Wall-clock limit for one run.
    pub job_timeout: Duration,
    /// Below this many collected items a section is `insufficient_evidence`.
    pub min_evidence_items: u32,
    pub quality: QualityThresholds,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            job_timeout: Duration::from_secs(config.worker.job_timeout_secs),
            min_evidence_items: config.pipeline.min_evidence_items,
            quality: QualityThresholds {
                min_body_chars: config.collaborators.quality.min_body_chars,
                min_citations: config.collaborators.quality.min_citations,
            },
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
