//! Rule-based quality reviewer.

use async_trait::async_trait;

use super::{Draft, QualityReviewer, QualityThresholds, SectionTopic, Violation};

#[derive(Debug, Default, Clone, Copy)]
pub struct ThresholdReviewer;

#[async_trait]
impl QualityReviewer for ThresholdReviewer {
    async fn review(
        &self,
        _topic: &SectionTopic,
        draft: &Draft,
        thresholds: &QualityThresholds,
    ) -> Vec<Violation> {
        let mut violations = Vec::new();

        let chars = draft.body.chars().count();
        if chars < thresholds.min_body_chars {
            violations.push(Violation {
                rule: "min_body_chars".to_string(),
                detail: format!("{} characters, expected at least {}", chars, thresholds.min_body_chars),
            });
        }
        if draft.citations.len() < thresholds.min_citations {
            violations.push(Violation {
                rule: "min_citations".to_string(),
                detail: format!(
                    "{} citations, expected at least {}",
                    draft.citations.len(),
                    thresholds.min_citations
                ),
            });
        }

        violations
    }
}
