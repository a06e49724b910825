//! Deterministic offline collaborators.
//!
//! Used when no external services are configured so the whole system
//! runs end to end. Each call waits a fixed delay to mimic latency.

use std::time::Duration;

use async_trait::async_trait;

use super::{CollectorError, Draft, DraftError, DraftingEngine, EvidenceSource, SectionTopic};
use crate::model::{EvidenceItem, SourceType};

pub struct SimulatedSource {
    source_type: SourceType,
    delay: Duration,
    items_per_call: usize,
}

impl SimulatedSource {
    pub fn new(source_type: SourceType, delay: Duration) -> Self {
        Self {
            source_type,
            delay,
            items_per_call: 2,
        }
    }

    pub fn with_items_per_call(mut self, items_per_call: usize) -> Self {
        self.items_per_call = items_per_call;
        self
    }

    fn locator(&self, topic: &SectionTopic, n: usize) -> String {
        match self.source_type {
            SourceType::Internal => format!("doc://{}/{}/{}", topic.report_id, topic.order_no, n),
            SourceType::Video => format!("https://video.example.com/watch?v={}-{}", topic.order_no, n),
            SourceType::Web => format!("https://web.example.com/{}/{}", topic.order_no, n),
        }
    }
}

#[async_trait]
impl EvidenceSource for SimulatedSource {
    fn source_type(&self) -> SourceType {
        self.source_type
    }

    async fn fetch(
        &self,
        topic: &SectionTopic,
        _prior_evidence: &[EvidenceItem],
    ) -> Result<Vec<EvidenceItem>, CollectorError> {
        tokio::time::sleep(self.delay).await;

        Ok((1..=self.items_per_call)
            .map(|n| {
                EvidenceItem::new(
                    self.source_type,
                    format!("{}: {} ({} #{})", topic.theme_text, topic.title, self.source_type, n),
                    self.locator(topic, n),
                    format!(
                        "Observation {} on {} for {}.",
                        n,
                        topic.title.to_lowercase(),
                        topic.theme_text
                    ),
                )
            })
            .collect())
    }
}

pub struct SimulatedDrafter {
    delay: Duration,
}

impl SimulatedDrafter {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl DraftingEngine for SimulatedDrafter {
    async fn draft(
        &self,
        topic: &SectionTopic,
        evidence: &[EvidenceItem],
    ) -> Result<Draft, DraftError> {
        tokio::time::sleep(self.delay).await;

        if evidence.is_empty() {
            return Err(DraftError::InsufficientEvidence(format!(
                "no evidence for '{}'",
                topic.title
            )));
        }

        let mut body = format!("## {}\n\n", topic.title);
        body.push_str(&format!(
            "This chapter covers {} for {}",
            topic.title.to_lowercase(),
            topic.theme_text
        ));
        if let Some(region) = &topic.region {
            body.push_str(&format!(" in {}", region));
        }
        if let Some(period) = &topic.period {
            body.push_str(&format!(" over {}", period));
        }
        body.push_str(".\n\n");
        for (i, item) in evidence.iter().enumerate() {
            body.push_str(&format!("- {} [{}]\n", item.excerpt, i + 1));
        }
        if !topic.focus_points.is_empty() {
            body.push_str(&format!("\nFocus: {}.\n", topic.focus_points.join(", ")));
        }

        Ok(Draft {
            body,
            citations: (0..evidence.len()).collect(),
        })
    }
}
