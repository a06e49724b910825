//! Evidence collection across prioritized sources.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{CollectorError, EvidenceCollector, EvidenceRequest, EvidenceSet, SectionTopic, SkippedSource};
use crate::model::{EvidenceItem, FallbackPolicy, SourceType};

/// A single evidence backend.
#[async_trait]
pub trait EvidenceSource: Send + Sync {
    fn source_type(&self) -> SourceType;

    async fn fetch(
        &self,
        topic: &SectionTopic,
        prior_evidence: &[EvidenceItem],
    ) -> Result<Vec<EvidenceItem>, CollectorError>;
}

/// Queries sources in priority order.
///
/// Under [`FallbackPolicy::Auto`] a transient failure of one source is
/// recorded as skipped and collection moves on; under `Strict` it fails
/// the collection. Non-transient failures always fail it.
pub struct FallbackCollector {
    sources: Vec<Arc<dyn EvidenceSource>>,
}

impl FallbackCollector {
    pub fn new(sources: Vec<Arc<dyn EvidenceSource>>) -> Self {
        Self { sources }
    }

    fn source(&self, source_type: SourceType) -> Option<&Arc<dyn EvidenceSource>> {
        self.sources.iter().find(|s| s.source_type() == source_type)
    }
}

#[async_trait]
impl EvidenceCollector for FallbackCollector {
    async fn collect(&self, request: &EvidenceRequest) -> Result<EvidenceSet, CollectorError> {
        let mut set = EvidenceSet::default();
        let mut succeeded = 0usize;

        for source_type in request.sources.iter() {
            let result = match self.source(source_type) {
                Some(source) => source.fetch(&request.topic, &request.prior_evidence).await,
                None => Err(CollectorError::SourceUnavailable {
                    source_type,
                    reason: "no source configured".to_string(),
                }),
            };

            match result {
                Ok(items) => {
                    debug!(source = %source_type, count = items.len(), "Collected evidence");
                    succeeded += 1;
                    set.items.extend(items);
                }
                Err(e) if e.is_transient() && request.fallback == FallbackPolicy::Auto => {
                    warn!(source = %source_type, "Skipping source: {}", e);
                    set.skipped.push(SkippedSource {
                        source_type,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        if succeeded == 0 {
            let reasons: Vec<String> = set.skipped.iter().map(|s| s.reason.clone()).collect();
            return Err(CollectorError::Other(format!(
                "every source failed: {}",
                reasons.join("; ")
            )));
        }

        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ReportInput, SourcePriority};

    struct FixedSource {
        source_type: SourceType,
        result: Result<usize, CollectorError>,
    }

    #[async_trait]
    impl EvidenceSource for FixedSource {
        fn source_type(&self) -> SourceType {
            self.source_type
        }

        async fn fetch(
            &self,
            _topic: &SectionTopic,
            _prior: &[EvidenceItem],
        ) -> Result<Vec<EvidenceItem>, CollectorError> {
            let count = self.result.clone()?;
            Ok((0..count)
                .map(|i| EvidenceItem::new(self.source_type, format!("item {i}"), "loc", ""))
                .collect())
        }
    }

    fn source(source_type: SourceType, result: Result<usize, CollectorError>) -> Arc<dyn EvidenceSource> {
        Arc::new(FixedSource {
            source_type,
            result,
        })
    }

    fn request(fallback: FallbackPolicy) -> EvidenceRequest {
        EvidenceRequest {
            topic: SectionTopic::new("r1", 1, "Market overview", &ReportInput::new("x")),
            sources: SourcePriority::default(),
            fallback,
            prior_evidence: vec![],
        }
    }

    fn flaky_video() -> Vec<Arc<dyn EvidenceSource>> {
        vec![
            source(SourceType::Internal, Ok(1)),
            source(
                SourceType::Video,
                Err(CollectorError::RateLimited {
                    source_type: SourceType::Video,
                }),
            ),
            source(SourceType::Web, Ok(2)),
        ]
    }

    #[tokio::test]
    async fn test_auto_skips_transient_failure() {
        let collector = FallbackCollector::new(flaky_video());
        let set = collector.collect(&request(FallbackPolicy::Auto)).await.unwrap();
        assert_eq!(set.items.len(), 3);
        assert_eq!(set.skipped.len(), 1);
        assert_eq!(set.skipped[0].source_type, SourceType::Video);
    }

    #[tokio::test]
    async fn test_strict_fails_on_transient_failure() {
        let collector = FallbackCollector::new(flaky_video());
        let err = collector
            .collect(&request(FallbackPolicy::Strict))
            .await
            .unwrap_err();
        assert!(matches!(err, CollectorError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn test_missing_source_is_skipped_under_auto() {
        let collector = FallbackCollector::new(vec![source(SourceType::Web, Ok(1))]);
        let set = collector.collect(&request(FallbackPolicy::Auto)).await.unwrap();
        assert_eq!(set.items.len(), 1);
        assert_eq!(set.skipped.len(), 2);
    }

    #[tokio::test]
    async fn test_all_sources_failing_is_an_error() {
        let collector = FallbackCollector::new(vec![]);
        let err = collector
            .collect(&request(FallbackPolicy::Auto))
            .await
            .unwrap_err();
        assert!(matches!(err, CollectorError::Other(_)));
    }

    #[tokio::test]
    async fn test_hard_failure_is_not_skipped() {
        let collector = FallbackCollector::new(vec![
            source(SourceType::Internal, Err(CollectorError::Other("parse error".into()))),
            source(SourceType::Web, Ok(1)),
        ]);
        let err = collector
            .collect(&request(FallbackPolicy::Auto))
            .await
            .unwrap_err();
        assert_eq!(err, CollectorError::Other("parse error".into()));
    }

    #[tokio::test]
    async fn test_priority_order_is_respected() {
        let collector = FallbackCollector::new(flaky_video());
        let mut req = request(FallbackPolicy::Auto);
        req.sources = SourcePriority::new(vec![SourceType::Web, SourceType::Internal]).unwrap();
        let set = collector.collect(&req).await.unwrap();
        assert_eq!(set.items[0].source_type, SourceType::Web);
        assert_eq!(set.items[2].source_type, SourceType::Internal);
    }
}
