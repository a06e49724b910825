use tokio::time::Instant;

use crate::model::{Job, ReportInput, SectionStatus};

/// Terminal section outcomes of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SectionTally {
    pub completed: u32,
    pub failed: u32,
    pub insufficient_evidence: u32,
}

impl SectionTally {
    pub fn record(&mut self, status: SectionStatus) {
        match status {
            SectionStatus::Completed => self.completed += 1,
            SectionStatus::Failed => self.failed += 1,
            SectionStatus::InsufficientEvidence => self.insufficient_evidence += 1,
            _ => {}
        }
    }

    pub fn total(&self) -> u32 {
        self.completed + self.failed + self.insufficient_evidence
    }

    pub fn summary(&self) -> String {
        format!(
            "{} completed, {} failed, {} insufficient evidence",
            self.completed, self.failed, self.insufficient_evidence
        )
    }
}

pub struct PipelineContext {
    // Input
    pub job: Job,
    pub input: ReportInput,

    /// Every collaborator call must finish before this instant.
    pub deadline: Instant,

    pub tally: SectionTally,
}

impl PipelineContext {
    pub fn new(job: Job, input: ReportInput, deadline: Instant) -> Self {
        Self {
            job,
            input,
            deadline,
            tally: SectionTally::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_counts_terminal_statuses_only() {
        let mut tally = SectionTally::default();
        tally.record(SectionStatus::Completed);
        tally.record(SectionStatus::Completed);
        tally.record(SectionStatus::Failed);
        tally.record(SectionStatus::Drafting);
        assert_eq!(tally.total(), 3);
        assert_eq!(tally.summary(), "2 completed, 1 failed, 0 insufficient evidence");
    }
}
