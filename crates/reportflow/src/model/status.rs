//! Persisted status enums and their transition rules.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A stored status string that matches no known variant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown {kind} '{value}'")]
pub struct ParseStatusError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseStatusError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Aggregate status of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Queued => "queued",
            ReportStatus::Running => "running",
            ReportStatus::Completed => "completed",
            ReportStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReportStatus::Completed | ReportStatus::Failed)
    }
}

impl FromStr for ReportStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(ReportStatus::Queued),
            "running" => Ok(ReportStatus::Running),
            "completed" => Ok(ReportStatus::Completed),
            "failed" => Ok(ReportStatus::Failed),
            other => Err(ParseStatusError::new("report status", other)),
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one execution attempt.
///
/// Moves forward only: `queued -> running -> completed | failed`. A
/// redelivered message may re-enter `running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    fn rank(&self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Running => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
        }
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        next.rank() > self.rank() || (*self == JobStatus::Running && next == JobStatus::Running)
    }
}

impl FromStr for JobStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(ParseStatusError::new("job status", other)),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-section state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    Planned,
    Collecting,
    Drafting,
    Reviewing,
    Completed,
    Failed,
    InsufficientEvidence,
}

impl SectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionStatus::Planned => "planned",
            SectionStatus::Collecting => "collecting",
            SectionStatus::Drafting => "drafting",
            SectionStatus::Reviewing => "reviewing",
            SectionStatus::Completed => "completed",
            SectionStatus::Failed => "failed",
            SectionStatus::InsufficientEvidence => "insufficient_evidence",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SectionStatus::Completed | SectionStatus::Failed | SectionStatus::InsufficientEvidence
        )
    }

    /// Terminal but not successful; eligible for a scoped retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SectionStatus::Failed | SectionStatus::InsufficientEvidence
        )
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            SectionStatus::Collecting | SectionStatus::Drafting | SectionStatus::Reviewing
        )
    }

    pub fn can_transition_to(&self, next: SectionStatus) -> bool {
        use SectionStatus::*;
        match (self, next) {
            // Restart after retry, redelivery or cancellation.
            (Planned | Failed | InsufficientEvidence, Collecting) => true,
            (Collecting | Drafting | Reviewing, Collecting) => true,
            (Collecting, Drafting) => true,
            (Drafting, Reviewing | Completed) => true,
            (Reviewing, Completed) => true,
            (Collecting | Drafting | Reviewing, Failed | InsufficientEvidence) => true,
            _ => false,
        }
    }
}

impl FromStr for SectionStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(SectionStatus::Planned),
            "collecting" => Ok(SectionStatus::Collecting),
            "drafting" => Ok(SectionStatus::Drafting),
            "reviewing" => Ok(SectionStatus::Reviewing),
            "completed" => Ok(SectionStatus::Completed),
            "failed" => Ok(SectionStatus::Failed),
            "insufficient_evidence" => Ok(SectionStatus::InsufficientEvidence),
            other => Err(ParseStatusError::new("section status", other)),
        }
    }
}

impl fmt::Display for SectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of an event log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Info,
    Progress,
    Error,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Info => "info",
            EventType::Progress => "progress",
            EventType::Error => "error",
        }
    }
}

impl FromStr for EventType {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(EventType::Info),
            "progress" => Ok(EventType::Progress),
            "error" => Ok(EventType::Error),
            other => Err(ParseStatusError::new("event type", other)),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_is_monotonic() {
        use JobStatus::*;
        assert!(Queued.can_transition_to(Running));
        assert!(Running.can_transition_to(Running));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));
        assert!(Queued.can_transition_to(Failed));

        assert!(!Running.can_transition_to(Queued));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Failed.can_transition_to(Running));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Queued.can_transition_to(Queued));
    }

    #[test]
    fn test_section_happy_path_transitions() {
        use SectionStatus::*;
        assert!(Planned.can_transition_to(Collecting));
        assert!(Collecting.can_transition_to(Drafting));
        assert!(Drafting.can_transition_to(Completed));
        assert!(Drafting.can_transition_to(Reviewing));
        assert!(Reviewing.can_transition_to(Completed));
    }

    #[test]
    fn test_section_cannot_skip_or_leave_completed() {
        use SectionStatus::*;
        assert!(!Planned.can_transition_to(Drafting));
        assert!(!Planned.can_transition_to(Completed));
        assert!(!Collecting.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Collecting));
        assert!(!Completed.can_transition_to(Failed));
    }

    #[test]
    fn test_failed_section_can_restart() {
        assert!(SectionStatus::Failed.can_transition_to(SectionStatus::Collecting));
        assert!(SectionStatus::InsufficientEvidence.can_transition_to(SectionStatus::Collecting));
        assert!(SectionStatus::Failed.is_retryable());
        assert!(!SectionStatus::Completed.is_retryable());
    }

    #[test]
    fn test_status_strings_round_trip() {
        for status in [
            SectionStatus::Planned,
            SectionStatus::Reviewing,
            SectionStatus::InsufficientEvidence,
        ] {
            assert_eq!(status.as_str().parse::<SectionStatus>().unwrap(), status);
        }
        assert_eq!("failed".parse::<JobStatus>().unwrap(), JobStatus::Failed);
        assert_eq!("running".parse::<ReportStatus>().unwrap(), ReportStatus::Running);
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let err = "superseded".parse::<JobStatus>().unwrap_err();
        assert_eq!(err.kind, "job status");
        assert_eq!(err.value, "superseded");
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&SectionStatus::InsufficientEvidence).unwrap();
        assert_eq!(json, "\"insufficient_evidence\"");
    }
}
