//! Domain types shared by every layer.

pub mod entities;
pub mod input;
pub mod status;
pub mod taxonomy;

pub use entities::{
    Evidence, EvidenceCounts, EvidenceItem, Job, JobEvent, JobScope, Report, Section,
};
pub use input::{FallbackPolicy, InputError, ReportInput, SourcePriority, SourceType, SubmitRequest};
pub use status::{EventType, JobStatus, ParseStatusError, ReportStatus, SectionStatus};
