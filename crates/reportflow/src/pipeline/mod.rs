pub mod config;
pub mod context;
pub mod error;
pub mod progress;
pub mod runner;

pub use config::PipelineConfig;
pub use context::{PipelineContext, SectionTally};
pub use error::{PipelineError, SectionError};
pub use progress::RunLog;
pub use runner::{ReportPipeline, RunOutcome};
