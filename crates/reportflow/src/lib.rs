pub mod admission;
pub mod broadcast;
pub mod collaborators;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod queue;
pub mod reader;
pub mod services;
pub mod store;
pub mod worker;

pub use admission::{AdmissionController, AdmissionError, AdmissionSettings, SubmitOutcome};
pub use broadcast::{JobEventBroadcaster, UserEvent};
pub use collaborators::Collaborators;
pub use config::{load_config, Config};
pub use error::{ConfigError, ReportflowError, Result, WorkerError};
pub use events::EventLog;
pub use pipeline::{PipelineConfig, PipelineError, ReportPipeline, RunOutcome};
pub use queue::{QueueMessage, WorkQueue};
pub use reader::ProgressReader;
pub use services::Services;
pub use store::StatusStore;
pub use worker::{Worker, WorkerPool};
