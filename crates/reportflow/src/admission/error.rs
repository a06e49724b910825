use thiserror::Error;

use crate::db::DatabaseError;
use crate::model::InputError;
use crate::queue::QueueError;

/// Why a request was not admitted. A rejection leaves no rows behind.
#[derive(Error, Debug)]
pub enum AdmissionError {
    #[error("Invalid request: {0}")]
    Invalid(#[from] InputError),

    #[error("Section {0} does not exist")]
    UnknownSection(u32),

    #[error("Too many running jobs ({running} of {limit})")]
    Backpressure { running: u32, limit: u32 },

    #[error("Report '{0}' not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Status store error: {0}")]
    Store(#[from] DatabaseError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}
