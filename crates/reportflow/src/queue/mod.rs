//! Durable at-least-once work queue decoupling admission from execution.

pub mod sqlite;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::DatabaseError;

pub use sqlite::SqliteQueue;

/// Name of the queue carrying report generation work.
pub const REPORT_QUEUE: &str = "report-generation";

/// Payload of a queued unit of work. `job_id` is the dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMessage {
    pub report_id: String,
    pub job_id: String,
}

impl QueueMessage {
    pub fn new(report_id: impl Into<String>, job_id: impl Into<String>) -> Self {
        Self {
            report_id: report_id.into(),
            job_id: job_id.into(),
        }
    }
}

/// A claimed message.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: i64,
    pub message: QueueMessage,
    /// Delivery count including this one.
    pub deliveries: u32,
}

/// Result of one claim attempt.
#[derive(Debug, Clone, Default)]
pub struct Claim {
    pub delivery: Option<Delivery>,
    /// Messages found in flight with no delivery left, dead-lettered by
    /// this claim. Whoever held them stopped without ack or nack.
    pub abandoned: Vec<Delivery>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    /// A message with the same job id already exists.
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackOutcome {
    Redeliver { at: DateTime<Utc> },
    DeadLettered,
}

/// Message counts per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub ready: u64,
    pub inflight: u64,
    pub done: u64,
    pub dead: u64,
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue storage error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Delivery {0} is not in flight")]
    UnknownDelivery(i64),
}

impl From<rusqlite::Error> for QueueError {
    fn from(e: rusqlite::Error) -> Self {
        QueueError::Database(DatabaseError::Sqlite(e))
    }
}

/// Redelivery policy applied on `nack`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total deliveries allowed before a message is dead-lettered.
    pub max_deliveries: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    const MAX_BACKOFF: Duration = Duration::from_secs(3600);

    /// Exponential delay before redelivery number `deliveries + 1`.
    pub fn backoff(&self, deliveries: u32) -> Duration {
        let exponent = deliveries.saturating_sub(1).min(16);
        self.backoff_base
            .saturating_mul(1u32 << exponent)
            .min(Self::MAX_BACKOFF)
    }

    pub fn allows_redelivery(&self, deliveries: u32) -> bool {
        deliveries < self.max_deliveries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_deliveries: 2,
            backoff_base: Duration::from_secs(5),
        }
    }
}

#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Adds a message unless one with the same job id exists.
    async fn enqueue(&self, message: &QueueMessage) -> Result<EnqueueOutcome, QueueError>;

    /// Claims the next visible message, dead-lettering any visible message
    /// that has used up its deliveries on the way.
    async fn claim(&self) -> Result<Claim, QueueError>;

    /// Claims the next visible message, if any.
    async fn dequeue(&self) -> Result<Option<Delivery>, QueueError> {
        Ok(self.claim().await?.delivery)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Reports a failed delivery; the retry policy decides what happens.
    async fn nack(&self, delivery: &Delivery, error: &str) -> Result<NackOutcome, QueueError>;

    async fn stats(&self) -> Result<QueueStats, QueueError>;

    /// Waits until a message may be available or `timeout` elapses.
    async fn wait_for_message(&self, timeout: Duration) {
        tokio::time::sleep(timeout).await;
    }
}
