pub mod job;
pub mod pool;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::pipeline::ReportPipeline;
use crate::queue::{Delivery, NackOutcome, QueueError, WorkQueue};

pub use job::JobResult;
pub use pool::WorkerPool;

/// Claims deliveries from the queue and runs them through the pipeline.
///
/// A run that returns normally (completed, cancelled, or already finished)
/// is acked; a run that fails is nacked and left to the queue's retry
/// policy. Jobs whose messages the queue dead-letters at claim time are
/// marked failed here, since no run will ever report on them.
pub struct Worker {
    queue: Arc<dyn WorkQueue>,
    pipeline: Arc<ReportPipeline>,
}

impl Worker {
    pub fn new(queue: Arc<dyn WorkQueue>, pipeline: Arc<ReportPipeline>) -> Self {
        Self { queue, pipeline }
    }

    /// Processes at most one delivery. `Ok(None)` means the queue was empty.
    pub async fn process_next(&self) -> Result<Option<JobResult>, QueueError> {
        let claim = self.queue.claim().await?;
        for abandoned in &claim.abandoned {
            self.fail_abandoned(abandoned);
        }
        let Some(delivery) = claim.delivery else {
            return Ok(None);
        };

        info!(
            job_id = %delivery.message.job_id,
            delivery = delivery.deliveries,
            "Claimed job"
        );

        match self.pipeline.run(&delivery.message).await {
            Ok(outcome) => {
                self.queue.ack(&delivery).await?;
                Ok(Some(JobResult::success(&delivery, outcome)))
            }
            Err(e) => {
                let error = e.to_string();
                match self.queue.nack(&delivery, &error).await? {
                    NackOutcome::Redeliver { at } => {
                        info!(job_id = %delivery.message.job_id, %at, "Job scheduled for redelivery");
                    }
                    NackOutcome::DeadLettered => {
                        warn!(job_id = %delivery.message.job_id, "Job moved to dead letter");
                    }
                }
                Ok(Some(JobResult::failure(&delivery, error)))
            }
        }
    }

    fn fail_abandoned(&self, delivery: &Delivery) {
        let job_id = &delivery.message.job_id;
        match self.pipeline.abandon(&delivery.message, delivery.deliveries) {
            Ok(true) => info!(job_id = %job_id, "Abandoned delivery handled"),
            Ok(false) => {}
            // The message is already dead; the job stays for an operator to retry.
            Err(e) => error!(job_id = %job_id, error = %e, "Failed to mark abandoned job failed"),
        }
    }

    pub async fn wait_for_work(&self, timeout: Duration) {
        self.queue.wait_for_message(timeout).await;
    }
}
