use crate::pipeline::RunOutcome;
use crate::queue::Delivery;

/// What a worker did with one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub job_id: String,
    pub report_id: String,
    pub delivery_id: i64,
    pub success: bool,
    pub outcome: Option<RunOutcome>,
    pub error: Option<String>,
}

impl JobResult {
    pub fn success(delivery: &Delivery, outcome: RunOutcome) -> Self {
        Self {
            job_id: delivery.message.job_id.clone(),
            report_id: delivery.message.report_id.clone(),
            delivery_id: delivery.id,
            success: true,
            outcome: Some(outcome),
            error: None,
        }
    }

    pub fn failure(delivery: &Delivery, error: String) -> Self {
        Self {
            job_id: delivery.message.job_id.clone(),
            report_id: delivery.message.report_id.clone(),
            delivery_id: delivery.id,
            success: false,
            outcome: None,
            error: Some(error),
        }
    }
}
