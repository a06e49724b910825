//! Admission: validation, backpressure and atomic creation of new work.
//!
//! The running-job count is read from the status store inside the same
//! `BEGIN IMMEDIATE` transaction that creates the rows, so concurrent
//! admissions (in this process or another sharing the database) serialize
//! on the write lock and cannot both slip under the limit. The first event
//! of each admitted job is written in that transaction too and published
//! only after commit.

pub mod error;

use std::sync::Arc;

use chrono::Utc;
use rusqlite::Connection;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::db::event_repo::{self, NewEvent};
use crate::db::{job_repo, report_repo, section_repo};
use crate::events::EventLog;
use crate::model::{taxonomy, EventType, JobScope, SubmitRequest};
use crate::queue::{EnqueueOutcome, QueueMessage, WorkQueue};
use crate::store::StatusStore;

pub use error::AdmissionError;

#[derive(Debug, Clone)]
pub struct AdmissionSettings {
    pub max_running_jobs: u32,
    pub default_owner: String,
}

impl AdmissionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_running_jobs: config.admission.max_running_jobs,
            default_owner: config.admission.default_owner.clone(),
        }
    }
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Identifiers of admitted work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub report_id: String,
    pub job_id: String,
}

pub struct AdmissionController {
    store: StatusStore,
    events: EventLog,
    queue: Arc<dyn WorkQueue>,
    settings: AdmissionSettings,
}

fn check_capacity(conn: &Connection, limit: u32) -> Result<Result<(), AdmissionError>, crate::db::DatabaseError> {
    let running = job_repo::count_running(conn)?;
    if running >= limit {
        return Ok(Err(AdmissionError::Backpressure { running, limit }));
    }
    Ok(Ok(()))
}

impl AdmissionController {
    pub fn new(
        store: StatusStore,
        events: EventLog,
        queue: Arc<dyn WorkQueue>,
        settings: AdmissionSettings,
    ) -> Self {
        Self {
            store,
            events,
            queue,
            settings,
        }
    }

    pub fn settings(&self) -> &AdmissionSettings {
        &self.settings
    }

    /// Admits a new report. Creates Report, ReportInput and Job together,
    /// then enqueues the job.
    pub async fn submit(&self, request: &SubmitRequest) -> Result<SubmitOutcome, AdmissionError> {
        let input = request.normalize()?;
        let owner = request
            .owner
            .as_deref()
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .unwrap_or(&self.settings.default_owner)
            .to_string();

        let report_id = Uuid::new_v4().to_string();
        let job_id = Uuid::new_v4().to_string();
        let limit = self.settings.max_running_jobs;

        let theme = format!("theme: {}", input.theme_text);
        let event = self.store.transaction(|tx| {
            if let Err(rejection) = check_capacity(tx, limit)? {
                return Ok(Err(rejection));
            }
            let now = Utc::now();
            report_repo::insert(tx, &report_id, &owner, now)?;
            report_repo::insert_input(tx, &report_id, &input, now)?;
            job_repo::insert(tx, &job_id, &report_id, JobScope::Full, now)?;
            let event = event_repo::append(
                tx,
                &NewEvent {
                    job_id: &job_id,
                    report_id: &report_id,
                    event_type: EventType::Info,
                    message_user: "Request accepted",
                    message_internal: Some(&theme),
                },
                now,
            )?;
            Ok(Ok(event))
        })??;

        info!(report_id = %report_id, job_id = %job_id, owner = %owner, "Report admitted");
        self.events.publish(&event);
        self.dispatch(&report_id, &job_id).await;

        Ok(SubmitOutcome { report_id, job_id })
    }

    /// Admits a new full-scope job for a finished report. Completed
    /// sections are kept; the rest run again.
    pub async fn retry_report(&self, report_id: &str) -> Result<SubmitOutcome, AdmissionError> {
        let job_id = Uuid::new_v4().to_string();
        let limit = self.settings.max_running_jobs;

        let event = self.store.transaction(|tx| {
            if let Err(rejection) = self.check_retryable_report(tx, report_id)? {
                return Ok(Err(rejection));
            }
            if let Err(rejection) = check_capacity(tx, limit)? {
                return Ok(Err(rejection));
            }
            let now = Utc::now();
            job_repo::insert(tx, &job_id, report_id, JobScope::Full, now)?;
            let event = event_repo::append(
                tx,
                &NewEvent {
                    job_id: &job_id,
                    report_id,
                    event_type: EventType::Info,
                    message_user: "Retry requested",
                    message_internal: None,
                },
                now,
            )?;
            Ok(Ok(event))
        })??;

        info!(report_id = %report_id, job_id = %job_id, "Report retry admitted");
        self.events.publish(&event);
        self.dispatch(report_id, &job_id).await;

        Ok(SubmitOutcome {
            report_id: report_id.to_string(),
            job_id,
        })
    }

    /// Admits a job that re-runs one `failed` or `insufficient_evidence`
    /// section.
    pub async fn retry_section(
        &self,
        report_id: &str,
        order_no: u32,
    ) -> Result<SubmitOutcome, AdmissionError> {
        if taxonomy::title_for(order_no).is_none() {
            return Err(AdmissionError::UnknownSection(order_no));
        }

        let job_id = Uuid::new_v4().to_string();
        let limit = self.settings.max_running_jobs;

        let message = format!("Retry of section {} requested", order_no);
        let event = self.store.transaction(|tx| {
            if let Err(rejection) = self.check_retryable_report(tx, report_id)? {
                return Ok(Err(rejection));
            }
            match section_repo::find_by_order(tx, report_id, order_no)? {
                Some(section) if section.status.is_retryable() => {}
                Some(section) => {
                    return Ok(Err(AdmissionError::Conflict(format!(
                        "Section {} is {}, only failed or insufficient_evidence sections can be retried",
                        order_no, section.status
                    ))))
                }
                None => return Ok(Err(AdmissionError::UnknownSection(order_no))),
            }
            if let Err(rejection) = check_capacity(tx, limit)? {
                return Ok(Err(rejection));
            }
            let now = Utc::now();
            job_repo::insert(tx, &job_id, report_id, JobScope::Section(order_no), now)?;
            let event = event_repo::append(
                tx,
                &NewEvent {
                    job_id: &job_id,
                    report_id,
                    event_type: EventType::Info,
                    message_user: &message,
                    message_internal: None,
                },
                now,
            )?;
            Ok(Ok(event))
        })??;

        info!(report_id = %report_id, job_id = %job_id, order_no, "Section retry admitted");
        self.events.publish(&event);
        self.dispatch(report_id, &job_id).await;

        Ok(SubmitOutcome {
            report_id: report_id.to_string(),
            job_id,
        })
    }

    /// Flags the report's active job for cancellation. The pipeline stops
    /// at the next section boundary. Returns the job ID.
    pub fn cancel(&self, report_id: &str) -> Result<String, AdmissionError> {
        let (job, event) = self.store.transaction(|tx| {
            if report_repo::find_by_id(tx, report_id)?.is_none() {
                return Ok(Err(AdmissionError::NotFound(report_id.to_string())));
            }
            let Some(job) = job_repo::active_for_report(tx, report_id)? else {
                return Ok(Err(AdmissionError::Conflict(format!(
                    "Report '{}' has no queued or running job",
                    report_id
                ))));
            };
            let now = Utc::now();
            job_repo::request_cancel(tx, &job.id, now)?;
            let event = event_repo::append(
                tx,
                &NewEvent {
                    job_id: &job.id,
                    report_id,
                    event_type: EventType::Info,
                    message_user: "Cancellation requested",
                    message_internal: None,
                },
                now,
            )?;
            Ok(Ok((job, event)))
        })??;

        info!(report_id = %report_id, job_id = %job.id, "Cancellation requested");
        self.events.publish(&event);
        Ok(job.id)
    }

    /// Enqueues every job still `queued`. Deduplication makes this safe to
    /// run at any time; returns how many messages were actually added.
    pub async fn recover_queued(&self) -> Result<usize, AdmissionError> {
        let mut recovered = 0;
        for job in self.store.queued_jobs()? {
            let message = QueueMessage::new(&job.report_id, &job.id);
            if self.queue.enqueue(&message).await? == EnqueueOutcome::Enqueued {
                info!(job_id = %job.id, "Recovered queued job");
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    fn check_retryable_report(
        &self,
        conn: &Connection,
        report_id: &str,
    ) -> Result<Result<(), AdmissionError>, crate::db::DatabaseError> {
        if report_repo::find_by_id(conn, report_id)?.is_none() {
            return Ok(Err(AdmissionError::NotFound(report_id.to_string())));
        }
        if let Some(active) = job_repo::active_for_report(conn, report_id)? {
            return Ok(Err(AdmissionError::Conflict(format!(
                "Report '{}' already has {} job '{}'",
                report_id, active.status, active.id
            ))));
        }
        Ok(Ok(()))
    }

    /// The job row is already committed; a failed enqueue is healed by
    /// [`recover_queued`](Self::recover_queued).
    async fn dispatch(&self, report_id: &str, job_id: &str) {
        match self
            .queue
            .enqueue(&QueueMessage::new(report_id, job_id))
            .await
        {
            Ok(EnqueueOutcome::Enqueued) => {}
            Ok(EnqueueOutcome::Duplicate) => {
                warn!(job_id = %job_id, "Job was already enqueued");
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Failed to enqueue job, left for recovery");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::JobEventBroadcaster;
    use crate::model::{InputError, JobStatus, ReportStatus, SectionStatus};
    use crate::queue::sqlite::{QueueSettings, SqliteQueue};
    use crate::queue::REPORT_QUEUE;

    fn controller(limit: u32) -> (AdmissionController, Arc<SqliteQueue>, StatusStore) {
        let store = StatusStore::open_in_memory().unwrap();
        let queue = Arc::new(SqliteQueue::new(
            store.database().clone(),
            REPORT_QUEUE,
            QueueSettings::default(),
        ));
        let events = EventLog::new(store.clone(), JobEventBroadcaster::default());
        let controller = AdmissionController::new(
            store.clone(),
            events,
            queue.clone(),
            AdmissionSettings {
                max_running_jobs: limit,
                default_owner: "system".into(),
            },
        );
        (controller, queue, store)
    }

    #[tokio::test]
    async fn test_submit_creates_queued_report_and_job() {
        let (controller, queue, store) = controller(5);
        let outcome = controller
            .submit(&SubmitRequest::with_theme("SaaS HR market"))
            .await
            .unwrap();

        let report = store.report(&outcome.report_id).unwrap().unwrap();
        assert_eq!(report.status, ReportStatus::Queued);
        assert_eq!(report.owner, "system");
        let job = store.job(&outcome.job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.attempts, 0);

        let events = store.recent_events(&outcome.job_id, 10).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message_user, "Request accepted");
        assert_eq!(queue.stats().await.unwrap().ready, 1);
    }

    #[tokio::test]
    async fn test_failed_event_write_rolls_back_admission() {
        let (controller, queue, store) = controller(5);
        store
            .database()
            .with_conn(|conn| Ok(conn.execute("DROP TABLE job_events", [])?))
            .unwrap();

        let err = controller
            .submit(&SubmitRequest::with_theme("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::Store(_)));
        assert_eq!(store.list_reports(&Default::default()).unwrap().1, 0);
        assert!(store.queued_jobs().unwrap().is_empty());
        assert_eq!(queue.stats().await.unwrap().ready, 0);
    }

    #[tokio::test]
    async fn test_blank_theme_rejected_without_writes() {
        let (controller, _, store) = controller(5);
        let err = controller
            .submit(&SubmitRequest::with_theme("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::Invalid(InputError::MissingTheme)));
        assert_eq!(store.list_reports(&Default::default()).unwrap().1, 0);
    }

    #[tokio::test]
    async fn test_backpressure_at_limit() {
        let (controller, queue, store) = controller(1);
        let first = controller
            .submit(&SubmitRequest::with_theme("first"))
            .await
            .unwrap();
        store.start_job(&first.job_id).unwrap();

        let err = controller
            .submit(&SubmitRequest::with_theme("second"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AdmissionError::Backpressure {
                running: 1,
                limit: 1
            }
        ));
        assert_eq!(store.list_reports(&Default::default()).unwrap().1, 1);
        assert_eq!(queue.stats().await.unwrap().ready, 1);
    }

    #[tokio::test]
    async fn test_retry_report_requires_terminal_report() {
        let (controller, _, store) = controller(5);
        let outcome = controller
            .submit(&SubmitRequest::with_theme("x"))
            .await
            .unwrap();

        let err = controller.retry_report(&outcome.report_id).await.unwrap_err();
        assert!(matches!(err, AdmissionError::Conflict(_)));

        store.start_job(&outcome.job_id).unwrap();
        store
            .finish_job(&outcome.job_id, JobStatus::Failed, Some("timeout"))
            .unwrap();
        let retry = controller.retry_report(&outcome.report_id).await.unwrap();
        assert_ne!(retry.job_id, outcome.job_id);
        assert_eq!(
            store.latest_job(&outcome.report_id).unwrap().unwrap().id,
            retry.job_id
        );
    }

    #[tokio::test]
    async fn test_retry_unknown_report() {
        let (controller, _, _) = controller(5);
        assert!(matches!(
            controller.retry_report("nope").await,
            Err(AdmissionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_retry_section_only_for_retryable_sections() {
        let (controller, _, store) = controller(5);
        let outcome = controller
            .submit(&SubmitRequest::with_theme("x"))
            .await
            .unwrap();
        store.start_job(&outcome.job_id).unwrap();
        store.ensure_sections(&outcome.report_id).unwrap();
        let section = store.section(&outcome.report_id, 3).unwrap().unwrap();
        store
            .set_section_status(&section.id, SectionStatus::Collecting)
            .unwrap();
        store
            .set_section_status(&section.id, SectionStatus::Failed)
            .unwrap();
        store
            .finish_job(&outcome.job_id, JobStatus::Completed, None)
            .unwrap();

        assert!(matches!(
            controller.retry_section(&outcome.report_id, 2).await,
            Err(AdmissionError::Conflict(_))
        ));
        assert!(matches!(
            controller.retry_section(&outcome.report_id, 9).await,
            Err(AdmissionError::UnknownSection(9))
        ));

        let retry = controller
            .retry_section(&outcome.report_id, 3)
            .await
            .unwrap();
        let job = store.job(&retry.job_id).unwrap().unwrap();
        assert_eq!(job.scope, JobScope::Section(3));
    }

    #[tokio::test]
    async fn test_cancel_flags_active_job() {
        let (controller, _, store) = controller(5);
        let outcome = controller
            .submit(&SubmitRequest::with_theme("x"))
            .await
            .unwrap();

        let job_id = controller.cancel(&outcome.report_id).unwrap();
        assert_eq!(job_id, outcome.job_id);
        let job = store.job(&job_id).unwrap().unwrap();
        assert!(job.is_cancel_requested());
        assert_eq!(job.status, JobStatus::Queued);

        assert!(matches!(
            controller.cancel("nope"),
            Err(AdmissionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_recover_queued_is_idempotent() {
        let (controller, queue, store) = controller(5);
        store
            .transaction(|tx| {
                let now = Utc::now();
                report_repo::insert(tx, "r1", "alice", now)?;
                report_repo::insert_input(tx, "r1", &crate::model::ReportInput::new("x"), now)?;
                job_repo::insert(tx, "j1", "r1", JobScope::Full, now)?;
                Ok(())
            })
            .unwrap();

        assert_eq!(controller.recover_queued().await.unwrap(), 1);
        assert_eq!(controller.recover_queued().await.unwrap(), 0);
        assert_eq!(queue.stats().await.unwrap().ready, 1);
    }
}
