use std::future::Future;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{info, info_span, warn, Instrument};

use crate::collaborators::{
    Collaborators, CollectorError, DraftError, EvidenceRequest, SectionTopic,
};
use crate::db::DatabaseError;
use crate::events::EventLog;
use crate::model::{Evidence, EvidenceItem, JobStatus, Section, SectionStatus};
use crate::queue::QueueMessage;
use crate::store::StatusStore;

use super::config::PipelineConfig;
use super::context::{PipelineContext, SectionTally};
use super::error::{PipelineError, SectionError};
use super::progress::RunLog;

/// How a run ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { tally: SectionTally },
    Cancelled { tally: SectionTally },
    /// The job was already terminal; nothing was done.
    AlreadyFinished,
}

/// Why a section step stopped early.
enum StepError {
    Section(SectionError),
    Timeout,
    Store(DatabaseError),
}

impl From<DatabaseError> for StepError {
    fn from(e: DatabaseError) -> Self {
        StepError::Store(e)
    }
}

impl From<SectionError> for StepError {
    fn from(e: SectionError) -> Self {
        StepError::Section(e)
    }
}

impl From<CollectorError> for StepError {
    fn from(e: CollectorError) -> Self {
        StepError::Section(e.into())
    }
}

impl From<DraftError> for StepError {
    fn from(e: DraftError) -> Self {
        StepError::Section(e.into())
    }
}

async fn within<F: Future>(deadline: Instant, fut: F) -> Result<F::Output, StepError> {
    tokio::time::timeout_at(deadline, fut)
        .await
        .map_err(|_| StepError::Timeout)
}

/// Drives one job through its sections, one at a time in `order_no` order.
pub struct ReportPipeline {
    config: Arc<PipelineConfig>,
    store: StatusStore,
    events: EventLog,
    collaborators: Collaborators,
}

impl ReportPipeline {
    pub fn new(
        config: Arc<PipelineConfig>,
        store: StatusStore,
        events: EventLog,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            config,
            store,
            events,
            collaborators,
        }
    }

    pub fn store(&self) -> &StatusStore {
        &self.store
    }

    /// Runs the job named by `message`.
    ///
    /// Section failures are contained and recorded; an `Err` means the job
    /// itself failed and has already been marked so when the store allowed
    /// it.
    pub async fn run(&self, message: &QueueMessage) -> Result<RunOutcome, PipelineError> {
        let span = info_span!("pipeline",
            job_id = %message.job_id,
            report_id = %message.report_id,
        );
        self.run_job(message).instrument(span).await
    }

    async fn run_job(&self, message: &QueueMessage) -> Result<RunOutcome, PipelineError> {
        let job = self
            .store
            .job(&message.job_id)?
            .ok_or_else(|| PipelineError::UnknownJob(message.job_id.clone()))?;

        if job.status.is_terminal() {
            info!(status = %job.status, "Job already finished, skipping");
            return Ok(RunOutcome::AlreadyFinished);
        }

        let log = RunLog::new(self.events.clone(), &job.report_id, &job.id);
        match self.execute(&job.id, &job.report_id, &log).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.fail(&job.id, &job.report_id, &log, &e);
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        job_id: &str,
        report_id: &str,
        log: &RunLog,
    ) -> Result<RunOutcome, PipelineError> {
        let deadline = Instant::now() + self.config.job_timeout;

        let job = self.store.start_job(job_id)?;
        log.info("Processing started")?;

        let input = self
            .store
            .input(report_id)?
            .ok_or_else(|| PipelineError::MissingInput(report_id.to_string()))?;

        let created = self.store.ensure_sections(report_id)?;
        if created > 0 {
            log.progress(&format!("Planned {} sections", created))?;
        } else {
            log.progress("Resuming with existing sections")?;
        }

        let targets: Vec<Section> = self
            .store
            .sections(report_id)?
            .into_iter()
            .filter(|s| job.scope.includes(s.order_no))
            .collect();
        if targets.is_empty() {
            if let Some(order_no) = job.scope.to_column() {
                return Err(PipelineError::MissingSection {
                    report_id: report_id.to_string(),
                    order_no,
                });
            }
        }

        let mut ctx = PipelineContext::new(job, input, deadline);

        for section in targets {
            if section.status == SectionStatus::Completed {
                continue;
            }
            if self.store.is_cancel_requested(job_id)? {
                return self.cancel(&ctx, log);
            }
            if Instant::now() >= ctx.deadline {
                return Err(PipelineError::Timeout {
                    limit: self.config.job_timeout,
                });
            }

            let status = self.run_section(&ctx, log, &section).await?;
            ctx.tally.record(status);
        }

        log.info_with("Generation completed", &ctx.tally.summary())?;
        self.store.finish_job(job_id, JobStatus::Completed, None)?;
        Ok(RunOutcome::Completed { tally: ctx.tally })
    }

    /// Runs one section to a terminal status. Only store errors and the
    /// run deadline escape.
    async fn run_section(
        &self,
        ctx: &PipelineContext,
        log: &RunLog,
        section: &Section,
    ) -> Result<SectionStatus, PipelineError> {
        let span = info_span!("section", order_no = section.order_no);
        match self.advance_section(ctx, log, section).instrument(span).await {
            Ok(()) => Ok(SectionStatus::Completed),
            Err(StepError::Section(e)) => {
                let status = e.terminal_status();
                self.store.set_section_status(&section.id, status)?;
                log.error(&e.user_message(section), &e.to_string())?;
                Ok(status)
            }
            Err(StepError::Timeout) => {
                self.store
                    .set_section_status(&section.id, SectionStatus::Failed)?;
                log.error(
                    &format!(
                        "Section {} ({}) stopped: time limit reached",
                        section.order_no, section.title
                    ),
                    &format!("deadline of {}s elapsed", self.config.job_timeout.as_secs()),
                )?;
                Err(PipelineError::Timeout {
                    limit: self.config.job_timeout,
                })
            }
            Err(StepError::Store(e)) => Err(e.into()),
        }
    }

    async fn advance_section(
        &self,
        ctx: &PipelineContext,
        log: &RunLog,
        section: &Section,
    ) -> Result<(), StepError> {
        let order_no = section.order_no;
        let topic = SectionTopic::new(&section.report_id, order_no, &section.title, &ctx.input);

        // Collect
        self.store
            .set_section_status(&section.id, SectionStatus::Collecting)?;
        log.progress(&format!(
            "Section {} ({}): collecting evidence",
            order_no, section.title
        ))?;

        let prior_evidence: Vec<EvidenceItem> = self
            .store
            .sibling_evidence(&section.report_id, &section.id)?
            .iter()
            .map(Evidence::item)
            .collect();
        let request = EvidenceRequest {
            topic: topic.clone(),
            sources: ctx.input.source_priority.clone(),
            fallback: ctx.input.fallback,
            prior_evidence,
        };
        let set = within(ctx.deadline, self.collaborators.collector.collect(&request)).await??;

        for skipped in &set.skipped {
            log.info_with(
                &format!("Section {}: {} source skipped", order_no, skipped.source_type),
                &skipped.reason,
            )?;
        }

        let counts = self.store.record_collection(
            &section.report_id,
            &section.id,
            &ctx.job.id,
            &set.items,
        )?;
        log.progress(&format!(
            "Section {}: collected {} evidence items (internal {}, video {}, web {})",
            order_no,
            counts.total(),
            counts.internal,
            counts.video,
            counts.web
        ))?;

        if counts.total() < self.config.min_evidence_items {
            return Err(SectionError::TooLittleEvidence {
                found: counts.total(),
                required: self.config.min_evidence_items,
            }
            .into());
        }

        // Draft
        self.store
            .set_section_status(&section.id, SectionStatus::Drafting)?;
        log.progress(&format!("Section {}: drafting", order_no))?;
        let draft = within(
            ctx.deadline,
            self.collaborators.drafter.draft(&topic, &set.items),
        )
        .await??;
        self.store.record_draft(&section.id, &draft.body)?;

        // Review
        if let Some(reviewer) = &self.collaborators.reviewer {
            self.store
                .set_section_status(&section.id, SectionStatus::Reviewing)?;
            log.progress(&format!("Section {}: reviewing", order_no))?;
            let violations = within(
                ctx.deadline,
                reviewer.review(&topic, &draft, &self.config.quality),
            )
            .await?;
            for violation in &violations {
                log.info_with(
                    &format!("Section {}: quality check flagged {}", order_no, violation.rule),
                    &violation.detail,
                )?;
            }
        }

        self.store
            .set_section_status(&section.id, SectionStatus::Completed)?;
        log.progress(&format!("Section {} ({}) completed", order_no, section.title))?;
        Ok(())
    }

    fn cancel(&self, ctx: &PipelineContext, log: &RunLog) -> Result<RunOutcome, PipelineError> {
        log.info_with("Generation cancelled", &ctx.tally.summary())?;
        self.store
            .finish_job(&ctx.job.id, JobStatus::Failed, Some("cancelled"))?;
        Ok(RunOutcome::Cancelled { tally: ctx.tally })
    }

    /// Fails a job whose queue message ran out of deliveries while the job
    /// was still active, i.e. every worker that claimed it stopped without
    /// reporting an outcome. Returns false if the job is unknown or already
    /// terminal.
    pub fn abandon(&self, message: &QueueMessage, deliveries: u32) -> Result<bool, PipelineError> {
        let Some(job) = self.store.job(&message.job_id)? else {
            return Ok(false);
        };
        if job.status.is_terminal() {
            return Ok(false);
        }

        let error = PipelineError::Abandoned { deliveries };
        warn!(job_id = %job.id, report_id = %job.report_id, deliveries, "Abandoned job marked failed");
        self.close_open_sections(&job.report_id)?;
        let log = RunLog::new(self.events.clone(), &job.report_id, &job.id);
        log.error(&error.user_message(), &error.to_string())?;
        self.store
            .finish_job(&job.id, JobStatus::Failed, Some(error.failure_reason()))?;
        Ok(true)
    }

    /// Moves sections a stopped run left mid-step to `failed`.
    fn close_open_sections(&self, report_id: &str) -> Result<(), DatabaseError> {
        for section in self.store.sections(report_id)? {
            if section.status.is_in_progress() {
                self.store
                    .set_section_status(&section.id, SectionStatus::Failed)?;
            }
        }
        Ok(())
    }

    /// Best effort: the store may be the thing that failed.
    fn fail(&self, job_id: &str, report_id: &str, log: &RunLog, error: &PipelineError) {
        warn!(error = %error, "Pipeline failed");
        if let Err(e) = self.close_open_sections(report_id) {
            warn!(error = %e, "Failed to close sections left in progress");
        }
        if let Err(e) = log.error(&error.user_message(), &error.to_string()) {
            warn!(error = %e, "Failed to record failure event");
        }
        if let Err(e) = self
            .store
            .finish_job(job_id, JobStatus::Failed, Some(error.failure_reason()))
        {
            warn!(error = %e, "Failed to mark job failed");
        }
    }
}
