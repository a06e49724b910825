//! Test harness for isolated test execution.
//!
//! The `TestHarness` struct wires every component over a database file in
//! a temporary directory, with a scripted evidence collector and the
//! simulated drafter.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use reportflow::collaborators::{Collaborators, SimulatedDrafter, ThresholdReviewer};
use reportflow::config::Config;
use reportflow::db::Database;
use reportflow::model::{SectionStatus, SubmitRequest};
use reportflow::worker::JobResult;
use reportflow::{Services, SubmitOutcome};

use super::builders::ConfigBuilder;
use super::scripted::ScriptedCollector;

pub struct TestHarness {
    /// Keeps the database directory alive.
    temp_dir: TempDir,
    pub db_path: PathBuf,
    pub services: Services,
    pub collector: Arc<ScriptedCollector>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(ConfigBuilder::new().build())
    }

    pub fn with_config(mut config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("reportflow.db");
        config.database_path = Some(db_path.to_string_lossy().to_string());

        let db = Database::open(&db_path).expect("Failed to open database");
        let collector = Arc::new(ScriptedCollector::new());
        let mut collaborators =
            Collaborators::new(collector.clone(), Arc::new(SimulatedDrafter::new(Duration::ZERO)));
        if config.collaborators.review {
            collaborators = collaborators.with_reviewer(Arc::new(ThresholdReviewer));
        }

        let services = Services::assemble(config, db.clone(), db, collaborators);

        Self {
            temp_dir,
            db_path,
            services,
            collector,
        }
    }

    pub async fn submit(&self, theme: &str) -> SubmitOutcome {
        self.services
            .admission
            .submit(&SubmitRequest::with_theme(theme))
            .await
            .expect("submission should be admitted")
    }

    /// Processes one delivery, if any.
    pub async fn run_next(&self) -> Option<JobResult> {
        self.services
            .worker()
            .process_next()
            .await
            .expect("queue should be reachable")
    }

    /// Processes deliveries until the queue has nothing visible.
    pub async fn run_until_idle(&self) -> Vec<JobResult> {
        let mut results = Vec::new();
        while let Some(result) = self.run_next().await {
            results.push(result);
        }
        results
    }

    pub fn section_statuses(&self, report_id: &str) -> Vec<SectionStatus> {
        self.services
            .store
            .sections(report_id)
            .expect("sections should load")
            .iter()
            .map(|s| s.status)
            .collect()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
