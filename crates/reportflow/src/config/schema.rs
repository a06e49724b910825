use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::db::default_database_path;
use crate::queue::sqlite::QueueSettings;
use crate::queue::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    /// Status store file. Defaults to `~/.reportflow/data/reportflow.db`.
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub collaborators: CollaboratorsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database_path: None,
            queue: QueueConfig::default(),
            admission: AdmissionConfig::default(),
            worker: WorkerConfig::default(),
            pipeline: PipelineSettings::default(),
            collaborators: CollaboratorsConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .as_ref()
            .map(PathBuf::from)
            .or_else(default_database_path)
            .unwrap_or_else(|| PathBuf::from("reportflow.db"))
    }

    /// Queue database file; the status store file unless set.
    pub fn queue_path(&self) -> PathBuf {
        self.queue
            .path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.database_path())
    }

    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings {
            visibility_timeout: Duration::from_secs(self.queue.visibility_timeout_secs),
            retry: RetryPolicy {
                max_deliveries: self.queue.max_deliveries,
                backoff_base: Duration::from_millis(self.queue.backoff_base_ms),
            },
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.queue.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_deliveries")]
    pub max_deliveries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

fn default_visibility_timeout_secs() -> u64 {
    3600
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_max_deliveries() -> u32 {
    2
}

fn default_backoff_base_ms() -> u64 {
    5000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            path: None,
            visibility_timeout_secs: default_visibility_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            max_deliveries: default_max_deliveries(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    #[serde(default = "default_max_running_jobs")]
    pub max_running_jobs: u32,
    #[serde(default = "default_owner")]
    pub default_owner: String,
}

fn default_max_running_jobs() -> u32 {
    5
}

fn default_owner() -> String {
    "anonymous".to_string()
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_running_jobs: default_max_running_jobs(),
            default_owner: default_owner(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
}

fn default_worker_count() -> usize {
    1
}

fn default_job_timeout_secs() -> u64 {
    2700
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            job_timeout_secs: default_job_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    #[serde(default = "default_min_evidence_items")]
    pub min_evidence_items: u32,
    /// Events returned with a progress query.
    #[serde(default = "default_events_limit")]
    pub events_limit: u32,
}

fn default_min_evidence_items() -> u32 {
    1
}

fn default_events_limit() -> u32 {
    50
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            min_evidence_items: default_min_evidence_items(),
            events_limit: default_events_limit(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollaboratorMode {
    #[default]
    Simulated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaboratorsConfig {
    #[serde(default)]
    pub mode: CollaboratorMode,
    /// Delay of every simulated collaborator call.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_true")]
    pub review: bool,
    #[serde(default)]
    pub quality: QualityConfig,
}

fn default_delay_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

impl Default for CollaboratorsConfig {
    fn default() -> Self {
        Self {
            mode: CollaboratorMode::default(),
            delay_ms: default_delay_ms(),
            review: true,
            quality: QualityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    #[serde(default = "default_min_body_chars")]
    pub min_body_chars: usize,
    #[serde(default = "default_min_citations")]
    pub min_citations: usize,
}

fn default_min_body_chars() -> usize {
    200
}

fn default_min_citations() -> usize {
    1
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_body_chars: default_min_body_chars(),
            min_citations: default_min_citations(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}
