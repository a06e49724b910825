//! Builder for test configurations.

#![allow(dead_code)]

use reportflow::config::Config;

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Defaults tuned for tests: no review step, immediate redelivery.
    pub fn new() -> Self {
        let mut config = Config::default();
        config.collaborators.delay_ms = 0;
        config.collaborators.review = false;
        config.queue.backoff_base_ms = 0;
        config.queue.poll_interval_ms = 10;
        Self { config }
    }

    pub fn max_running_jobs(mut self, limit: u32) -> Self {
        self.config.admission.max_running_jobs = limit;
        self
    }

    pub fn job_timeout_secs(mut self, secs: u64) -> Self {
        self.config.worker.job_timeout_secs = secs;
        self
    }

    pub fn min_evidence_items(mut self, count: u32) -> Self {
        self.config.pipeline.min_evidence_items = count;
        self
    }

    pub fn max_deliveries(mut self, count: u32) -> Self {
        self.config.queue.max_deliveries = count;
        self
    }

    pub fn events_limit(mut self, limit: u32) -> Self {
        self.config.pipeline.events_limit = limit;
        self
    }

    pub fn review(mut self, enabled: bool) -> Self {
        self.config.collaborators.review = enabled;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
