use std::net::SocketAddr;
use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}

/// Checks that cannot be expressed in the schema. Also applied to configs
/// built in code.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(invalid(format!(
            "Unsupported config version: {}",
            config.version
        )));
    }

    if config.worker.worker_count == 0 {
        return Err(invalid("worker.worker_count must be at least 1"));
    }
    if config.worker.job_timeout_secs == 0 {
        return Err(invalid("worker.job_timeout_secs must be at least 1"));
    }
    if config.admission.max_running_jobs == 0 {
        return Err(invalid("admission.max_running_jobs must be at least 1"));
    }
    if config.admission.default_owner.trim().is_empty() {
        return Err(invalid("admission.default_owner must not be empty"));
    }
    if config.queue.max_deliveries == 0 {
        return Err(invalid("queue.max_deliveries must be at least 1"));
    }
    if config.queue.poll_interval_ms == 0 {
        return Err(invalid("queue.poll_interval_ms must be at least 1"));
    }
    if config.pipeline.events_limit == 0 {
        return Err(invalid("pipeline.events_limit must be at least 1"));
    }

    // A claim must outlive the run it hands out.
    if config.queue.visibility_timeout_secs < config.worker.job_timeout_secs {
        return Err(invalid(format!(
            "queue.visibility_timeout_secs ({}) must not be shorter than worker.job_timeout_secs ({})",
            config.queue.visibility_timeout_secs, config.worker.job_timeout_secs
        )));
    }

    if config.server.bind.parse::<SocketAddr>().is_err() {
        return Err(invalid(format!(
            "server.bind is not a socket address: {}",
            config.server.bind
        )));
    }

    Ok(())
}
