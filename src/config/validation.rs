//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (capacities > 0, timeouts > 0)
//! - Check downstream clients (unique names, absolute http(s) URLs)

use std::collections::HashSet;
use std::fmt;

use crate::config::schema::AppConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration, collecting every error found.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            "must be a socket address like 0.0.0.0:8080",
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.request_log.max_body_bytes == 0 {
        errors.push(ValidationError::new(
            "request_log.max_body_bytes",
            "must be greater than 0",
        ));
    }

    if config.sink.buffer_capacity == 0 {
        errors.push(ValidationError::new("sink.buffer_capacity", "must be greater than 0"));
    }
    if config.sink.batch_size == 0 {
        errors.push(ValidationError::new("sink.batch_size", "must be greater than 0"));
    }
    if config.sink.flush_interval_ms == 0 {
        errors.push(ValidationError::new("sink.flush_interval_ms", "must be greater than 0"));
    }
    if config.sink.memory_rows == 0 {
        errors.push(ValidationError::new("sink.memory_rows", "must be greater than 0"));
    }
    if config.sink.minimum_level.parse::<tracing::Level>().is_err() {
        errors.push(ValidationError::new(
            "sink.minimum_level",
            "must be one of trace, debug, info, warn, error",
        ));
    }

    if config.log_ui.route_prefix.trim_matches('/').is_empty() {
        errors.push(ValidationError::new("log_ui.route_prefix", "must not be empty"));
    }

    if config.jobs.queue_capacity == 0 {
        errors.push(ValidationError::new("jobs.queue_capacity", "must be greater than 0"));
    }
    if config.jobs.workers == 0 {
        errors.push(ValidationError::new("jobs.workers", "must be greater than 0"));
    }

    let mut seen = HashSet::new();
    for (i, client) in config.downstream.iter().enumerate() {
        let field = format!("downstream[{}]", i);
        if client.name.is_empty() {
            errors.push(ValidationError::new(format!("{}.name", field), "must not be empty"));
        } else if !seen.insert(client.name.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.name", field),
                format!("duplicate client name '{}'", client.name),
            ));
        }

        match url::Url::parse(&client.base_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            _ => errors.push(ValidationError::new(
                format!("{}.base_url", field),
                "must be an absolute http(s) URL",
            )),
        }

        if client.timeout_secs == 0 {
            errors.push(ValidationError::new(
                format!("{}.timeout_secs", field),
                "must be greater than 0",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
