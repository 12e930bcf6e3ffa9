//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Console logging, enrichers and metrics.
    pub observability: ObservabilityConfig,

    /// Per-request trace span settings.
    pub tracing: TracingConfig,

    /// Inbound request recording.
    pub request_log: RequestLogConfig,

    /// Buffered log sink and its stores.
    pub sink: SinkConfig,

    /// Log viewer mounted under the excluded route prefix.
    pub log_ui: LogUiConfig,

    /// Background job queue.
    pub jobs: JobsConfig,

    /// Demo endpoint behaviour.
    pub demo: DemoConfig,

    /// Named downstream HTTP clients.
    pub downstream: Vec<DownstreamConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration for inbound requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit console logs as JSON instead of the human-readable format.
    pub json: bool,

    /// `Application` property attached to every sink record.
    pub application: String,

    /// `Environment` property attached to every sink record.
    pub environment: String,

    /// `MachineName` property. Falls back to `$HOSTNAME` when unset.
    pub machine_name: Option<String>,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
            application: "traces-and-logs".to_string(),
            environment: "Development".to_string(),
            machine_name: None,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

impl ObservabilityConfig {
    /// Resolved machine name for the `MachineName` enricher.
    pub fn machine_name(&self) -> String {
        self.machine_name
            .clone()
            .or_else(|| std::env::var("HOSTNAME").ok())
            .or_else(|| std::env::var("COMPUTERNAME").ok())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Trace span configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Open a server span per request. When false no span is active and
    /// correlation tags are skipped.
    pub enabled: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Inbound request recording configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RequestLogConfig {
    /// Record one structured entry per inbound request.
    pub enabled: bool,

    /// Largest body captured in memory, in bytes. Also the inbound body limit.
    pub max_body_bytes: usize,
}

impl Default for RequestLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Buffered sink configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Bounded channel capacity between writers and the background flusher.
    pub buffer_capacity: usize,

    /// Maximum records handed to the stores in one batch.
    pub batch_size: usize,

    /// Flush interval for partially filled batches, in milliseconds.
    pub flush_interval_ms: u64,

    /// Minimum level of application events forwarded to the sink.
    pub minimum_level: String,

    /// Rows kept by the in-memory table backing the log viewer.
    pub memory_rows: usize,

    /// Optional JSON-lines file receiving every row.
    pub file_path: Option<String>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 4096,
            batch_size: 64,
            flush_interval_ms: 500,
            minimum_level: "info".to_string(),
            memory_rows: 10_000,
            file_path: None,
        }
    }
}

/// Log viewer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogUiConfig {
    /// Mount the log viewer API.
    pub enabled: bool,

    /// Route prefix, without slashes. Paths containing it are never recorded.
    pub route_prefix: String,

    /// Basic auth user name.
    pub username: String,

    /// Basic auth password.
    pub password: String,
}

impl Default for LogUiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            route_prefix: "log-ui".to_string(),
            username: "admin".to_string(),
            // WARNING: This is a placeholder! Change this in production.
            password: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}

/// Background job queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Queue capacity; enqueue fails fast when full.
    pub queue_capacity: usize,

    /// Number of worker tasks.
    pub workers: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            workers: 2,
        }
    }
}

/// Demo endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DemoConfig {
    /// One unit of the random 0..=4 delay on `/cmdSuccess` and `/cmdFail`.
    pub delay_unit_ms: u64,

    /// Path requested on downstream services by `/call` and `/enqueue`.
    pub downstream_path: String,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            delay_unit_ms: 1000,
            downstream_path: "WeatherForecast".to_string(),
        }
    }
}

/// A named downstream HTTP client.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownstreamConfig {
    /// Client name used by `/call/{name}` and `/enqueue/{name}`.
    pub name: String,

    /// Base URL (e.g., "http://localhost:5253").
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_downstream_timeout")]
    pub timeout_secs: u64,
}

fn default_downstream_timeout() -> u64 {
    15
}
