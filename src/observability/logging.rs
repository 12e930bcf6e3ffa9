//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global subscriber
//! - Console output, human-readable or JSON
//! - Forward events to the log sink
//!
//! # Design Decisions
//! - `RUST_LOG` overrides the configured level
//! - The sink layer applies its own minimum level on top of the filter

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;
use crate::observability::layer::SinkLayer;

/// Install the global subscriber: env filter, console layer and sink layer.
pub fn init_logging(
    config: &ObservabilityConfig,
    sink_layer: SinkLayer,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("traces_and_logs={level},tower_http={level}", level = config.log_level).into()
    });

    let json = config.json.then(|| tracing_subscriber::fmt::layer().json());
    let pretty = (!config.json).then(|| tracing_subscriber::fmt::layer());

    tracing_subscriber::registry()
        .with(sink_layer)
        .with(filter)
        .with(json)
        .with(pretty)
        .try_init()
}
