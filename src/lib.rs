//! Request correlation, structured request logging and trace tagging for
//! Axum services.
//!
//! Every inbound request gets a correlation id (taken from
//! `x-correlation-id` or generated), is recorded as one structured log
//! entry, and runs inside an ambient correlation scope so that application
//! logs, outbound HTTP calls and background jobs all carry the same id.

pub mod config;
pub mod correlation;
pub mod downstream;
pub mod http;
pub mod jobs;
pub mod lifecycle;
pub mod log_ui;
pub mod observability;

pub use config::AppConfig;
pub use correlation::{CorrelationId, RequestCorrelation};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
