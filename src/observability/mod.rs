//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request:
//!     → trace.rs (server span, traceparent, tags)
//!
//! All subsystems produce:
//!     → tracing events → layer.rs (SinkLayer) ─┐
//!     → request log entries (http::request) ───┴→ sink.rs (BufferedSink)
//!                                                  → store.rs (memory table, JSON lines)
//!                                                    rows shaped by columns.rs
//!     → metrics.rs (counters)
//!
//! Consumers:
//!     → Console (logging.rs, pretty or JSON)
//!     → Log viewer API (log_ui)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Correlation id flows through all records via the ambient request scope
//! - Sink writes never block the request path
//! - Metrics are cheap (atomic increments)

pub mod columns;
pub mod layer;
pub mod logging;
pub mod metrics;
pub mod record;
pub mod sink;
pub mod store;
pub mod trace;

pub use columns::ColumnLayout;
pub use layer::SinkLayer;
pub use record::{LogLevel, LogRecord};
pub use sink::{BufferedSink, Enrichers, LogSink, SharedSink};
pub use store::{JsonLinesStore, LogFilter, LogRow, LogStore, MemoryLogStore, StoreError};
pub use trace::{ActiveSpan, TraceContext};
