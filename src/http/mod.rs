//! HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layer stack)
//!     → trace span + correlation middleware
//!     → request.rs (record the request, rewind the body)
//!     → handlers.rs (demo endpoints) / log_ui (viewer API)
//! ```

pub mod handlers;
pub mod request;
pub mod server;

pub use handlers::AppState;
pub use request::{RequestLogRecord, RequestLogRecorder};
pub use server::HttpServer;
