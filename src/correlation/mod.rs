//! Request correlation subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request headers
//!     → context.rs (resolve correlation id / parent request id)
//!     → middleware.rs (tag span, record request, ambient scope)
//!     → handler reads RequestCorrelation (extractor or task-local)
//!     → propagate.rs (x-correlation-id / x-parent-request-id on outbound
//!       calls and background jobs)
//! ```
//!
//! # Design Decisions
//! - Correlation id identifies the whole chain; parent request id only the
//!   immediate caller
//! - Ambient state is a task-local scoped to one request, never a global
//! - Background work gets an owned snapshot taken at enqueue time

pub mod context;
pub mod middleware;
pub mod propagate;

pub use context::{
    resolve, resolve_parent, CorrelationId, CorrelationSnapshot, ParentRequestId,
    RequestCorrelation, CORRELATION_ID_HEADER, PARENT_REQUEST_ID_HEADER,
};
pub use middleware::{correlation_middleware, CorrelationState};
pub use propagate::{attach, PropagateCorrelation};
