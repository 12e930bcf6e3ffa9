//! Background jobs.
//!
//! # Data Flow
//! ```text
//! handler
//!     → RequestCorrelation::outgoing() (owned snapshot)
//!     → queue.rs (bounded mpsc, rejects when full)
//!     → worker.rs (rebuilds the correlation scope from the snapshot)
//!     → downstream call / logs
//! ```

pub mod queue;
pub mod worker;

pub use queue::{EnqueueError, Job, JobKind, JobQueue, JobReceiver};
pub use worker::{run_job, spawn_workers};
