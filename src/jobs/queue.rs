//! Bounded in-process job queue.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::correlation::CorrelationSnapshot;
use crate::observability::metrics;

/// Work a job performs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    /// GET `path` on the named downstream client.
    CallDownstream { client: String, path: String },
}

/// A unit of background work and the correlation it was started under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub correlation: CorrelationSnapshot,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("job queue is full")]
    Full,

    #[error("job queue is closed")]
    Closed,
}

/// Producer side of the queue. Cheap to clone.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<Job>,
}

/// Consumer side, shared by all workers.
#[derive(Clone)]
pub struct JobReceiver {
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
}

impl JobQueue {
    pub fn new(capacity: usize) -> (Self, JobReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self { tx },
            JobReceiver {
                rx: Arc::new(Mutex::new(rx)),
            },
        )
    }

    /// Queue a job without waiting for space.
    ///
    /// The snapshot is owned by the job, so the job keeps its ids after the
    /// enqueuing request has completed.
    pub fn enqueue(
        &self,
        kind: JobKind,
        correlation: CorrelationSnapshot,
    ) -> Result<Uuid, EnqueueError> {
        let job = Job {
            id: Uuid::new_v4(),
            kind,
            correlation,
            enqueued_at: Utc::now(),
        };
        let id = job.id;

        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })?;

        metrics::record_job_enqueued();
        tracing::debug!(job_id = %id, "Job enqueued");
        Ok(id)
    }
}

impl JobReceiver {
    /// Next job, or `None` once every producer is gone.
    pub async fn recv(&self) -> Option<Job> {
        self.rx.lock().await.recv().await
    }
}
