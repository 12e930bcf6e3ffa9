//! Job workers.
//!
//! Each worker pulls from the shared [`JobReceiver`] and runs the job inside
//! a correlation scope rebuilt from the job's snapshot. Failures are logged
//! and counted, never retried.

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::correlation::RequestCorrelation;
use crate::downstream::DownstreamClients;
use crate::jobs::queue::{Job, JobKind, JobReceiver};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

/// Spawn `count` workers. They stop on shutdown or when the queue closes.
pub fn spawn_workers(
    count: usize,
    receiver: JobReceiver,
    clients: DownstreamClients,
    shutdown: &Shutdown,
) -> Vec<JoinHandle<()>> {
    (0..count.max(1))
        .map(|worker| {
            let receiver = receiver.clone();
            let clients = clients.clone();
            let shutdown_rx = shutdown.subscribe();
            tokio::spawn(worker_loop(worker, receiver, clients, shutdown_rx))
        })
        .collect()
}

async fn worker_loop(
    worker: usize,
    receiver: JobReceiver,
    clients: DownstreamClients,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    tracing::debug!(worker, "Job worker started");

    loop {
        let job = tokio::select! {
            _ = shutdown_rx.recv() => break,
            job = receiver.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };
        run_job(job, &clients).await;
    }

    tracing::debug!(worker, "Job worker stopped");
}

/// Run one job under the correlation it was enqueued with.
pub async fn run_job(job: Job, clients: &DownstreamClients) {
    let correlation = RequestCorrelation::from_snapshot(&job.correlation);
    let span = tracing::info_span!(
        "job",
        job_id = %job.id,
        correlation_id = %correlation.correlation_id,
    );

    correlation
        .scope(execute(job, clients).instrument(span))
        .await;
}

async fn execute(job: Job, clients: &DownstreamClients) {
    let outgoing = RequestCorrelation::with_current(RequestCorrelation::outgoing).unwrap_or_default();
    let waited_ms = (chrono::Utc::now() - job.enqueued_at).num_milliseconds();

    match job.kind {
        JobKind::CallDownstream { client, path } => {
            tracing::info!(job_id = %job.id, client = %client, waited_ms, "Job started");

            match clients.get(&client, &path, &outgoing, None).await {
                Ok(response) if response.is_success() => {
                    metrics::record_job_completed("success");
                    tracing::info!(job_id = %job.id, status = response.status, "Job completed");
                }
                Ok(response) => {
                    metrics::record_job_completed("failure");
                    tracing::warn!(job_id = %job.id, status = response.status, "Job got non-success response");
                }
                Err(e) => {
                    metrics::record_job_completed("error");
                    tracing::error!(job_id = %job.id, error = %e, "Job failed");
                }
            }
        }
    }
}
