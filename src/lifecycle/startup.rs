//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the log stores and the buffered sink
//! - Build downstream clients and start job workers
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Must run inside the Tokio runtime (spawns the sink writer and workers)

use std::path::Path;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::downstream::{DownstreamClients, DownstreamError};
use crate::jobs::{spawn_workers, JobQueue};
use crate::lifecycle::shutdown::Shutdown;
use crate::observability::{
    BufferedSink, ColumnLayout, Enrichers, JsonLinesStore, LogStore, MemoryLogStore, StoreError,
};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("log store: {0}")]
    Store(#[from] StoreError),

    #[error("downstream clients: {0}")]
    Downstream(#[from] DownstreamError),

    #[error("invalid sink minimum level '{0}'")]
    SinkLevel(String),
}

/// Long-lived handles shared by the server, workers and `main`.
pub struct Services {
    pub sink: BufferedSink,
    pub sink_task: JoinHandle<()>,
    pub log_store: MemoryLogStore,
    pub clients: DownstreamClients,
    pub jobs: JobQueue,
    pub workers: Vec<JoinHandle<()>>,
}

/// Build every service the server depends on.
pub fn build_services(config: &AppConfig, shutdown: &Shutdown) -> Result<Services, StartupError> {
    let layout = ColumnLayout::standard();
    let log_store = MemoryLogStore::new(config.sink.memory_rows, layout.clone());

    let mut stores: Vec<Arc<dyn LogStore>> = vec![Arc::new(log_store.clone())];
    if let Some(path) = &config.sink.file_path {
        let file_store = JsonLinesStore::open(Path::new(path), layout)?;
        stores.push(Arc::new(file_store));
    }

    let enrichers = Enrichers::new()
        .with("Application", config.observability.application.as_str())
        .with("Environment", config.observability.environment.as_str())
        .with("MachineName", config.observability.machine_name());
    let (sink, sink_task) = BufferedSink::spawn(&config.sink, stores, enrichers);

    let clients = DownstreamClients::from_config(&config.downstream)?;

    let (jobs, receiver) = JobQueue::new(config.jobs.queue_capacity);
    let workers = spawn_workers(config.jobs.workers, receiver, clients.clone(), shutdown);

    Ok(Services {
        sink,
        sink_task,
        log_store,
        clients,
        jobs,
        workers,
    })
}

/// Minimum level of application events forwarded to the sink.
pub fn sink_level(config: &AppConfig) -> Result<tracing::Level, StartupError> {
    config
        .sink
        .minimum_level
        .parse()
        .map_err(|_| StartupError::SinkLevel(config.sink.minimum_level.clone()))
}
