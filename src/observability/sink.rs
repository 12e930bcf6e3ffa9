//! Buffered, fire-and-forget log sink.
//!
//! # Data Flow
//! ```text
//! request path / tracing layer
//!     → BufferedSink::write (try_send, never blocks)
//!     → bounded channel
//!     → background writer (batches by size or interval)
//!     → every LogStore
//! ```
//!
//! # Design Decisions
//! - A full or closed channel drops the record and counts it
//! - Store failures are reported on the console only
//! - Enricher properties are added on write, never overriding the caller's

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::SinkConfig;
use crate::observability::metrics;
use crate::observability::record::LogRecord;
use crate::observability::store::LogStore;

/// Target of the sink's own console diagnostics. Never forwarded to the sink.
pub const INTERNAL_TARGET: &str = "traces_and_logs::sink";

/// Capability to persist one structured record.
///
/// Implementations must not block and must not fail the caller.
pub trait LogSink: Send + Sync {
    fn write(&self, record: LogRecord);
}

/// Shared handle to a sink.
pub type SharedSink = Arc<dyn LogSink>;

/// Static properties attached to every record.
#[derive(Debug, Clone, Default)]
pub struct Enrichers {
    properties: BTreeMap<String, Value>,
}

impl Enrichers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    fn apply(&self, record: &mut LogRecord) {
        for (name, value) in &self.properties {
            record.enrich(name, value);
        }
    }
}

enum Command {
    Record(Box<LogRecord>),
    Flush(oneshot::Sender<()>),
}

/// Counters for a sink instance.
#[derive(Debug, Default)]
pub struct SinkStats {
    accepted: AtomicU64,
    dropped: AtomicU64,
}

impl SinkStats {
    /// Records queued for the writer.
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Records discarded because the buffer was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Sink that queues records for a background writer.
#[derive(Clone)]
pub struct BufferedSink {
    tx: mpsc::Sender<Command>,
    enrichers: Arc<Enrichers>,
    stats: Arc<SinkStats>,
}

impl BufferedSink {
    /// Spawn the background writer and return the sink handle.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(
        config: &SinkConfig,
        stores: Vec<Arc<dyn LogStore>>,
        enrichers: Enrichers,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.buffer_capacity.max(1));
        let writer = Writer {
            rx,
            stores,
            batch_size: config.batch_size.max(1),
            flush_interval: Duration::from_millis(config.flush_interval_ms.max(1)),
        };
        let handle = tokio::spawn(writer.run());

        let sink = Self {
            tx,
            enrichers: Arc::new(enrichers),
            stats: Arc::new(SinkStats::default()),
        };
        (sink, handle)
    }

    pub fn stats(&self) -> &SinkStats {
        &self.stats
    }

    /// Wait until everything written before this call reached the stores.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }

    pub fn shared(&self) -> SharedSink {
        Arc::new(self.clone())
    }
}

impl LogSink for BufferedSink {
    fn write(&self, mut record: LogRecord) {
        self.enrichers.apply(&mut record);

        match self.tx.try_send(Command::Record(Box::new(record))) {
            Ok(()) => {
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                let dropped = self.stats.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                metrics::record_sink_dropped();
                let reason = match e {
                    mpsc::error::TrySendError::Full(_) => "buffer full",
                    mpsc::error::TrySendError::Closed(_) => "writer stopped",
                };
                // First drop and every 1000th after that.
                if dropped == 1 || dropped % 1000 == 0 {
                    tracing::warn!(
                        target: INTERNAL_TARGET,
                        dropped,
                        reason,
                        "Log sink dropping records"
                    );
                }
            }
        }
    }
}

struct Writer {
    rx: mpsc::Receiver<Command>,
    stores: Vec<Arc<dyn LogStore>>,
    batch_size: usize,
    flush_interval: Duration,
}

impl Writer {
    async fn run(mut self) {
        let mut batch: Vec<LogRecord> = Vec::with_capacity(self.batch_size);
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = self.rx.recv() => match cmd {
                    Some(Command::Record(record)) => {
                        batch.push(*record);
                        if batch.len() >= self.batch_size {
                            self.flush_batch(&mut batch);
                        }
                    }
                    Some(Command::Flush(ack)) => {
                        self.flush_batch(&mut batch);
                        let _ = ack.send(());
                    }
                    None => {
                        self.flush_batch(&mut batch);
                        break;
                    }
                },
                _ = ticker.tick() => {
                    self.flush_batch(&mut batch);
                }
            }
        }

        tracing::debug!(target: INTERNAL_TARGET, "Log sink writer stopped");
    }

    fn flush_batch(&self, batch: &mut Vec<LogRecord>) {
        if batch.is_empty() {
            return;
        }
        for store in &self.stores {
            if let Err(e) = store.store(batch) {
                metrics::record_store_error(store.name());
                tracing::error!(
                    target: INTERNAL_TARGET,
                    store = store.name(),
                    error = %e,
                    records = batch.len(),
                    "Log store write failed"
                );
            }
        }
        metrics::record_sink_written(batch.len());
        batch.clear();
    }
}
