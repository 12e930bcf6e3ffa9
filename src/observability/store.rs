//! Log stores behind the buffered sink.
//!
//! # Responsibilities
//! - Turn records into rows using a [`ColumnLayout`]
//! - Keep a bounded in-memory table for the log viewer
//! - Append rows to a JSON-lines file
//!
//! # Design Decisions
//! - Stores are synchronous; the sink's background writer calls them off
//!   the request path
//! - Row ids are assigned per store, starting at 1

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::observability::columns::ColumnLayout;
use crate::observability::record::{LogLevel, LogRecord};

/// Error raised by a store while persisting a batch.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Destination for batches of log records.
pub trait LogStore: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &str;

    fn store(&self, batch: &[LogRecord]) -> Result<(), StoreError>;
}

/// One stored row: auto-increment id plus the layout's columns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogRow {
    #[serde(rename = "Id")]
    pub id: u64,
    #[serde(flatten)]
    pub columns: serde_json::Map<String, serde_json::Value>,
}

impl LogRow {
    fn build(id: u64, layout: &ColumnLayout, record: &LogRecord) -> Self {
        let columns = layout
            .extract(record)
            .into_iter()
            .map(|(name, value)| {
                let value = value.map(serde_json::Value::String).unwrap_or(serde_json::Value::Null);
                (name, value)
            })
            .collect();
        Self { id, columns }
    }

    /// Text value of a column, if present and non-null.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns.get(column).and_then(|v| v.as_str())
    }
}

/// Filter applied by [`MemoryLogStore::query`].
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    /// Minimum level.
    pub level: Option<LogLevel>,
    /// Case-insensitive substring of the rendered message.
    pub search: Option<String>,
    /// Exact correlation id.
    pub correlation_id: Option<String>,
    /// Zero-based page.
    pub page: usize,
    /// Page size.
    pub count: usize,
}

/// Bounded in-memory log table. Oldest rows are evicted first.
#[derive(Clone)]
pub struct MemoryLogStore {
    rows: Arc<Mutex<VecDeque<(LogLevel, LogRow)>>>,
    next_id: Arc<AtomicU64>,
    capacity: usize,
    layout: ColumnLayout,
}

impl MemoryLogStore {
    pub fn new(capacity: usize, layout: ColumnLayout) -> Self {
        Self {
            rows: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(1024)))),
            next_id: Arc::new(AtomicU64::new(1)),
            capacity,
            layout,
        }
    }

    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All rows, oldest first.
    pub fn rows(&self) -> Vec<LogRow> {
        self.rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, row)| row.clone())
            .collect()
    }

    /// Matching rows newest first, paged, with the total match count.
    pub fn query(&self, filter: &LogFilter) -> (usize, Vec<LogRow>) {
        let rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        let search = filter.search.as_ref().map(|s| s.to_lowercase());

        let matches: Vec<&LogRow> = rows
            .iter()
            .rev()
            .filter(|(level, _)| filter.level.map_or(true, |min| *level >= min))
            .filter(|(_, row)| {
                filter
                    .correlation_id
                    .as_deref()
                    .map_or(true, |id| row.get("CorrelationId") == Some(id))
            })
            .filter(|(_, row)| {
                search.as_deref().map_or(true, |needle| {
                    row.get("Message")
                        .map_or(false, |m| m.to_lowercase().contains(needle))
                })
            })
            .map(|(_, row)| row)
            .collect();

        let total = matches.len();
        let page = matches
            .into_iter()
            .skip(filter.page.saturating_mul(filter.count))
            .take(filter.count)
            .cloned()
            .collect();
        (total, page)
    }
}

impl LogStore for MemoryLogStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn store(&self, batch: &[LogRecord]) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        for record in batch {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            rows.push_back((record.level, LogRow::build(id, &self.layout, record)));
            while rows.len() > self.capacity {
                rows.pop_front();
            }
        }
        Ok(())
    }
}

/// Appends every row as one JSON object per line.
pub struct JsonLinesStore {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
    next_id: AtomicU64,
    layout: ColumnLayout,
}

impl JsonLinesStore {
    /// Open (or create) the file in append mode.
    pub fn open(path: &Path, layout: ColumnLayout) -> Result<Self, StoreError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::new(file)),
            next_id: AtomicU64::new(1),
            layout,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogStore for JsonLinesStore {
    fn name(&self) -> &str {
        "file"
    }

    fn store(&self, batch: &[LogRecord]) -> Result<(), StoreError> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        for record in batch {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            serde_json::to_writer(&mut *writer, &LogRow::build(id, &self.layout, record))?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(level: LogLevel, message: &str, correlation: &str) -> LogRecord {
        LogRecord::new(level, message).with_property("CorrelationId", correlation)
    }

    #[test]
    fn test_rows_get_increasing_ids() {
        let store = MemoryLogStore::new(10, ColumnLayout::standard());
        store
            .store(&[
                record(LogLevel::Information, "a", "c1"),
                record(LogLevel::Information, "b", "c1"),
            ])
            .unwrap();

        let ids: Vec<_> = store.rows().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(store.rows()[0].get("CorrelationId"), Some("c1"));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let store = MemoryLogStore::new(2, ColumnLayout::standard());
        for m in ["one", "two", "three"] {
            store.store(&[record(LogLevel::Information, m, "c")]).unwrap();
        }

        let messages: Vec<_> = store
            .rows()
            .iter()
            .map(|r| r.get("Message").unwrap().to_string())
            .collect();
        assert_eq!(messages, vec!["two", "three"]);
    }

    #[test]
    fn test_query_filters_and_pages_newest_first() {
        let store = MemoryLogStore::new(100, ColumnLayout::standard());
        store
            .store(&[
                record(LogLevel::Debug, "debug noise", "c1"),
                record(LogLevel::Information, "Calling api2", "c1"),
                record(LogLevel::Error, "cmdFail", "c2"),
                record(LogLevel::Warning, "calling again", "c1"),
            ])
            .unwrap();

        let (total, rows) = store.query(&LogFilter {
            level: Some(LogLevel::Information),
            search: Some("CALLING".into()),
            correlation_id: Some("c1".into()),
            page: 0,
            count: 10,
        });
        assert_eq!(total, 2);
        assert_eq!(rows[0].get("Message"), Some("calling again"));
        assert_eq!(rows[1].get("Message"), Some("Calling api2"));

        let (total, rows) = store.query(&LogFilter {
            page: 1,
            count: 3,
            ..LogFilter::default()
        });
        assert_eq!(total, 4);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("Message"), Some("debug noise"));
    }

    #[test]
    fn test_json_lines_store_appends() {
        let path = std::env::temp_dir().join(format!("tal-store-{}.jsonl", uuid::Uuid::new_v4()));
        let store = JsonLinesStore::open(&path, ColumnLayout::standard()).unwrap();
        store
            .store(&[
                record(LogLevel::Information, "first", "c"),
                record(LogLevel::Error, "second", "c"),
            ])
            .unwrap();

        let content = std::fs::read_to_string(store.path()).unwrap();
        let rows: Vec<LogRow> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].id, 2);
        assert_eq!(rows[1].get("LevelName"), Some("Error"));

        let _ = std::fs::remove_file(&path);
    }
}
