//! Column layout for tabular log stores.
//!
//! A layout is an ordered mapping from column name to a pure extraction
//! function over a [`LogRecord`].

use std::fmt;
use std::sync::Arc;

use crate::observability::record::LogRecord;

/// Extracts one column value from a record.
pub type Extractor = Arc<dyn Fn(&LogRecord) -> Option<String> + Send + Sync>;

pub fn message(record: &LogRecord) -> Option<String> {
    Some(record.message.clone())
}

pub fn message_template(record: &LogRecord) -> Option<String> {
    Some(record.message_template.clone())
}

pub fn level(record: &LogRecord) -> Option<String> {
    Some(record.level.ordinal().to_string())
}

pub fn level_name(record: &LogRecord) -> Option<String> {
    Some(record.level.as_str().to_string())
}

pub fn timestamp(record: &LogRecord) -> Option<String> {
    Some(record.timestamp.to_rfc3339())
}

pub fn exception(record: &LogRecord) -> Option<String> {
    record.exception.clone()
}

pub fn trace_id(record: &LogRecord) -> Option<String> {
    record.trace_id.clone()
}

pub fn span_id(record: &LogRecord) -> Option<String> {
    record.span_id.clone()
}

/// The whole record serialized as JSON.
pub fn log_event(record: &LogRecord) -> Option<String> {
    serde_json::to_string(record).ok()
}

/// A single named property.
pub fn property(name: &'static str) -> impl Fn(&LogRecord) -> Option<String> + Send + Sync {
    move |record| record.property_text(name)
}

/// Ordered set of named columns.
#[derive(Clone, Default)]
pub struct ColumnLayout {
    columns: Vec<(String, Extractor)>,
}

impl ColumnLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column. A later column with the same name replaces the earlier one.
    pub fn column(
        mut self,
        name: impl Into<String>,
        extract: impl Fn(&LogRecord) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        let name = name.into();
        let extract: Extractor = Arc::new(extract);
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = extract,
            None => self.columns.push((name, extract)),
        }
        self
    }

    /// Columns written for every row. `Id` is assigned by the store.
    pub fn standard() -> Self {
        Self::new()
            .column("Message", message)
            .column("MessageTemplate", message_template)
            .column("Level", level)
            .column("LevelName", level_name)
            .column("Timestamp", timestamp)
            .column("Exception", exception)
            .column("LogEvent", log_event)
            .column("SpanId", span_id)
            .column("TraceId", trace_id)
            .column("RequestId", property("RequestId"))
            .column("CorrelationId", property("CorrelationId"))
            .column("MachineName", property("MachineName"))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    /// Extract every column, in layout order.
    pub fn extract(&self, record: &LogRecord) -> Vec<(String, Option<String>)> {
        self.columns
            .iter()
            .map(|(name, f)| (name.clone(), f(record)))
            .collect()
    }
}

impl fmt::Debug for ColumnLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
