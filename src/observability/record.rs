//! Structured log records handed to the sink.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::observability::trace::TraceContext;

/// Severity of a sink record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LogLevel {
    Verbose,
    Debug,
    Information,
    Warning,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Verbose => "Verbose",
            LogLevel::Debug => "Debug",
            LogLevel::Information => "Information",
            LogLevel::Warning => "Warning",
            LogLevel::Error => "Error",
            LogLevel::Fatal => "Fatal",
        }
    }

    /// Numeric level stored in the `Level` column.
    pub fn ordinal(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&tracing::Level> for LogLevel {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE => LogLevel::Verbose,
            tracing::Level::DEBUG => LogLevel::Debug,
            tracing::Level::INFO => LogLevel::Information,
            tracing::Level::WARN => LogLevel::Warning,
            tracing::Level::ERROR => LogLevel::Error,
        }
    }
}

/// Error returned when a level name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level '{0}'")]
pub struct UnknownLevel(pub String);

impl FromStr for LogLevel {
    type Err = UnknownLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "verbose" | "trace" => Ok(LogLevel::Verbose),
            "debug" => Ok(LogLevel::Debug),
            "information" | "info" => Ok(LogLevel::Information),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            "fatal" => Ok(LogLevel::Fatal),
            _ => Err(UnknownLevel(s.to_string())),
        }
    }
}

/// One structured log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message_template: String,
    /// Template rendered against `properties`.
    pub message: String,
    pub exception: Option<String>,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub properties: BTreeMap<String, Value>,
}

impl LogRecord {
    /// Create a record timestamped now. The message is the template until
    /// [`LogRecord::render`] is called.
    pub fn new(level: LogLevel, template: impl Into<String>) -> Self {
        let template = template.into();
        Self {
            timestamp: Utc::now(),
            level,
            message: template.clone(),
            message_template: template,
            exception: None,
            trace_id: None,
            span_id: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Insert a property only if it is not already set.
    pub fn enrich(&mut self, name: &str, value: &Value) {
        if !self.properties.contains_key(name) {
            self.properties.insert(name.to_string(), value.clone());
        }
    }

    pub fn with_trace(mut self, trace: Option<&TraceContext>) -> Self {
        if let Some(t) = trace {
            self.trace_id = Some(t.trace_id.to_string());
            self.span_id = Some(t.span_id.to_string());
        }
        self
    }

    pub fn with_exception(mut self, exception: impl Into<String>) -> Self {
        self.exception = Some(exception.into());
        self
    }

    /// Replace `{Name}` / `{@Name}` holes in the template with property values.
    pub fn render(mut self) -> Self {
        self.message = render_template(&self.message_template, &self.properties);
        self
    }

    /// A property rendered as text: strings verbatim, everything else as JSON.
    pub fn property_text(&self, name: &str) -> Option<String> {
        self.properties.get(name).map(value_text)
    }
}

pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render a message template. Unknown holes are left as written; `{{` and
/// `}}` are literal braces.
pub fn render_template(template: &str, properties: &BTreeMap<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('}') {
            out.push('}');
            rest = &tail[1..];
            continue;
        }

        match tail.find('}') {
            Some(end) => {
                let hole = &tail[1..end];
                let name = hole.trim_start_matches(['@', '$']);
                match properties.get(name) {
                    Some(value) => out.push_str(&value_text(value)),
                    None => out.push_str(&tail[..=end]),
                }
                rest = &tail[end + 1..];
            }
            None => {
                out.push_str(tail);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
