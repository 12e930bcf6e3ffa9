//! Inbound request recording.
//!
//! # Responsibilities
//! - Snapshot path, query, method, headers and body of each request
//! - Hand one structured entry per request to the log sink
//! - Give the handler the same body bytes the recorder read
//!
//! # Design Decisions
//! - Body is buffered fully, bounded by `request_log.max_body_bytes`
//! - A body that cannot be captured is recorded as absent and passed on
//!   unchanged, so the handler sees the same bytes and the same error
//! - Paths under the log viewer prefix are never recorded

use std::collections::BTreeMap;

use axum::{
    body::{Body, Bytes},
    http::{request::Parts, Request},
    BoxError,
};
use chrono::{DateTime, Utc};
use futures_util::{future, stream, StreamExt, TryStreamExt};
use serde::Serialize;

use crate::correlation::{CorrelationId, RequestCorrelation};
use crate::observability::metrics;
use crate::observability::record::{LogLevel, LogRecord};
use crate::observability::sink::SharedSink;

/// Message template of request entries.
pub const REQUEST_LOG_TEMPLATE: &str = "Request: {@RequestLog}";

/// Immutable snapshot of one inbound request.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct RequestLogRecord {
    pub path: String,
    /// Raw query with its leading `?`, or empty.
    pub query_string: String,
    pub method: String,
    /// One entry per header name; repeated values joined with `,`.
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: CorrelationId,
}

impl RequestLogRecord {
    pub fn capture(parts: &Parts, body: Option<String>, correlation_id: CorrelationId) -> Self {
        let mut headers = BTreeMap::new();
        for name in parts.headers.keys() {
            let joined = parts
                .headers
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .collect::<Vec<_>>()
                .join(",");
            headers.insert(name.as_str().to_string(), joined);
        }

        Self {
            path: parts.uri.path().to_string(),
            query_string: parts
                .uri
                .query()
                .map(|q| format!("?{}", q))
                .unwrap_or_default(),
            method: parts.method.to_string(),
            headers,
            body,
            timestamp: Utc::now(),
            correlation_id,
        }
    }
}

/// Builds a [`RequestLogRecord`] per request and writes it to the sink.
#[derive(Clone)]
pub struct RequestLogRecorder {
    sink: SharedSink,
    excluded_prefix: String,
    max_body_bytes: usize,
}

impl RequestLogRecorder {
    pub fn new(sink: SharedSink, excluded_prefix: &str, max_body_bytes: usize) -> Self {
        Self {
            sink,
            excluded_prefix: excluded_prefix.trim_matches('/').to_lowercase(),
            max_body_bytes,
        }
    }

    /// True for paths containing the log viewer prefix (case-insensitive).
    pub fn is_excluded(&self, path: &str) -> bool {
        !self.excluded_prefix.is_empty() && path.to_lowercase().contains(&self.excluded_prefix)
    }

    /// Record the request and return it with an identical, unread body.
    pub async fn record(
        &self,
        request: Request<Body>,
        correlation: &RequestCorrelation,
    ) -> Request<Body> {
        let (parts, body) = request.into_parts();

        let (captured, body) = buffer_body(body, self.max_body_bytes).await;
        let text = match captured {
            Ok(bytes) => (!bytes.is_empty()).then(|| String::from_utf8_lossy(&bytes).into_owned()),
            Err(reason) => {
                tracing::warn!(
                    reason,
                    path = %parts.uri.path(),
                    "Request body not captured, recording without it"
                );
                None
            }
        };

        let record = RequestLogRecord::capture(&parts, text, correlation.correlation_id.clone());
        self.emit(&record, correlation);

        Request::from_parts(parts, body)
    }

    fn emit(&self, record: &RequestLogRecord, correlation: &RequestCorrelation) {
        let payload = match serde_json::to_value(record) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize request log record");
                return;
            }
        };

        let mut entry = LogRecord::new(LogLevel::Information, REQUEST_LOG_TEMPLATE)
            .with_property("RequestLog", payload)
            .with_property("CorrelationId", record.correlation_id.as_str())
            .with_trace(correlation.trace.as_ref());
        entry.timestamp = record.timestamp;
        if let Some(parent) = &correlation.parent_request_id {
            entry = entry.with_property("ParentRequestId", parent.as_str());
        }
        if let Some(request_id) = &correlation.request_id {
            entry = entry.with_property("RequestId", request_id.as_str());
        }

        self.sink.write(entry.render());
        metrics::record_request_logged(&record.method);
    }
}

/// Read up to `limit` bytes of `body`.
///
/// Returns the captured bytes (or why capture stopped) and a body that
/// yields exactly what the client sent. When capture stops early, the
/// chunks already read are replayed ahead of the unread remainder, so an
/// oversized or broken body reaches the handler with its original error.
async fn buffer_body(body: Body, limit: usize) -> (Result<Bytes, &'static str>, Body) {
    let mut data = body.into_data_stream();
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut len = 0usize;

    loop {
        match data.next().await {
            None => {
                let bytes = Bytes::from(chunks.concat());
                return (Ok(bytes.clone()), Body::from(bytes));
            }
            Some(Ok(chunk)) => {
                len += chunk.len();
                chunks.push(chunk);
                if len > limit {
                    let replay = stream::iter(chunks.into_iter().map(Ok::<_, BoxError>));
                    let rest = data.map_err(axum::Error::into_inner);
                    return (Err("body exceeds limit"), Body::from_stream(replay.chain(rest)));
                }
            }
            Some(Err(e)) => {
                let replay = stream::iter(chunks.into_iter().map(Ok::<_, BoxError>));
                let failed = stream::once(future::ready(Err(e.into_inner())));
                return (Err("body read failed"), Body::from_stream(replay.chain(failed)));
            }
        }
    }
}
