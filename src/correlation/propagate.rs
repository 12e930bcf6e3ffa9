//! Outbound propagation of correlation headers.
//!
//! Uses the same header names as ingress so propagation is transitive across
//! any number of hops. Headers are the only carrier between processes.

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::correlation::context::{
    CorrelationId, CorrelationSnapshot, ParentRequestId, CORRELATION_ID_HEADER,
    PARENT_REQUEST_ID_HEADER,
};

/// Set `x-correlation-id` and `x-parent-request-id` on outgoing headers.
///
/// Absent ids are skipped, as are ids that are not valid header values.
pub fn attach(
    headers: &mut HeaderMap,
    correlation_id: Option<&CorrelationId>,
    parent_request_id: Option<&ParentRequestId>,
) {
    if let Some(id) = correlation_id {
        insert(headers, CORRELATION_ID_HEADER, id.as_str());
    }
    if let Some(id) = parent_request_id {
        insert(headers, PARENT_REQUEST_ID_HEADER, id.as_str());
    }
}

fn insert(headers: &mut HeaderMap, name: &'static str, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(v) => {
            headers.insert(HeaderName::from_static(name), v);
        }
        Err(_) => {
            tracing::debug!(header = name, "Skipping id that is not a valid header value");
        }
    }
}

impl CorrelationSnapshot {
    /// Apply this snapshot to outgoing headers.
    pub fn apply(&self, headers: &mut HeaderMap) {
        attach(
            headers,
            self.correlation_id.as_ref(),
            self.parent_request_id.as_ref(),
        );
    }

    /// Snapshot as a standalone header map.
    pub fn to_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        self.apply(&mut headers);
        headers
    }
}

/// Propagation for `reqwest` request builders.
pub trait PropagateCorrelation {
    fn with_correlation(self, snapshot: &CorrelationSnapshot) -> Self;
}

impl PropagateCorrelation for reqwest::RequestBuilder {
    fn with_correlation(self, snapshot: &CorrelationSnapshot) -> Self {
        self.headers(snapshot.to_headers())
    }
}
