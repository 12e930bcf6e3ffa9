//! Correlation propagation middleware.
//!
//! Per request, in order:
//! 1. resolve correlation id and parent request id from headers
//! 2. tag the active trace span (if any) with the correlation id
//! 3. record the request through [`RequestLogRecorder`]
//! 4. run the rest of the pipeline inside the ambient correlation scope
//!
//! Requests under the log viewer prefix skip all of it.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};

use crate::correlation::context::{RequestCorrelation, CORRELATION_ID_HEADER};
use crate::http::request::RequestLogRecorder;
use crate::observability::metrics;
use crate::observability::trace::ActiveSpan;

/// Span tag carrying the correlation id.
pub const CORRELATION_TAG: &str = "CorrelationId";

/// Span field mirroring [`CORRELATION_TAG`] on the `tracing` span.
pub const CORRELATION_FIELD: &str = "correlation_id";

/// Span field carrying the parent request id.
pub const PARENT_REQUEST_FIELD: &str = "parent_request_id";

/// State for [`correlation_middleware`].
#[derive(Clone)]
pub struct CorrelationState {
    recorder: RequestLogRecorder,
    record_requests: bool,
}

impl CorrelationState {
    pub fn new(recorder: RequestLogRecorder, record_requests: bool) -> Self {
        Self {
            recorder,
            record_requests,
        }
    }
}

pub async fn correlation_middleware(
    State(state): State<CorrelationState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if state.recorder.is_excluded(request.uri().path()) {
        metrics::record_request_skipped();
        return next.run(request).await;
    }

    let mut correlation = RequestCorrelation::from_headers(request.headers());

    if let Some(span) = request.extensions().get::<ActiveSpan>() {
        correlation.trace = Some(*span.context());
        span.set_tag(CORRELATION_TAG, correlation.correlation_id.as_str());
        span.record_field(CORRELATION_FIELD, correlation.correlation_id.as_str());
        if let Some(parent) = &correlation.parent_request_id {
            span.record_field(PARENT_REQUEST_FIELD, parent.as_str());
        }
    }

    request.extensions_mut().insert(correlation.clone());

    let request = if state.record_requests {
        state.recorder.record(request, &correlation).await
    } else {
        request
    };

    let header = HeaderValue::from_str(correlation.correlation_id.as_str()).ok();
    let mut response = correlation.scope(next.run(request)).await;

    if let Some(value) = header {
        response
            .headers_mut()
            .insert(HeaderName::from_static(CORRELATION_ID_HEADER), value);
    }
    response
}
