//! Distributed tracing support.
//!
//! # Responsibilities
//! - Extract W3C trace context (`traceparent`) from incoming requests
//! - Open one server span per request with fresh span id
//! - Expose the active span to later stages for tagging
//!
//! # Design Decisions
//! - The `tracing` span is the active trace span; tags are recorded on it
//! - Invalid or all-zero `traceparent` values start a new trace
//! - Export is left to whatever subscriber layers are installed

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use axum::{
    body::Body,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;

/// W3C trace context header.
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// 16-byte trace identifier, rendered as 32 lowercase hex chars.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId([u8; 16]);

/// 8-byte span identifier, rendered as 16 lowercase hex chars.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId([u8; 8]);

impl TraceId {
    /// Generate a random, non-zero trace id.
    pub fn random() -> Self {
        loop {
            let bytes: [u8; 16] = rand::random();
            if bytes != [0; 16] {
                return Self(bytes);
            }
        }
    }

    /// Parse 32 hex chars. All-zero ids are invalid.
    pub fn from_hex(s: &str) -> Option<Self> {
        let mut bytes = [0u8; 16];
        decode_hex(s, &mut bytes)?;
        (bytes != [0; 16]).then_some(Self(bytes))
    }
}

impl SpanId {
    /// Generate a random, non-zero span id.
    pub fn random() -> Self {
        loop {
            let bytes: [u8; 8] = rand::random();
            if bytes != [0; 8] {
                return Self(bytes);
            }
        }
    }

    /// Parse 16 hex chars. All-zero ids are invalid.
    pub fn from_hex(s: &str) -> Option<Self> {
        let mut bytes = [0u8; 8];
        decode_hex(s, &mut bytes)?;
        (bytes != [0; 8]).then_some(Self(bytes))
    }
}

/// Two lowercase hex digits.
fn hex_byte(s: &str) -> Option<u8> {
    let mut byte = [0u8; 1];
    decode_hex(s, &mut byte)?;
    Some(byte[0])
}

fn decode_hex(s: &str, out: &mut [u8]) -> Option<()> {
    if s.len() != out.len() * 2 {
        return None;
    }
    for (i, byte) in out.iter_mut().enumerate() {
        let pair = s.get(i * 2..i * 2 + 2)?;
        if !pair.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
            return None;
        }
        *byte = u8::from_str_radix(pair, 16).ok()?;
    }
    Some(())
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    for b in bytes {
        write!(f, "{:02x}", b)?;
    }
    Ok(())
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TraceId({})", self)
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpanId({})", self)
    }
}

/// Identity of one span within a distributed trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceContext {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    /// Remote parent span, when the caller sent a `traceparent`.
    pub parent_span_id: Option<SpanId>,
    pub sampled: bool,
}

impl TraceContext {
    /// Start a new trace.
    pub fn new_root() -> Self {
        Self {
            trace_id: TraceId::random(),
            span_id: SpanId::random(),
            parent_span_id: None,
            sampled: true,
        }
    }

    /// Server-side context for an inbound request: a child of the caller's
    /// span when a valid `traceparent` is present, otherwise a new root.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(TRACEPARENT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_traceparent)
            .map(|remote| remote.child())
            .unwrap_or_else(Self::new_root)
    }

    /// A new span in the same trace, parented on this one.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: SpanId::random(),
            parent_span_id: Some(self.span_id),
            sampled: self.sampled,
        }
    }

    /// Render as a `traceparent` header value.
    pub fn traceparent(&self) -> String {
        format!(
            "00-{}-{}-{}",
            self.trace_id,
            self.span_id,
            if self.sampled { "01" } else { "00" }
        )
    }
}

/// Parse `00-<trace-id>-<span-id>-<flags>`.
pub fn parse_traceparent(value: &str) -> Option<TraceContext> {
    let mut parts = value.trim().split('-');
    let version = hex_byte(parts.next()?)?;
    let trace_id = TraceId::from_hex(parts.next()?)?;
    let span_id = SpanId::from_hex(parts.next()?)?;
    let flags = hex_byte(parts.next()?)?;

    if version == 0xff {
        return None;
    }
    // Version 00 carries exactly four fields.
    if version == 0x00 && parts.next().is_some() {
        return None;
    }

    Some(TraceContext {
        trace_id,
        span_id,
        parent_span_id: None,
        sampled: flags & 0x01 == 0x01,
    })
}

/// The server span of the request currently being handled.
///
/// Cloned into request extensions by [`trace_span_middleware`]; clones share
/// the same tag list.
#[derive(Clone)]
pub struct ActiveSpan {
    context: TraceContext,
    span: tracing::Span,
    tags: Arc<Mutex<Vec<(String, String)>>>,
}

impl ActiveSpan {
    /// Open the `http_request` span for an inbound request.
    pub fn start(method: &str, path: &str, context: TraceContext) -> Self {
        let span = tracing::info_span!(
            "http_request",
            method = %method,
            path = %path,
            trace_id = %context.trace_id,
            span_id = %context.span_id,
            correlation_id = tracing::field::Empty,
            parent_request_id = tracing::field::Empty,
        );

        Self {
            context,
            span,
            tags: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn context(&self) -> &TraceContext {
        &self.context
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    /// Attach a tag. Keys matching a declared span field are also recorded
    /// on the `tracing` span.
    pub fn set_tag(&self, key: &str, value: &str) {
        self.span.record(key, value);
        self.tags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((key.to_string(), value.to_string()));
    }

    /// Record a span field without counting it as a tag.
    pub fn record_field(&self, key: &str, value: &str) {
        self.span.record(key, value);
    }

    /// Tags written so far, in write order.
    pub fn tags(&self) -> Vec<(String, String)> {
        self.tags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl fmt::Debug for ActiveSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveSpan")
            .field("context", &self.context)
            .field("tags", &self.tags())
            .finish()
    }
}

/// Opens the per-request server span and makes it the active span for the
/// rest of the pipeline.
pub async fn trace_span_middleware(mut request: Request<Body>, next: Next) -> Response {
    let context = TraceContext::from_headers(request.headers());
    let active = ActiveSpan::start(request.method().as_str(), request.uri().path(), context);
    let span = active.span().clone();

    request.extensions_mut().insert(active);

    next.run(request).instrument(span).await
}
