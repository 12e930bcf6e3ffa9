//! Correlation identity of one request.
//!
//! # Responsibilities
//! - Read or generate the correlation id from inbound headers
//! - Read the parent request id, when the caller sent one
//! - Carry both as ambient state scoped to one request's task

use std::convert::Infallible;
use std::fmt;
use std::future::Future;

use axum::extract::FromRequestParts;
use axum::http::{request::Parts, HeaderMap};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::observability::trace::TraceContext;

/// Header carrying the whole-chain correlation id.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Header carrying the immediate caller's request/span id.
pub const PARENT_REQUEST_ID_HEADER: &str = "x-parent-request-id";

/// Transport-level request id, accepted as a fallback parent id.
pub const TRANSPORT_REQUEST_ID_HEADER: &str = "request-id";

/// Request id assigned at ingress by the request-id layer.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Opaque token identifying one logical request chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// A new id: UUID v4 as 32 lowercase hex chars.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CorrelationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque id of the request or span that issued the current request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParentRequestId(String);

impl ParentRequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParentRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ParentRequestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ParentRequestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

fn header_text<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// Inbound `x-correlation-id` verbatim, or a freshly generated id when it is
/// missing, empty or not readable as text.
pub fn resolve(headers: &HeaderMap) -> CorrelationId {
    header_text(headers, CORRELATION_ID_HEADER)
        .map(CorrelationId::from)
        .unwrap_or_else(CorrelationId::generate)
}

/// Inbound `x-parent-request-id`, falling back to `request-id`.
pub fn resolve_parent(headers: &HeaderMap) -> Option<ParentRequestId> {
    header_text(headers, PARENT_REQUEST_ID_HEADER)
        .or_else(|| header_text(headers, TRANSPORT_REQUEST_ID_HEADER))
        .map(ParentRequestId::from)
}

/// Owned copy of the ids to forward on an outbound call or background job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationSnapshot {
    pub correlation_id: Option<CorrelationId>,
    pub parent_request_id: Option<ParentRequestId>,
}

tokio::task_local! {
    static CURRENT: RequestCorrelation;
}

/// Correlation state of the request (or job) being handled.
#[derive(Debug, Clone)]
pub struct RequestCorrelation {
    pub correlation_id: CorrelationId,
    pub parent_request_id: Option<ParentRequestId>,
    /// `x-request-id` assigned at ingress.
    pub request_id: Option<String>,
    /// Server span of this request, when tracing is enabled.
    pub trace: Option<TraceContext>,
}

impl RequestCorrelation {
    /// Resolve correlation and parent ids from inbound headers.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            correlation_id: resolve(headers),
            parent_request_id: resolve_parent(headers),
            request_id: header_text(headers, X_REQUEST_ID).map(str::to_string),
            trace: None,
        }
    }

    /// Rebuild the context a background job runs under from its snapshot.
    /// A snapshot without a correlation id starts a new chain.
    pub fn from_snapshot(snapshot: &CorrelationSnapshot) -> Self {
        Self {
            correlation_id: snapshot
                .correlation_id
                .clone()
                .unwrap_or_else(CorrelationId::generate),
            parent_request_id: snapshot.parent_request_id.clone(),
            request_id: None,
            trace: None,
        }
    }

    /// Ids to send to a downstream hop.
    ///
    /// The parent id sent onwards identifies this unit of work: its span id,
    /// else its request id. Work with neither (a background job) forwards
    /// the parent it was started on behalf of.
    pub fn outgoing(&self) -> CorrelationSnapshot {
        let parent = self
            .trace
            .map(|t| ParentRequestId::from(t.span_id.to_string()))
            .or_else(|| self.request_id.clone().map(ParentRequestId::from))
            .or_else(|| self.parent_request_id.clone());

        CorrelationSnapshot {
            correlation_id: Some(self.correlation_id.clone()),
            parent_request_id: parent,
        }
    }

    /// Run `fut` with this correlation as the ambient context.
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        CURRENT.scope(self, fut).await
    }

    /// Ambient correlation of the running task, if inside a scope.
    pub fn current() -> Option<Self> {
        CURRENT.try_with(Clone::clone).ok()
    }

    /// Borrow the ambient correlation without cloning it.
    pub fn with_current<R>(f: impl FnOnce(&RequestCorrelation) -> R) -> Option<R> {
        CURRENT.try_with(f).ok()
    }
}

impl<S> FromRequestParts<S> for RequestCorrelation
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestCorrelation>()
            .cloned()
            .unwrap_or_else(|| RequestCorrelation::from_headers(&parts.headers)))
    }
}
