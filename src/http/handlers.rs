//! Demo endpoints.
//!
//! Small handlers that exercise the correlation pipeline: a random delay
//! with a log line, a failing variant, a downstream call and a background
//! job.

use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::json;

use crate::config::DemoConfig;
use crate::correlation::RequestCorrelation;
use crate::downstream::{DownstreamClients, DownstreamError};
use crate::jobs::{JobKind, JobQueue};
use crate::observability::trace::ActiveSpan;

/// State shared by the demo handlers.
#[derive(Clone)]
pub struct AppState {
    pub demo: DemoConfig,
    pub clients: DownstreamClients,
    pub jobs: JobQueue,
}

/// Dice roll of 0..=4 delay units.
fn roll_delay(unit_ms: u64) -> (u64, Duration) {
    let dice = fastrand::u64(0..5);
    (dice, Duration::from_millis(dice * unit_ms))
}

pub async fn root() -> StatusCode {
    StatusCode::OK
}

/// Return the request body unchanged.
pub async fn echo(body: Bytes) -> Bytes {
    body
}

pub async fn cmd_success(
    State(state): State<AppState>,
    span: Option<Extension<ActiveSpan>>,
) -> StatusCode {
    let (dice, delay) = roll_delay(state.demo.delay_unit_ms);
    tokio::time::sleep(delay).await;

    if let Some(Extension(span)) = span {
        span.set_tag("command", "cmdSuccess");
    }
    tracing::info!(dice, "DELAY : {} ## cmdSuccess", dice);

    StatusCode::OK
}

pub async fn cmd_fail(State(state): State<AppState>) -> StatusCode {
    let (dice, delay) = roll_delay(state.demo.delay_unit_ms);
    tokio::time::sleep(delay).await;

    tracing::error!(dice, "DELAY : {} ## cmdFail", dice);

    StatusCode::BAD_REQUEST
}

/// GET the demo path on a downstream client, forwarding correlation headers.
pub async fn call_downstream(
    State(state): State<AppState>,
    Path(client): Path<String>,
    correlation: RequestCorrelation,
) -> Response {
    let outgoing = correlation.outgoing();

    match state
        .clients
        .get(&client, &state.demo.downstream_path, &outgoing, correlation.trace.as_ref())
        .await
    {
        Ok(response) if response.is_success() => (StatusCode::OK, response.body).into_response(),
        Ok(response) => {
            tracing::warn!(client = %client, status = response.status, "Downstream returned non-success");
            StatusCode::BAD_REQUEST.into_response()
        }
        Err(DownstreamError::UnknownClient(name)) => {
            (StatusCode::NOT_FOUND, format!("unknown downstream client '{}'", name)).into_response()
        }
        Err(e) => {
            tracing::error!(client = %client, error = %e, "Downstream call failed");
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}

/// Queue a downstream call that runs after this request has completed.
pub async fn enqueue_job(
    State(state): State<AppState>,
    Path(client): Path<String>,
    correlation: RequestCorrelation,
) -> Response {
    if !state.clients.contains(&client) {
        return (StatusCode::NOT_FOUND, format!("unknown downstream client '{}'", client)).into_response();
    }

    let kind = JobKind::CallDownstream {
        client,
        path: state.demo.downstream_path.clone(),
    };

    match state.jobs.enqueue(kind, correlation.outgoing()) {
        Ok(job_id) => {
            tracing::info!(job_id = %job_id, "Background job enqueued");
            (StatusCode::ACCEPTED, Json(json!({ "job_id": job_id }))).into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Background job rejected");
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
        }
    }
}
