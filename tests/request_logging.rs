//! End-to-end request recording through the full layer stack.

use std::collections::HashSet;

use axum::body::{Body, Bytes};
use axum::http::{header, Request, StatusCode};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures_util::stream;
use serde_json::Value;
use tower::ServiceExt;
use tracing_subscriber::layer::SubscriberExt;

use traces_and_logs::observability::{LogRow, SinkLayer};

mod common;
use common::{get, test_config, TestApp};

fn request_log(row: &LogRow) -> Value {
    let event: Value = serde_json::from_str(row.get("LogEvent").unwrap()).unwrap();
    event["properties"]["RequestLog"].clone()
}

#[tokio::test]
async fn test_cmd_success_records_exactly_one_request() {
    let app = TestApp::new(test_config());

    let response = app.router.clone().oneshot(get("/cmdSuccess")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let correlation_id = response.headers()["x-correlation-id"].to_str().unwrap().to_string();
    assert!(!correlation_id.is_empty());

    let rows = app.request_rows().await;
    assert_eq!(rows.len(), 1);
    let log = request_log(&rows[0]);
    assert_eq!(log["Method"], "GET");
    assert_eq!(log["Path"], "/cmdSuccess");
    assert!(log["Timestamp"].is_string());
    assert_eq!(rows[0].get("CorrelationId"), Some(correlation_id.as_str()));
    assert_eq!(rows[0].get("LevelName"), Some("Information"));
    assert!(rows[0].get("MachineName").is_some());
}

#[tokio::test]
async fn test_inbound_correlation_id_is_kept() {
    let app = TestApp::new(test_config());

    let request = Request::builder()
        .uri("/")
        .header("x-correlation-id", "ABC")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-correlation-id"], "ABC");

    let rows = app.request_rows().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("CorrelationId"), Some("ABC"));
    assert_eq!(request_log(&rows[0])["CorrelationId"], "ABC");
}

#[tokio::test]
async fn test_log_ui_requests_are_not_recorded() {
    let app = TestApp::new(test_config());

    let authorized = Request::builder()
        .uri("/log-ui/api/keys")
        .header(
            header::AUTHORIZATION,
            format!("Basic {}", STANDARD.encode("admin:test-password")),
        )
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(authorized).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.router.clone().oneshot(get("/log-ui/api/logs")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    assert!(app.request_rows().await.is_empty());
}

#[tokio::test]
async fn test_handler_reads_the_recorded_body() {
    let app = TestApp::new(test_config());

    let request = Request::builder()
        .method("POST")
        .uri("/echo?source=test")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"order":42}"#))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let echoed = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&echoed[..], br#"{"order":42}"#);

    let rows = app.request_rows().await;
    let log = request_log(&rows[0]);
    assert_eq!(log["Method"], "POST");
    assert_eq!(log["QueryString"], "?source=test");
    assert_eq!(log["Body"], r#"{"order":42}"#);
    assert_eq!(log["Headers"]["content-type"], "application/json");
}

/// POST `/echo` with a chunked body and no content-length.
fn chunked_echo(parts: &[&'static str]) -> Request<Body> {
    let chunks: Vec<Result<Bytes, std::io::Error>> =
        parts.iter().map(|p| Ok(Bytes::from_static(p.as_bytes()))).collect();
    Request::builder()
        .method("POST")
        .uri("/echo")
        .body(Body::from_stream(stream::iter(chunks)))
        .unwrap()
}

const ALPHABET: [&str; 3] = ["abcdefghij", "klmnopqrst", "uvwxyz"];

#[tokio::test]
async fn test_chunked_oversized_body_gets_same_status_as_unrecorded() {
    let mut config = test_config();
    config.request_log.max_body_bytes = 16;

    let mut unrecorded = config.clone();
    unrecorded.request_log.enabled = false;
    let baseline = TestApp::new(unrecorded)
        .router
        .clone()
        .oneshot(chunked_echo(&ALPHABET))
        .await
        .unwrap()
        .status();

    let app = TestApp::new(config);
    let response = app.router.clone().oneshot(chunked_echo(&ALPHABET)).await.unwrap();
    assert_eq!(response.status(), baseline);
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let rows = app.request_rows().await;
    assert_eq!(rows.len(), 1);
    let log = request_log(&rows[0]);
    assert_eq!(log["Path"], "/echo");
    assert!(log["Body"].is_null());
}

#[tokio::test]
async fn test_chunked_body_within_limit_is_echoed_and_recorded() {
    let app = TestApp::new(test_config());

    let response = app.router.clone().oneshot(chunked_echo(&ALPHABET)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let echoed = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&echoed[..], b"abcdefghijklmnopqrstuvwxyz");

    let rows = app.request_rows().await;
    assert_eq!(request_log(&rows[0])["Body"], "abcdefghijklmnopqrstuvwxyz");
}

#[tokio::test]
async fn test_request_row_carries_trace_ids() {
    let app = TestApp::new(test_config());

    let request = Request::builder()
        .uri("/")
        .header(
            "traceparent",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
        )
        .body(Body::empty())
        .unwrap();
    app.router.clone().oneshot(request).await.unwrap();

    let rows = app.request_rows().await;
    assert_eq!(rows[0].get("TraceId"), Some("4bf92f3577b34da6a3ce929d0e0e4736"));
    let span_id = rows[0].get("SpanId").unwrap();
    assert_eq!(span_id.len(), 16);
    assert_ne!(span_id, "00f067aa0ba902b7");
}

#[tokio::test]
async fn test_tracing_disabled_leaves_trace_columns_empty() {
    let mut config = test_config();
    config.tracing.enabled = false;
    let app = TestApp::new(config);

    app.router.clone().oneshot(get("/")).await.unwrap();

    let rows = app.request_rows().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("TraceId"), None);
    assert_eq!(rows[0].get("SpanId"), None);
}

#[tokio::test]
async fn test_recording_disabled() {
    let mut config = test_config();
    config.request_log.enabled = false;
    let app = TestApp::new(config);

    let response = app.router.clone().oneshot(get("/")).await.unwrap();
    assert!(response.headers().contains_key("x-correlation-id"));
    assert!(app.request_rows().await.is_empty());
}

#[tokio::test]
async fn test_concurrent_requests_keep_their_own_ids() {
    let mut config = test_config();
    config.demo.delay_unit_ms = 5;
    let app = TestApp::new(config);

    let subscriber = tracing_subscriber::registry()
        .with(SinkLayer::new(app.services.sink.shared(), tracing::Level::INFO));
    let _guard = tracing::subscriber::set_default(subscriber);

    let send = |id: &'static str, path: &'static str| {
        let router = app.router.clone();
        async move {
            let request = Request::builder()
                .uri(path)
                .header("x-correlation-id", id)
                .body(Body::empty())
                .unwrap();
            router.oneshot(request).await.unwrap()
        }
    };

    let (x, y, x2, y2) = tokio::join!(
        send("X", "/cmdSuccess"),
        send("Y", "/cmdSuccess"),
        send("X", "/cmdFail"),
        send("Y", "/cmdFail"),
    );
    assert_eq!(x.headers()["x-correlation-id"], "X");
    assert_eq!(y.headers()["x-correlation-id"], "Y");
    assert_eq!(x2.status(), StatusCode::BAD_REQUEST);
    assert_eq!(y2.status(), StatusCode::BAD_REQUEST);

    let rows = app.rows().await;
    let app_rows: Vec<&LogRow> = rows
        .iter()
        .filter(|r| r.get("Message").map_or(false, |m| m.starts_with("DELAY")))
        .collect();
    assert_eq!(app_rows.len(), 4);

    for id in ["X", "Y"] {
        let mine: Vec<&LogRow> = app_rows
            .iter()
            .copied()
            .filter(|r| r.get("CorrelationId") == Some(id))
            .collect();
        assert_eq!(mine.len(), 2, "rows for {}", id);

        let messages: HashSet<bool> = mine
            .iter()
            .map(|r| r.get("Message").unwrap().ends_with("cmdSuccess"))
            .collect();
        assert_eq!(messages.len(), 2);
    }

    // Each application log shares the trace of the request it ran in.
    let requests = app.request_rows().await;
    for row in app_rows {
        let owner = requests
            .iter()
            .find(|r| r.get("SpanId") == row.get("SpanId"))
            .expect("request row for span");
        assert_eq!(owner.get("CorrelationId"), row.get("CorrelationId"));
    }
}
