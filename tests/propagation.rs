//! Correlation propagation to downstream services and background jobs.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;
use tracing_subscriber::layer::SubscriberExt;

use traces_and_logs::observability::SinkLayer;

mod common;
use common::{eventually, get, start_capturing_backend, test_config, with_downstream, TestApp};

fn with_id(uri: &str, id: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-correlation-id", id)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_downstream_call_carries_correlation_headers() {
    let (addr, captured) = start_capturing_backend(200, r#"[{"summary":"Mild"}]"#).await;
    let app = TestApp::new(with_downstream(test_config(), "api2", addr));

    let response = app.router.clone().oneshot(with_id("/call/api2", "ABC")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], br#"[{"summary":"Mild"}]"#);

    let request_row = app.request_rows().await.remove(0);
    let calls = captured.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    let headers = &calls[0];
    assert_eq!(headers["x-correlation-id"], "ABC");
    assert_eq!(Some(headers["x-parent-request-id"].as_str()), request_row.get("SpanId"));

    let traceparent = &headers["traceparent"];
    let trace_id = request_row.get("TraceId").unwrap();
    assert!(traceparent.starts_with(&format!("00-{}-", trace_id)));
    assert_eq!(traceparent.split('-').nth(2), Some(headers["x-parent-request-id"].as_str()));
    assert_eq!(headers["accept"], "application/json");
}

#[tokio::test]
async fn test_downstream_non_success_maps_to_bad_request() {
    let (addr, _) = start_capturing_backend(500, "boom").await;
    let app = TestApp::new(with_downstream(test_config(), "api2", addr));

    let response = app.router.clone().oneshot(get("/call/api2")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unreachable_downstream_is_bad_gateway() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let app = TestApp::new(with_downstream(test_config(), "api2", addr));

    let response = app.router.clone().oneshot(get("/call/api2")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_unknown_client_is_not_found() {
    let app = TestApp::new(test_config());

    let response = app.router.clone().oneshot(get("/call/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.router.clone().oneshot(get("/enqueue/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_job_runs_with_snapshot_after_request_completes() {
    let (addr, captured) = start_capturing_backend(200, "ok").await;
    let app = TestApp::new(with_downstream(test_config(), "api2", addr));

    let subscriber = tracing_subscriber::registry()
        .with(SinkLayer::new(app.services.sink.shared(), tracing::Level::INFO));
    let _guard = tracing::subscriber::set_default(subscriber);

    let response = app.router.clone().oneshot(with_id("/enqueue/api2", "JOB-1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let accepted: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(accepted["job_id"].is_string());

    assert!(eventually(|| !captured.lock().unwrap().is_empty()).await);
    let headers = captured.lock().unwrap()[0].clone();
    assert_eq!(headers["x-correlation-id"], "JOB-1");

    let request_row = app.request_rows().await.remove(0);
    assert_eq!(Some(headers["x-parent-request-id"].as_str()), request_row.get("SpanId"));

    let job_logged = |app: &TestApp| {
        let rows = app.services.log_store.rows();
        rows.iter().any(|r| {
            r.get("Message") == Some("Job completed") && r.get("CorrelationId") == Some("JOB-1")
        })
    };
    let mut found = false;
    for _ in 0..100 {
        app.services.sink.flush().await;
        if job_logged(&app) {
            found = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(found, "job completion logged under the request's correlation id");
}
