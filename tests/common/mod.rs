//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use traces_and_logs::config::{AppConfig, DownstreamConfig};
use traces_and_logs::lifecycle::{build_services, Services, Shutdown};
use traces_and_logs::observability::LogRow;
use traces_and_logs::HttpServer;

/// Lower-cased request headers of each call a mock backend received.
pub type Captured = Arc<Mutex<Vec<HashMap<String, String>>>>;

/// Start a mock downstream on an ephemeral port that records request
/// headers and answers every call with `status` and `body`.
pub async fn start_capturing_backend(status: u16, body: &'static str) -> (SocketAddr, Captured) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let captured: Captured = Arc::default();
    let store = captured.clone();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let store = store.clone();
                    tokio::spawn(async move {
                        let mut buf = Vec::new();
                        let mut chunk = [0u8; 1024];
                        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                            match socket.read(&mut chunk).await {
                                Ok(0) | Err(_) => break,
                                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                            }
                        }

                        let text = String::from_utf8_lossy(&buf);
                        let headers = text
                            .lines()
                            .skip(1)
                            .take_while(|l| !l.is_empty())
                            .filter_map(|l| l.split_once(':'))
                            .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
                            .collect();
                        store.lock().unwrap().push(headers);

                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            _ => "200 OK",
                        };
                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, captured)
}

/// Defaults with no artificial delay and a fast sink flush.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.demo.delay_unit_ms = 0;
    config.sink.flush_interval_ms = 20;
    config.log_ui.password = "test-password".into();
    config
}

pub fn with_downstream(mut config: AppConfig, name: &str, addr: SocketAddr) -> AppConfig {
    config.downstream.push(DownstreamConfig {
        name: name.into(),
        base_url: format!("http://{}", addr),
        timeout_secs: 5,
    });
    config
}

/// Router plus the services behind it.
pub struct TestApp {
    pub router: axum::Router,
    pub services: Services,
    pub shutdown: Shutdown,
}

impl TestApp {
    pub fn new(config: AppConfig) -> Self {
        let shutdown = Shutdown::new();
        let services = build_services(&config, &shutdown).unwrap();
        let router = HttpServer::new(config, &services).router();
        Self {
            router,
            services,
            shutdown,
        }
    }

    /// Flush the sink and return every stored row, oldest first.
    pub async fn rows(&self) -> Vec<LogRow> {
        self.services.sink.flush().await;
        self.services.log_store.rows()
    }

    /// Rows produced by the request recorder.
    pub async fn request_rows(&self) -> Vec<LogRow> {
        self.rows()
            .await
            .into_iter()
            .filter(|r| r.get("MessageTemplate") == Some("Request: {@RequestLog}"))
            .collect()
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
