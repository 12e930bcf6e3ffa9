//! Named outbound HTTP clients.
//!
//! # Responsibilities
//! - Build one `reqwest` client per configured downstream service
//! - Resolve request paths against the client's base URL
//! - Propagate correlation headers and trace context on every call
//!
//! # Design Decisions
//! - Clients are built once at startup and shared (connection pooling)
//! - Non-success statuses are returned, not turned into errors

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use url::Url;

use crate::config::DownstreamConfig;
use crate::correlation::{CorrelationSnapshot, PropagateCorrelation};
use crate::observability::metrics;
use crate::observability::trace::{TraceContext, TRACEPARENT_HEADER};

/// Error type for downstream calls.
#[derive(Debug, thiserror::Error)]
pub enum DownstreamError {
    #[error("unknown downstream client '{0}'")]
    UnknownClient(String),

    #[error("invalid downstream url: {0}")]
    Url(#[from] url::ParseError),

    #[error("downstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Status and body of a downstream response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownstreamResponse {
    pub status: u16,
    pub body: String,
}

impl DownstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

struct NamedClient {
    base_url: Url,
    client: reqwest::Client,
}

/// Registry of configured downstream clients.
#[derive(Clone, Default)]
pub struct DownstreamClients {
    clients: Arc<HashMap<String, NamedClient>>,
}

impl DownstreamClients {
    pub fn from_config(configs: &[DownstreamConfig]) -> Result<Self, DownstreamError> {
        let mut clients = HashMap::with_capacity(configs.len());

        for config in configs {
            let mut base_url = Url::parse(&config.base_url)?;
            // Keep the base path when joining relative paths.
            if !base_url.path().ends_with('/') {
                let path = format!("{}/", base_url.path());
                base_url.set_path(&path);
            }

            let mut default_headers = HeaderMap::new();
            default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .default_headers(default_headers)
                .build()?;

            clients.insert(config.name.clone(), NamedClient { base_url, client });
        }

        Ok(Self {
            clients: Arc::new(clients),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.clients.contains_key(name)
    }

    /// GET `path` on the named client with correlation headers applied.
    ///
    /// When `trace` is given, its `traceparent` is sent as well, naming the
    /// recorded request span as the caller's parent.
    pub async fn get(
        &self,
        name: &str,
        path: &str,
        correlation: &CorrelationSnapshot,
        trace: Option<&TraceContext>,
    ) -> Result<DownstreamResponse, DownstreamError> {
        let named = self
            .clients
            .get(name)
            .ok_or_else(|| DownstreamError::UnknownClient(name.to_string()))?;
        let url = named.base_url.join(path.trim_start_matches('/'))?;

        tracing::info!(client = name, url = %url, "Calling downstream");

        let mut request = named.client.get(url).with_correlation(correlation);
        if let Some(trace) = trace {
            request = request.header(TRACEPARENT_HEADER, trace.traceparent());
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                metrics::record_downstream(name, 0);
                return Err(e.into());
            }
        };
        let status = response.status().as_u16();
        metrics::record_downstream(name, status);
        let body = response.text().await?;

        Ok(DownstreamResponse { status, body })
    }
}
