//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the demo handlers and the log viewer
//! - Wire up middleware (request id, body limit, trace span, correlation,
//!   timeout)
//! - Serve on a listener until shutdown

use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
};

use crate::config::AppConfig;
use crate::correlation::{correlation_middleware, CorrelationState};
use crate::http::handlers::{self, AppState};
use crate::http::request::RequestLogRecorder;
use crate::lifecycle::Services;
use crate::log_ui::setup_log_ui_router;
use crate::observability::trace::trace_span_middleware;

/// HTTP server for the demo service.
pub struct HttpServer {
    router: Router,
    config: AppConfig,
}

impl HttpServer {
    pub fn new(config: AppConfig, services: &Services) -> Self {
        let router = Self::build_router(&config, services);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Outermost first: request id, body limit, trace span, correlation,
    /// timeout, handlers.
    #[allow(deprecated)]
    fn build_router(config: &AppConfig, services: &Services) -> Router {
        let state = AppState {
            demo: config.demo.clone(),
            clients: services.clients.clone(),
            jobs: services.jobs.clone(),
        };

        let mut app = Router::new()
            .route("/", get(handlers::root))
            .route("/echo", post(handlers::echo))
            .route("/cmdSuccess", get(handlers::cmd_success))
            .route("/cmdFail", get(handlers::cmd_fail))
            .route("/call/{client}", get(handlers::call_downstream))
            .route("/enqueue/{client}", get(handlers::enqueue_job))
            .with_state(state);

        if config.log_ui.enabled {
            app = app.merge(setup_log_ui_router(&config.log_ui, services.log_store.clone()));
        }

        let recorder = RequestLogRecorder::new(
            services.sink.shared(),
            &config.log_ui.route_prefix,
            config.request_log.max_body_bytes,
        );
        let correlation = CorrelationState::new(recorder, config.request_log.enabled);

        let mut app = app
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(middleware::from_fn_with_state(correlation, correlation_middleware));

        if config.tracing.enabled {
            app = app.layer(middleware::from_fn(trace_span_middleware));
        }

        app.layer(RequestBodyLimitLayer::new(config.request_log.max_body_bytes))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The fully layered router, for driving requests without a listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Serve until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
