//! traces-and-logs service.
//!
//! ```text
//!     Client Request
//!     ──▶ request id ──▶ body limit ──▶ trace span ──▶ correlation ──▶ handler
//!                                                         │
//!                                      RequestLogRecord ──┤
//!                                      tracing events ────┴──▶ BufferedSink ──▶ stores
//!                                                                                │
//!     /log-ui/api/* ◀──────────────────────────────────────── MemoryLogStore ◀───┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use traces_and_logs::config::{load_config, AppConfig};
use traces_and_logs::http::HttpServer;
use traces_and_logs::lifecycle::{build_services, signals, sink_level, Shutdown};
use traces_and_logs::observability::{logging, metrics, SinkLayer};

#[derive(Parser)]
#[command(name = "traces-and-logs")]
#[command(about = "Correlated request logging and tracing demo service", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };

    let shutdown = Shutdown::new();
    let services = build_services(&config, &shutdown)?;

    logging::init_logging(
        &config.observability,
        SinkLayer::new(services.sink.shared(), sink_level(&config)?),
    )?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "traces-and-logs starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        log_ui_enabled = config.log_ui.enabled,
        log_ui_prefix = %config.log_ui.route_prefix,
        tracing_enabled = config.tracing.enabled,
        "Configuration loaded"
    );
    if let Some(path) = &config.sink.file_path {
        tracing::info!(path = %path, "Writing log rows to file");
    }
    tracing::info!(
        downstream_clients = config.downstream.len(),
        job_workers = services.workers.len(),
        "Services started"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    signals::spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(config, &services);
    server.run(listener, shutdown.subscribe()).await?;

    for worker in services.workers {
        let _ = worker.await;
    }
    services.sink.flush().await;
    tracing::info!(
        accepted = services.sink.stats().accepted(),
        dropped = services.sink.stats().dropped(),
        "Shutdown complete"
    );
    Ok(())
}
