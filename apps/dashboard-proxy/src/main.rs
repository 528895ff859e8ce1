//! Dashboard Proxy Binary
//!
//! Starts the market data dashboard gateway.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin dashboard-proxy
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `ALPACA_KEY`: Alpaca API key
//! - `ALPACA_SECRET`: Alpaca API secret
//!
//! ## Optional
//! - `ALPACA_PAPER`: Paper account, selects the options feed (default: true)
//! - `ALPACA_FEED`: Stock data feed - "iex" | "sip" (default: iex)
//! - `ALPACA_DATA_URL`: REST base URL (default: <https://data.alpaca.markets>)
//! - `ALPACA_STREAM_URL`: Stream base URL (default: <wss://stream.data.alpaca.markets/v2>)
//! - `DASHBOARD_PORT`: HTTP + WebSocket port (default: 3001)
//! - `OTEL_ENABLED`: Enable OpenTelemetry export (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: dashboard-proxy)
//! - `RUST_LOG` / `LOG_LEVEL`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use dashboard_proxy::infrastructure::telemetry;
use dashboard_proxy::{
    AlpacaRestClient, AlpacaStreamConnector, AppState, DashboardConfig, HttpServer,
    MarketDataPort, StreamManager, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting dashboard gateway");

    let _metrics_handle = init_metrics();

    let config = DashboardConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let rest_client =
        AlpacaRestClient::new(config.rest_config()).context("failed to build REST client")?;
    let market_data: Arc<dyn MarketDataPort> = Arc::new(rest_client);
    let connector = Arc::new(AlpacaStreamConnector::new(config.stream_config()));
    let manager = Arc::new(StreamManager::new(connector, market_data));

    // REST routes are usable before the stream finishes connecting.
    let stream_manager = Arc::clone(&manager);
    tokio::spawn(async move {
        stream_manager.initialize().await;
    });

    let shutdown_token = CancellationToken::new();
    let state = AppState::new(Arc::clone(&manager))
        .with_client_queue_capacity(config.server.client_queue_capacity);
    let server = HttpServer::new(config.server.port, state, shutdown_token.clone());
    let mut server_task = tokio::spawn(server.run());

    tokio::select! {
        result = &mut server_task => {
            manager.shutdown();
            result.context("HTTP server task panicked")??;
            return Ok(());
        }
        () = await_shutdown() => {}
    }

    shutdown_token.cancel();
    manager.shutdown();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, server_task).await {
        Ok(result) => result.context("HTTP server task panicked")??,
        Err(_) => tracing::warn!("HTTP server did not stop in time"),
    }

    tracing::info!("Dashboard gateway stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &DashboardConfig) {
    tracing::info!(
        paper = config.paper,
        feed = config.feed.as_str(),
        options_feed = config.options_feed().as_str(),
        port = config.server.port,
        "Configuration loaded"
    );
    tracing::debug!(
        data_url = %config.data_url,
        stock_stream_url = %config.stock_stream_url(),
        "Upstream endpoints"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
