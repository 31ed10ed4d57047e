use lindorm_mcp::config::{Args, Config, Transport};
use lindorm_mcp::handlers::{health_handler, mcp_handler, ready_handler};
use lindorm_mcp::mcp::stdio;
use lindorm_mcp::state::AppState;

use axum::{
    routing::{get, post},
    Router,
};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the stdio protocol.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lindorm_mcp=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    tracing::info!("Starting Lindorm MCP server");

    let config = Config::from_env_and_args(Args::parse())?;

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;

    let start = std::time::Instant::now();
    let state = Arc::new(AppState::new(&config).await?);
    tracing::info!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        transport = ?config.transport,
        "State initialized",
    );

    match config.transport {
        Transport::Stdio => {
            let reader = io::BufReader::new(io::stdin());
            tokio::select! {
                result = stdio::serve(&state.server, reader, io::stdout()) => result?,
                _ = wait_for_signal() => {}
            }
        }
        Transport::Http => {
            let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

            let app = Router::new()
                .route("/mcp", post(mcp_handler))
                .route("/health", get(health_handler))
                .route("/ready", get(ready_handler))
                .route(
                    "/metrics",
                    get(move || {
                        let handle = prometheus_handle.clone();
                        async move { handle.render() }
                    }),
                )
                .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
                .with_state(Arc::clone(&state));

            let listener = TcpListener::bind(addr).await?;
            tracing::info!(address = %addr, "Server listening");

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal(config.shutdown_timeout_secs))
                .await?;
        }
    }

    state.shutdown().await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn wait_for_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

/// After a signal, allows `timeout_secs` for in-flight tool calls to complete.
async fn shutdown_signal(timeout_secs: u64) {
    wait_for_signal().await;

    tracing::info!(timeout_secs, "Draining connections...");
    tokio::time::sleep(Duration::from_secs(timeout_secs)).await;
}
