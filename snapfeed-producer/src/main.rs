//! snapfeed-producer - polling producer service
//!
//! Polls the upstream API on a fixed interval, validates and enriches the
//! returned records, and delivers them to the configured sinks. A liveness
//! endpoint runs alongside the loop on its own task.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use snapfeed_common::config::{load_bootstrap_config, resolve_config_path};
use snapfeed_producer::config::{Args, ProducerConfig};
use snapfeed_producer::poll_loop::PollLoop;
use snapfeed_producer::services::SourceClient;
use snapfeed_producer::status::StatusHandle;
use snapfeed_producer::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config =
        load_bootstrap_config(args.config.as_deref()).context("Failed to load config file")?;

    // RUST_LOG wins over the config file level
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&toml_config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting snapfeed-producer v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match resolve_config_path(args.config.as_deref()) {
        Some(path) if path.exists() => info!("Config file: {}", path.display()),
        _ => info!("Config file: none (command line, environment and defaults)"),
    }

    let config = ProducerConfig::resolve(&args, &toml_config).context("Invalid configuration")?;
    config.validate().context("Invalid configuration")?;

    let sinks = config.sinks().context("Failed to create sinks")?;
    let source = SourceClient::new(config.api_url.clone(), config.api_timeout)
        .context("Failed to create API client")?;

    info!(
        api_url = %config.api_url,
        profile = %config.profile.name,
        batch_size = config.batch_size,
        sinks = ?sinks.iter().map(|s| s.name().to_string()).collect::<Vec<_>>(),
        "Configuration loaded"
    );

    // Health endpoint
    let status = StatusHandle::new();
    let app = build_router(AppState::new(status.clone()));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.health_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind health endpoint on {}", addr))?;
    info!("Health check: http://{}/health", addr);

    let shutdown = CancellationToken::new();

    let server_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
            .await
    });

    verify_health_endpoint(config.health_port).await;

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    let poll_loop = PollLoop::new(
        Arc::new(source),
        config.deliverer(),
        sinks,
        config.loop_settings,
        status,
    );
    let summary = poll_loop.run(shutdown.clone()).await;

    shutdown.cancel();
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Health server error: {}", e),
        Err(e) => warn!("Health server task failed: {}", e),
    }

    info!(
        "Shutdown complete: {} cycles, {} records delivered",
        summary.cycles, summary.total_records_delivered
    );
    Ok(())
}

/// Query our own health endpoint once after binding
///
/// Failure is logged and otherwise ignored.
async fn verify_health_endpoint(port: u16) {
    let url = format!("http://127.0.0.1:{}/health", port);
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            warn!("Health self-check skipped: {}", e);
            return;
        }
    };

    match client.get(&url).send().await {
        Ok(response) if response.status().is_success() => {
            info!("Health self-check passed ({})", url)
        }
        Ok(response) => warn!(
            "Health self-check returned HTTP {} ({})",
            response.status().as_u16(),
            url
        ),
        Err(e) => warn!("Health self-check failed: {}", e),
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
