//! Tether Server Daemon
//!
//! Serves the agent-facing and operator-facing HTTP endpoints and runs the
//! liveness sweeper until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tether_core::config::{self, ServerConfig};
use tether_server::session::run_liveness_sweep;
use tether_server::ServerState;

#[derive(Parser)]
#[command(name = "tether-server")]
#[command(about = "Tether control-plane server")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config)
    #[arg(short, long)]
    bind: Option<String>,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.foreground { "debug" } else { &args.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Tether server starting...");

    let mut config = load_config(args.config.as_ref())?;
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    config.validate().context("Invalid configuration")?;

    let listener = TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;

    let state = Arc::new(ServerState::new(config.clone()));
    let cancel = CancellationToken::new();

    // Setup signal handlers
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        cancel_clone.cancel();
    });

    // Pending commands must fail before graceful shutdown waits on them
    let drain_state = Arc::clone(&state);
    let drain_cancel = cancel.clone();
    tokio::spawn(async move {
        drain_cancel.cancelled().await;
        drain_state.shutdown().await;
    });

    let sweeper = tokio::spawn(run_liveness_sweep(
        Arc::clone(&state.registry),
        config.heartbeat_timeout,
        config.sweep_interval,
        cancel.clone(),
    ));

    tether_server::http::serve(listener, Arc::clone(&state), cancel.clone()).await?;

    cancel.cancel();
    if let Err(e) = sweeper.await {
        tracing::warn!("Liveness sweeper ended abnormally: {}", e);
    }
    state.shutdown().await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Load configuration from `--config`, the default path, or built-in defaults
fn load_config(path: Option<&PathBuf>) -> Result<ServerConfig> {
    if let Some(config_path) = path {
        return config::load_config(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path));
    }

    let default_path = config::default_config_path();
    if default_path.exists() {
        Ok(config::load_config(&default_path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
            ServerConfig::default()
        }))
    } else {
        tracing::info!("Using default configuration");
        Ok(ServerConfig::default())
    }
}

async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
