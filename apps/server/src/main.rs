//! Watch Party Server - standalone sync server for watch parties.
//!
//! Hosts rooms keyed by party code, accepts participant WebSockets and keeps
//! every participant's playback in step with the room's host.

mod config;

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use watchparty_core::{bind_listener, bootstrap_services, serve};

use crate::config::ServerConfig;

/// Watch Party Server - synchronized video playback rooms.
#[derive(Parser, Debug)]
#[command(name = "watchparty-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "WATCHPARTY_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Bind address (overrides config file).
    #[arg(short = 'b', long)]
    bind: Option<IpAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Watch Party Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(ip) = args.bind {
        config.bind_address = ip;
    }

    let core_config = config.to_core_config();
    log::info!(
        "Configuration: bind={}, ping={}s, idle_timeout={}s",
        core_config.bind_addr(),
        core_config.ws_ping_interval_secs,
        core_config.ws_idle_timeout_secs
    );

    let services = bootstrap_services(core_config).context("Failed to bootstrap services")?;
    log::info!("Services bootstrapped successfully");

    let listener = bind_listener(&services.config)
        .await
        .context("Failed to start HTTP server")?;

    let server_handle = tokio::spawn(serve(
        listener,
        services.app_state(),
        services.cancel_token.clone(),
    ));

    // Wait for shutdown signal
    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    // Graceful shutdown: closes sockets, rooms empty through normal departures
    services.shutdown();

    match server_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::error!("Server error: {}", e),
        Err(e) => log::error!("Server task failed: {}", e),
    }

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
