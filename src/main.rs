//! plugwatch Binary Entry Point
//!
//! Runs the sampling loop and the JSON API for one smart plug.
//! Core functionality is provided by the `plugwatch` library crate.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use plugwatch::{
    collector::{CollectorHandle, PlugCollector, SAMPLING_INTERVAL},
    config::AppConfig,
    gateway::{DeviceGateway, TuyaClient},
    server::{AppState, create_router},
    storage::StorageHandles,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// plugwatch - smart plug energy monitor
#[derive(Parser, Debug)]
#[command(name = "plugwatch", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "configs/config.yaml",
        env = "PLUGWATCH_CONFIG"
    )]
    config: String,

    /// Server bind address (overrides config file)
    #[arg(long, env = "PLUGWATCH_SERVER_BIND")]
    server_bind: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, env = "PLUGWATCH_SERVER_PORT")]
    server_port: Option<u16>,

    /// Database file path (overrides config file)
    #[arg(long, env = "PLUGWATCH_DB_PATH")]
    db_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,plugwatch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("plugwatch - smart plug energy monitor");

    let cli = Cli::parse();

    tracing::info!("Loading configuration from: {}", cli.config);
    let mut config = AppConfig::load(&cli.config)?;

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(bind) = cli.server_bind {
        config.server.bind = bind;
    }
    if let Some(port) = cli.server_port {
        config.server.port = port;
    }
    if let Some(path) = cli.db_path {
        config.database.path = path;
    }
    config.validate()?;

    tracing::info!(
        "Server: {}:{}, Database: {}",
        config.server.bind,
        config.server.port,
        config.database.path,
    );

    // Build storage layer
    let handles = config.database.storage_builder().build().await?;
    tracing::info!("Storage initialized");

    // Device gateway
    let client = TuyaClient::new(config.device.clone())?;
    let gateway = DeviceGateway::new(Arc::new(client)).with_timeout(config.device.timeout);

    // Sampling loop
    let collector = PlugCollector::new("plug", gateway.clone(), handles.writer.clone());
    let collector = CollectorHandle::spawn(collector, SAMPLING_INTERVAL);

    // Web server
    let app_state =
        AppState::new(handles.reader.clone(), gateway).with_collector_stats(collector.stats());
    let app = create_router(app_state);

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;

    tracing::info!("Web server listening on: http://{}", addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(collector, handles))
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Setup graceful shutdown signal handler.
async fn shutdown_signal(collector: CollectorHandle, handles: StorageHandles) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }

    tracing::info!("Shutting down collector...");
    collector.shutdown().await;

    tracing::info!("Shutting down storage...");
    handles.shutdown().await;
}
