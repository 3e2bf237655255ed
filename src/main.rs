//! lfr - Little Free Radio link daemon
//!
//! Accepts framed commands on an emulated UART socket, dispatches them to
//! the radio context and bridges payloads to a KISS modem.

use lfr_server::{Config, Server, ServerConfig};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if LFR_CONFIG is set, then env overrides)
    let config_path = std::env::var("LFR_CONFIG").ok();
    let config = match Config::load() {
        Ok(c) => {
            if let Some(path) = &config_path {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            // If a config file was explicitly specified, fail on error
            if config_path.is_some() {
                tracing::error!("Failed to load config: {}", e);
                return Err(e.into());
            }
            tracing::info!("Using default configuration");
            Config::default()
        }
    };

    if let Err(e) = config.validate() {
        tracing::error!("{}", e);
        return Err(e.into());
    }

    tracing::info!("Starting lfr");
    tracing::info!("  UART address: {}", config.network.uart_bind_addr);
    tracing::info!("  KISS modem: {}", config.network.kiss_addr);
    match config.network.frame_timeout() {
        Some(timeout) => tracing::info!("  Frame timeout: {:?}", timeout),
        None => tracing::info!("  Frame timeout: disabled"),
    }
    tracing::info!(
        "  Radio: {} Hz, TX power 0x{:04x}",
        config.radio.frequency_hz,
        config.radio.tx_power
    );
    tracing::info!("  TX queue depth: {}", config.transmit.queue_depth);

    let server = Arc::new(Server::new(ServerConfig::from_config(&config)));

    // Spawn shutdown signal handler
    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
    });

    // Run server (blocks until shutdown)
    if let Err(e) = server.run().await {
        tracing::error!("Server failed: {}", e);
        return Err(e.into());
    }

    let stats = server.stats();
    tracing::info!(
        "Server stopped ({} frames dispatched, {} rejected, {} sent to modem)",
        stats.frames_dispatched.load(std::sync::atomic::Ordering::Relaxed),
        stats.frames_rejected.load(std::sync::atomic::Ordering::Relaxed),
        stats.tx_frames.load(std::sync::atomic::Ordering::Relaxed)
    );
    Ok(())
}
