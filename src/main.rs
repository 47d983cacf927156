//! grapher - session-oriented command protocol server
//!
//! Serves pluggable graph drivers over raw TCP or WebSocket.

use clap::Parser;
use grapher_core::{DriverRegistry, SampleGraphDriver, SAMPLE_DRIVER_NAME};
use grapher_server::config::CONFIG_ENV;
use grapher_server::{Config, Server, ServerConfig, ServerError, Transport};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "grapher")]
#[command(about = "Command protocol server for graph drivers", long_about = None)]
#[command(version)]
struct Cli {
    /// YAML config file
    #[arg(short, long, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    host: Option<IpAddr>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Transport: stream (raw TCP) or message (WebSocket)
    #[arg(short, long)]
    transport: Option<Transport>,
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match Config::load_with(cli.config.as_deref()) {
        Ok(c) => {
            if let Some(ref path) = cli.config {
                tracing::info!("Loaded config from {}", path.display());
            }
            c
        }
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(ServerError::Config(e));
        }
    };

    if let Some(host) = cli.host {
        config.network.bind_addr.set_ip(host);
    }
    if let Some(port) = cli.port {
        config.network.bind_addr.set_port(port);
    }
    if let Some(transport) = cli.transport {
        config.network.transport = transport;
    }

    if let Err(e) = config.network.validate() {
        tracing::error!("Configuration error: {}", e);
        return Err(ServerError::Config(e));
    }

    let mut registry = DriverRegistry::new();
    registry.register::<SampleGraphDriver>(SAMPLE_DRIVER_NAME);

    tracing::info!("Starting grapher server");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  Transport: {}", config.network.transport);
    tracing::info!("  Status format: {:?}", config.protocol.status_format);
    tracing::info!("  Drivers: {}", registry.names().join(", "));

    let server = Arc::new(Server::new(ServerConfig::from(&config), Arc::new(registry)));

    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
    });

    server.run().await?;

    tracing::info!("Server stopped");
    Ok(())
}
