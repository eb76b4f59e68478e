//! Redfish Proxy
//!
//! A single uniformly authenticated HTTP entry point for a fleet of BMC
//! Redfish endpoints.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌────────────────────────────────────────────────────┐
//!                      │                  REDFISH PROXY                      │
//!                      │                                                     │
//!  Client Request      │  ┌────────┐   ┌──────────┐   ┌─────────────────┐  │
//!  ────────────────────┼─▶│  auth  │──▶│ routing  │──▶│ target registry │  │
//!                      │  └────────┘   │classifier│   └────────┬────────┘  │
//!                      │               └──────────┘            │           │
//!                      │                                       ▼           │
//!                      │               ┌──────────┐   ┌─────────────────┐  │
//!                      │               │ circuit  │◀─▶│   client pool   │  │
//!                      │               │ tracker  │   │ (per-target TLS)│  │
//!                      │               └────┬─────┘   └────────┬────────┘  │
//!                      │                    │                  │           │
//!  Client Response     │  ┌──────────┐      ▼                  ▼           │
//!  ◀───────────────────┼──│ metered  │◀── dispatch ──────▶ BMC upstream ───┼──▶ Redfish
//!                      │  │ response │                                     │    endpoint
//!                      │  └──────────┘                                     │
//!                      │                                                   │
//!                      │  config / lifecycle / observability / admin       │
//!                      └───────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use redfish_proxy::config::load_config;
use redfish_proxy::observability::metrics;
use redfish_proxy::HttpServer;

#[derive(Parser)]
#[command(name = "redfish-proxy")]
#[command(about = "Multi-target reverse proxy for Redfish BMC endpoints", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "redfish_proxy=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("redfish-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli.config)?;

    tracing::info!(
        bind_address = %config.server.bind_address,
        targets = config.targets.len(),
        request_timeout_secs = config.server.request_timeout_secs,
        "Configuration loaded"
    );

    // Metrics exporter on its own listener
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

    // Bind TCP listener
    let listener = TcpListener::bind(&config.server.bind_address).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(
        address = %local_addr,
        "Listening for connections"
    );

    // Create and run HTTP server
    let server = HttpServer::new(config).with_config_path(cli.config);
    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
