//! nullref-relay binary entry point.
//!
//! Usage:
//! ```bash
//! nullref-relay --config relay.toml
//! nullref-relay --bind 0.0.0.0:8080 --http-bind 0.0.0.0:9090
//! nullref-relay --help
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use nullref_relay::cleanup::spawn_cleanup_task;
use nullref_relay::http;
use nullref_relay::{Config, RelayServer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Public-key addressed message relay.
#[derive(Parser, Debug)]
#[command(name = "nullref-relay")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file (defaults are used if omitted)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Override the websocket bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the HTTP endpoints bind address
    #[arg(long)]
    http_bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }
    if let Some(http_bind) = cli.http_bind {
        config.http.bind_address = http_bind;
    }
    config.validate().context("Invalid configuration")?;

    tracing::info!("nullref-relay v{}", env!("CARGO_PKG_VERSION"));

    let relay = Arc::new(RelayServer::new(config).context("Failed to create relay")?);
    let listener = relay.bind().await.context("Failed to bind relay listener")?;

    if relay.config().http.enabled {
        http::health::init_start_time();
        let http_listener = tokio::net::TcpListener::bind(&relay.config().http.bind_address)
            .await
            .context("Failed to bind HTTP listener")?;
        let http_relay = Arc::clone(&relay);
        tokio::spawn(async move {
            if let Err(e) = http::serve(http_relay, http_listener).await {
                tracing::error!("HTTP server error: {}", e);
            }
        });
    }

    let cleanup = spawn_cleanup_task(Arc::clone(&relay));

    let signal_relay = Arc::clone(&relay);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received shutdown signal");
                signal_relay.shutdown();
            }
            Err(e) => tracing::error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    Arc::clone(&relay)
        .run(listener)
        .await
        .context("Relay server error")?;

    let _ = cleanup.await;
    tracing::info!("Done.");
    Ok(())
}
