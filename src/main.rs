use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;
use voice_relay::config::{Overrides, RelayConfig};
use voice_relay::types::BackendType;
use voice_relay::adapter::ConfiguredAdapters;
use voice_relay::{server, SessionManager};

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// JSON config file. Its values win over the environment, which fills in
    /// anything it leaves out.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Port for the client websocket, overriding the configured listen address.
    #[arg(short, long)]
    port: Option<u16>,
    /// Backend to bridge clients to: llm, retell or voiceflow.
    #[arg(short, long)]
    backend: Option<BackendType>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // --- 1. Load Configuration ---
    let overrides = Overrides {
        port: cli.port,
        backend: cli.backend,
    };
    let config =
        RelayConfig::load_with(cli.config.as_deref(), &overrides).context("Failed to load relay configuration")?;

    // --- 2. Initialize Logging ---
    let filter = EnvFilter::try_new(&config.log_filter).context("Invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    tracing::info!(
        backend = %config.adapter.backend_type,
        queue_capacity = config.queue_capacity,
        "configuration loaded"
    );

    // --- 3. Serve ---
    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;
    tracing::info!("listening on ws://{}", listener.local_addr()?);

    let adapters = Arc::new(ConfiguredAdapters::new(config.adapter.clone()));
    adapters.listen().await.context("Failed to open the Retell port")?;
    let manager = SessionManager::with_factory(Arc::new(config), adapters);
    server::serve(listener, manager, shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("ctrl-c received");
}
