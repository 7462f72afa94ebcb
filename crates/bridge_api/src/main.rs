use anyhow::Context;
use bridge_api::{AppState, create_app};
use bridge_engine::config::{BackendKind, BridgeConfig};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Command line arguments for the bridge server
#[derive(Parser, Debug)]
#[command(name = "beckn-ocpi-bridge")]
#[command(about = "Beckn to OCPI EV charging bridge")]
struct Args {
    /// Path to the bridge configuration JSON file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to bind the server to
    #[arg(short, long, default_value = "3000")]
    port: u16,

    /// Serve from the in-memory inventory and session store
    #[arg(long)]
    mock: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = match &args.config {
        Some(path) => {
            let config = BridgeConfig::load(path)
                .with_context(|| format!("Failed to load config file '{}'", path.display()))?;
            tracing::info!("Loaded bridge config from {}", path.display());
            config
        }
        None => BridgeConfig::default(),
    };
    config = config.with_env_overrides(|key| std::env::var(key).ok());
    if args.mock {
        config.backend = BackendKind::Mock;
    }
    tracing::info!(
        backend = ?config.backend,
        tariff_decomposition = config.tariff_decomposition_enabled,
        "bridge configured"
    );

    let app_state = AppState::from_config(config).context("Failed to set up OCPI collaborators")?;
    let app = create_app(app_state);

    let bind_addr = format!("0.0.0.0:{}", args.port);
    tracing::info!("Starting server on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
