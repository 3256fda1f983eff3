use anyhow::{Context, Result};
use camgate_api::{AppState, GatewayServer};
use camgate_core::{CommandFacade, DiscoveryEngine, FacadeOptions, GatewayConfig};
use camgate_device_onvif::{OnvifConnector, WsDiscoveryProbe};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// camgate - HTTP gateway for ONVIF cameras
#[derive(Parser, Debug)]
#[command(name = "camgate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (TOML). Without it, <config dir>/camgate/config.toml is read if present
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address the API listens on
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Port of the ONVIF device service on cameras
    #[arg(long)]
    device_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,camgate=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    tracing::info!("Starting camgate {}", env!("CARGO_PKG_VERSION"));

    let config = resolve_config(&cli)?;
    tracing::debug!(?config, "Effective configuration");

    let connector = OnvifConnector::new(config.device_port, config.device_timeout())
        .context("Failed to build HTTP client")?;
    let facade = CommandFacade::new(
        Arc::new(connector),
        FacadeOptions {
            call_timeout: config.device_timeout(),
            echo_stream_uri: config.echo_stream_uri,
        },
    );
    let discovery = DiscoveryEngine::new(
        Arc::new(WsDiscoveryProbe::new()),
        config.discovery_scope.clone(),
        config.discovery_timeout(),
    );

    let state = AppState {
        facade,
        discovery,
        focus_speed: config.focus_speed,
    };

    let mut server = GatewayServer::new(config.bind_addr, state);
    server.start().await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    tracing::info!("Shutting down");
    server.stop().await;

    Ok(())
}

/// Load the config file (explicit or default location), then apply CLI overrides
fn resolve_config(cli: &Cli) -> Result<GatewayConfig> {
    let path = match &cli.config {
        Some(path) => Some(path.clone()),
        None => default_config_path().filter(|p| p.exists()),
    };

    let config = match path {
        Some(path) => {
            tracing::info!("Config file: {}", path.display());
            GatewayConfig::load(&path)?
        }
        None => {
            tracing::info!("No config file, using defaults");
            GatewayConfig::default()
        }
    };

    let config = apply_overrides(config, cli);
    config.validate()?;
    Ok(config)
}

fn apply_overrides(mut config: GatewayConfig, cli: &Cli) -> GatewayConfig {
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }
    if let Some(port) = cli.device_port {
        config.device_port = port;
    }
    config
}

/// Get the default config path (platform-specific)
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("camgate").join("config.toml"))
}
