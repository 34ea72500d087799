use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use lcrmeter_core::meter::LcrMeter;
use lcrmeter_server::{api, config::ServerConfig, AppState};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "lcrmeter-server")]
#[command(about = "HTTP control and live readings for an LCR meter", version)]
struct Cli {
    /// Path to a JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the config file
    #[arg(long)]
    http_addr: Option<SocketAddr>,

    /// Offer the built-in simulator as the "simulator" port
    #[arg(long)]
    simulator: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "lcrmeter_core=info,lcrmeter_server=info".to_owned());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            info!(path = ?path, "Loading configuration");
            ServerConfig::load(path)?
        }
        None => {
            info!("No configuration file given, using defaults");
            ServerConfig::default()
        }
    };
    if let Some(addr) = cli.http_addr {
        config.http_addr = addr;
    }
    config.simulator |= cli.simulator;

    info!(core_version = lcrmeter_core::VERSION, "Starting lcrmeter-server");
    let meter = Arc::new(LcrMeter::new(config.meter.clone()));
    let cancel = CancellationToken::new();
    let poller = meter.spawn_poller(cancel.clone());

    let app = api::router(AppState::new(meter.clone(), config.simulator));
    let listener = TcpListener::bind(config.http_addr).await?;
    info!(http_addr = %config.http_addr, simulator = config.simulator, "HTTP server listening");

    let shutdown = cancel.clone();
    tokio::select! {
        result = axum::serve(listener, app).with_graceful_shutdown(async move {
            shutdown.cancelled().await;
        }) => {
            if let Err(e) = result {
                error!(error = ?e, "HTTP server error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down");
        }
    }

    cancel.cancel();
    if let Err(e) = poller.await {
        error!(error = %e, "poller task failed");
    }
    meter.disconnect();
    info!("HTTP server shut down");

    Ok(())
}
