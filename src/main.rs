//! Floodway server entry point.

use anyhow::Result;
use clap::Parser;
use floodway::config::AppConfig;
use floodway::orchestrator::spawn_tick_driver;
use floodway::server;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "floodway", about = "Flood-aware evacuation routing service")]
struct Cli {
    /// Configuration file (TOML). Defaults apply for missing fields.
    #[arg(long, default_value = "floodway.toml")]
    config: PathBuf,

    /// Override the road network document path.
    #[arg(long)]
    graph: Option<PathBuf>,

    /// Override the raster bundle directory.
    #[arg(long)]
    rasters: Option<PathBuf>,

    /// Override the listen port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("floodway=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let mut config = if cli.config.exists() {
        AppConfig::load(&cli.config)?
    } else {
        info!(path = %cli.config.display(), "no config file, using defaults");
        AppConfig::default()
    };
    if let Some(graph) = cli.graph {
        config.data.graph_path = graph;
    }
    if let Some(rasters) = cli.rasters {
        config.data.raster_dir = rasters;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let state = server::build_state(config.clone()).await?;

    // Background machinery: periodic ticks and upstream refreshes.
    let _driver = spawn_tick_driver(
        state.orchestrator.clone(),
        Duration::from_millis(config.tick.tick_interval_ms),
    );
    state.scheduler.start();

    let (listener, addr) = server::bind(&config).await?;
    info!(%addr, "floodway listening");
    let app = server::create_router(state);
    server::serve(listener, app).await?;

    Ok(())
}
