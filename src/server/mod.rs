//! HTTP/WebSocket server
//!
//! Router construction is separate from serving so tests can bind port 0 and
//! drive the same application the binary runs.

pub mod routes;
pub mod ws;

use crate::agents::evacuation::ShelterRoster;
use crate::config::AppConfig;
use crate::error::FloodwayError;
use crate::graph::{RoadGraph, graphml};
use crate::messaging::MailboxRouter;
use crate::orchestrator::scheduler::RefreshScheduler;
use crate::orchestrator::{OrchestratorEvent, TickOrchestrator};
use crate::raster::DepthGridService;
use axum::Router;
use axum::routing::{get, post};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, broadcast};
use tracing::{info, warn};

/// Everything the handlers need, cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    /// Full service configuration.
    pub config: AppConfig,
    /// The shared road graph.
    pub graph: Arc<RoadGraph>,
    /// The flood-depth raster service.
    pub raster: Arc<DepthGridService>,
    /// The tick orchestrator, serialized behind an async mutex.
    pub orchestrator: Arc<Mutex<TickOrchestrator>>,
    /// The upstream refresh scheduler.
    pub scheduler: Arc<RefreshScheduler>,
    /// The loaded shelter roster.
    pub shelters: Arc<ShelterRoster>,
    /// Broadcast channel feeding the WebSocket clients.
    pub events: broadcast::Sender<OrchestratorEvent>,
}

/// Loads every artifact and wires the subsystems together.
pub async fn build_state(config: AppConfig) -> Result<AppState, FloodwayError> {
    config.validate()?;

    let document = graphml::read_network(&config.data.graph_path)?;
    let graph = Arc::new(RoadGraph::from_parts(
        document.nodes,
        document.edges,
        config.graph.spatial_grid_deg,
        config.lock_deadline(),
    )?);
    {
        let view = graph.view().await;
        info!(
            nodes = view.node_count(),
            edges = view.edge_count(),
            "road network loaded"
        );
    }

    let raster = Arc::new(DepthGridService::new(
        &config.raster,
        config.data.raster_dir.clone(),
    ));

    let shelters = Arc::new(match &config.data.shelters_path {
        Some(path) => {
            let roster = ShelterRoster::from_csv_path(path)?;
            info!(shelters = roster.len(), "shelter roster loaded");
            roster
        }
        None => {
            warn!("no shelter roster configured, evacuation routing disabled");
            ShelterRoster::default()
        }
    });

    let router = MailboxRouter::new(config.send_timeout());
    let scheduler = RefreshScheduler::new(
        Arc::clone(&router),
        Duration::from_secs(config.scheduler.scheduler_interval_s),
    );
    let (events, _) = broadcast::channel(256);

    let orchestrator = TickOrchestrator::new(
        config.clone(),
        Arc::clone(&graph),
        Arc::clone(&raster),
        Arc::clone(&router),
        Arc::clone(&shelters),
        scheduler.stats(),
        events.clone(),
    )?;

    Ok(AppState {
        config,
        graph,
        raster,
        orchestrator: Arc::new(Mutex::new(orchestrator)),
        scheduler,
        shelters,
        events,
    })
}

/// Builds the application router with every endpoint attached.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/route", post(routes::route))
        .route("/evacuate", post(routes::evacuate))
        .route("/admin/collect-flood-data", post(routes::trigger_collection))
        .route("/scheduler/status", get(routes::scheduler_status))
        .route("/scheduler/stats", get(routes::scheduler_stats))
        .route("/scheduler/trigger", post(routes::trigger_collection))
        .route("/simulation/start", post(routes::simulation_start))
        .route("/simulation/stop", post(routes::simulation_stop))
        .route("/simulation/reset", post(routes::simulation_reset))
        .route("/simulation/status", get(routes::simulation_status))
        .route("/admin/geotiff/enable", post(routes::geotiff_enable))
        .route("/admin/geotiff/disable", post(routes::geotiff_disable))
        .route("/admin/geotiff/status", get(routes::geotiff_status))
        .route(
            "/admin/geotiff/set-scenario",
            post(routes::geotiff_set_scenario),
        )
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}

/// Binds the configured address.
pub async fn bind(config: &AppConfig) -> Result<(TcpListener, SocketAddr), std::io::Error> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("{e}")))?;
    let listener = TcpListener::bind(addr).await?;
    let actual = listener.local_addr()?;
    Ok((listener, actual))
}

/// Binds port 0 on localhost (tests).
pub async fn bind_available_port() -> Result<(TcpListener, SocketAddr), std::io::Error> {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
    let actual = listener.local_addr()?;
    Ok((listener, actual))
}

/// Serves the application on the given listener.
pub async fn serve(listener: TcpListener, router: Router) -> Result<(), std::io::Error> {
    axum::serve(listener, router)
        .await
        .map_err(std::io::Error::other)
}
