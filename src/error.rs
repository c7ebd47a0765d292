//! Top-level error type for floodway
//!
//! Each subsystem defines its own thiserror enum next to its code; this
//! aggregate exists for the layers (server handlers, main) that have to
//! speak about all of them at once.

use thiserror::Error;

/// Main error type for floodway operations.
#[derive(Debug, Error)]
pub enum FloodwayError {
    /// Configuration loading or validation failed.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Graph load, update or query failed.
    #[error("graph error: {0}")]
    Graph(#[from] crate::graph::GraphError),

    /// Raster load or decode failed.
    #[error("raster error: {0}")]
    Raster(#[from] crate::raster::RasterError),

    /// The fusion commit failed.
    #[error("fusion error: {0}")]
    Fusion(#[from] crate::fusion::FusionError),

    /// Routing failed.
    #[error("routing error: {0}")]
    Route(#[from] crate::planner::RouteError),

    /// A mailbox send failed.
    #[error("messaging error: {0}")]
    Messaging(#[from] crate::messaging::SendError),

    /// An agent could not be built or stepped.
    #[error("agent error: {0}")]
    Agent(#[from] crate::agents::AgentError),

    /// A tick aborted.
    #[error("tick error: {0}")]
    Tick(#[from] crate::orchestrator::TickError),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
