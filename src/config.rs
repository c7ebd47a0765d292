//! Application configuration
//!
//! Every tunable of the service lives here, grouped by subsystem, with the
//! production defaults inline. A TOML file overrides individual fields; the
//! CLI overrides paths and the listen port on top of that.

use crate::domain_types::MailboxCapacity;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field failed a cross-field or range constraint.
    #[error("invalid configuration: {field} - {reason}")]
    Validation {
        /// Dotted path of the offending field.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The configuration file could not be read.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O failure.
        #[from]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML.
    #[error("TOML error: {0}")]
    Toml(String),
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Locations of the shipped artifacts the service loads at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// GraphML-like road network document.
    pub graph_path: PathBuf,
    /// Root directory of the flood-raster bundles (`{rr}/{rr}-{ts}.tif`).
    pub raster_dir: PathBuf,
    /// Evacuation shelter roster CSV.
    pub shelters_path: Option<PathBuf>,
    /// Pre-recorded simulation scenario CSV (simulated collectors).
    pub scenario_path: Option<PathBuf>,
}

/// Tick orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Wall-clock gap between ticks.
    pub tick_interval_ms: u64,
    /// Writer-lock acquisition deadline; exceeding it is fatal for the tick.
    pub lock_deadline_ms: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            lock_deadline_ms: 1000,
        }
    }
}

/// Agent messaging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Bounded depth of every agent mailbox.
    pub mailbox_capacity: MailboxCapacity,
    /// How long a send blocks on a full mailbox before failing.
    pub send_timeout_ms: u64,
    /// How long a REQUEST waits for its AGREE/INFORM before FAILURE.
    pub reply_deadline_s: u64,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: MailboxCapacity::default(),
            send_timeout_ms: 100,
            reply_deadline_s: 10,
        }
    }
}

/// Upstream refresh scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between automatic upstream refreshes.
    pub scheduler_interval_s: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scheduler_interval_s: 300,
        }
    }
}

/// Hazard fusion settings: TTLs, decay rates, weights and propagation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Scout report lifetime in the cache.
    pub scout_ttl_min: i64,
    /// Official reading lifetime in the cache.
    pub flood_ttl_min: i64,
    /// Fast decay for rain-driven scout reports (per minute).
    pub k_scout_fast: f64,
    /// Slow decay once river stations are elevated (per minute).
    pub k_scout_slow: f64,
    /// Decay applied to cached official readings (per minute).
    pub k_official: f64,
    /// Residual decay applied to edge risk between ticks (per minute).
    pub k_spatial_edge: f64,
    /// Scores below this floor collapse to zero and clear the update stamp.
    pub min_risk_floor: f64,
    /// Fusion weight of the raster depth term.
    pub weight_raster: f64,
    /// Fusion weight of the crowdsourced term.
    pub weight_crowd: f64,
    /// Fusion weight of the system-wide official term.
    pub weight_official: f64,
    /// How far a geocoded report reaches, in meters.
    pub scout_propagation_radius_m: f64,
    /// Trend epsilon on the average risk, per minute.
    pub trend_epsilon_per_min: f64,
    /// Entries kept in each edge's risk history ring buffer.
    pub risk_history_len: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            scout_ttl_min: 45,
            flood_ttl_min: 90,
            k_scout_fast: 0.10,
            k_scout_slow: 0.03,
            k_official: 0.05,
            k_spatial_edge: 0.08,
            min_risk_floor: 0.01,
            weight_raster: 0.5,
            weight_crowd: 0.3,
            weight_official: 0.2,
            scout_propagation_radius_m: 800.0,
            trend_epsilon_per_min: 0.001,
            risk_history_len: 16,
        }
    }
}

/// Raster flood-depth service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterConfig {
    /// Whether raster sampling participates in fusion at startup.
    pub geotiff_enabled: bool,
    /// Latitude of the manual alignment center.
    pub raster_center_lat: f64,
    /// Longitude of the manual alignment center.
    pub raster_center_lon: f64,
    /// Degrees of coverage along the longer grid axis.
    pub raster_base_coverage_deg: f64,
    /// Decoded grids kept in the LRU cache.
    pub cache_capacity: usize,
    /// Deadline for decoding one grid from disk.
    pub load_deadline_s: u64,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            geotiff_enabled: true,
            raster_center_lat: 14.65,
            raster_center_lon: 121.10,
            raster_base_coverage_deg: 0.06,
            cache_capacity: 32,
            load_deadline_s: 5,
        }
    }
}

/// Path planner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Farthest a query coordinate may sit from its snapped node.
    pub max_snap_m: f64,
    /// Default risk above which an edge is impassable.
    pub impassability_threshold: f64,
    /// Edge-set Jaccard above which an alternative route is a duplicate.
    pub alternative_jaccard_max: f64,
    /// Shelters considered per evacuation request.
    pub n_shelter_candidates: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_snap_m: 500.0,
            impassability_threshold: 0.9,
            alternative_jaccard_max: 0.85,
            n_shelter_candidates: 5,
        }
    }
}

/// Graph store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Spatial index cell size in degrees (~1.1 km at the equator).
    pub spatial_grid_deg: f64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            spatial_grid_deg: 0.01,
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Artifact locations.
    pub data: DataConfig,
    /// Tick orchestration settings.
    pub tick: TickConfig,
    /// Agent messaging settings.
    pub messaging: MessagingConfig,
    /// Upstream refresh scheduler settings.
    pub scheduler: SchedulerConfig,
    /// Hazard fusion settings.
    pub fusion: FusionConfig,
    /// Raster service settings.
    pub raster: RasterConfig,
    /// Path planner settings.
    pub planner: PlannerConfig,
    /// Graph store settings.
    pub graph: GraphConfig,
}

impl AppConfig {
    /// Loads configuration from a TOML file, falling back to defaults for
    /// any field the file omits.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw).map_err(|e| ConfigError::Toml(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn positive(field: &str, value: f64) -> Result<(), ConfigError> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::Validation {
                    field: field.to_string(),
                    reason: format!("must be positive and finite, got {value}"),
                })
            }
        }

        positive("fusion.k_scout_fast", self.fusion.k_scout_fast)?;
        positive("fusion.k_scout_slow", self.fusion.k_scout_slow)?;
        positive("fusion.k_official", self.fusion.k_official)?;
        positive("fusion.k_spatial_edge", self.fusion.k_spatial_edge)?;
        positive("fusion.scout_propagation_radius_m", self.fusion.scout_propagation_radius_m)?;
        positive("graph.spatial_grid_deg", self.graph.spatial_grid_deg)?;
        positive("planner.max_snap_m", self.planner.max_snap_m)?;
        positive("raster.raster_base_coverage_deg", self.raster.raster_base_coverage_deg)?;

        let weight_sum =
            self.fusion.weight_raster + self.fusion.weight_crowd + self.fusion.weight_official;
        if !(0.0..=1.0 + 1e-9).contains(&weight_sum) {
            return Err(ConfigError::Validation {
                field: "fusion.weights".to_string(),
                reason: format!("raster+crowd+official must not exceed 1.0, got {weight_sum}"),
            });
        }

        if !(0.0..1.0).contains(&self.fusion.min_risk_floor) {
            return Err(ConfigError::Validation {
                field: "fusion.min_risk_floor".to_string(),
                reason: "must lie in [0, 1)".to_string(),
            });
        }

        if !(0.0..=1.0).contains(&self.planner.impassability_threshold) {
            return Err(ConfigError::Validation {
                field: "planner.impassability_threshold".to_string(),
                reason: "must lie in [0, 1]".to_string(),
            });
        }

        if self.raster.cache_capacity < 1 {
            return Err(ConfigError::Validation {
                field: "raster.cache_capacity".to_string(),
                reason: "must hold at least one raster".to_string(),
            });
        }

        Ok(())
    }

    /// Mailbox send timeout as a `Duration`.
    #[must_use]
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.messaging.send_timeout_ms)
    }

    /// Request/reply deadline as a `Duration`.
    #[must_use]
    pub fn reply_deadline(&self) -> Duration {
        Duration::from_secs(self.messaging.reply_deadline_s)
    }

    /// Writer-lock acquisition deadline as a `Duration`.
    #[must_use]
    pub fn lock_deadline(&self) -> Duration {
        Duration::from_millis(self.tick.lock_deadline_ms)
    }
}
