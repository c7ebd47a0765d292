//! Raster flood-depth service
//!
//! Serves depth-in-meters samples from the precomputed per-scenario grids
//! (`{return_period}/{return_period}-{time_step}.tif`). Geo-alignment is
//! manual: the configured center and base coverage define the bounds, and any
//! CRS metadata embedded in the files is ignored. Decoded grids are immutable
//! and held in a bounded LRU cache behind a mutex.

use crate::config::RasterConfig;
use crate::domain_types::{EdgeRef, ReturnPeriod, TimeStep};
use crate::geo::Coord;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Depth below which a raster sample is treated as dry ground.
const DRY_DEPTH_M: f64 = 0.01;

/// Raster service errors.
#[derive(Debug, Error)]
pub enum RasterError {
    /// No file exists for the requested scenario.
    #[error("raster file not found: {path}")]
    MissingFile {
        /// The path that was probed.
        path: PathBuf,
    },

    /// The file exists but is not a usable float grid.
    #[error("failed to decode raster {path}: {reason}")]
    Decode {
        /// The offending file.
        path: PathBuf,
        /// Why decoding failed.
        reason: String,
    },

    /// Decoding did not finish within the load deadline.
    #[error("raster load exceeded {deadline:?}: {path}")]
    Deadline {
        /// The offending file.
        path: PathBuf,
        /// The deadline that was exceeded.
        deadline: Duration,
    },

    /// The blocking decode task was cancelled or panicked.
    #[error("raster decode task was aborted: {path}")]
    TaskFailed {
        /// The file being decoded.
        path: PathBuf,
    },
}

/// Identifies one depth grid within the bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScenarioKey {
    /// Recurrence-interval category.
    pub return_period: ReturnPeriod,
    /// Hourly index within the category.
    pub time_step: TimeStep,
}

impl ScenarioKey {
    /// Builds a scenario key.
    #[must_use]
    pub fn new(return_period: ReturnPeriod, time_step: TimeStep) -> Self {
        Self {
            return_period,
            time_step,
        }
    }

    fn file_path(&self, root: &Path) -> PathBuf {
        root.join(self.return_period.as_str()).join(format!(
            "{}-{}.tif",
            self.return_period.as_str(),
            self.time_step.as_u8()
        ))
    }
}

impl std::fmt::Display for ScenarioKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.return_period, self.time_step)
    }
}

/// Geographic bounds of a grid, derived from the manual alignment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoBounds {
    /// Southern edge.
    pub min_lat: f64,
    /// Northern edge.
    pub max_lat: f64,
    /// Western edge.
    pub min_lon: f64,
    /// Eastern edge.
    pub max_lon: f64,
}

/// Manual geo-alignment configuration.
#[derive(Debug, Clone, Copy)]
pub struct RasterAlignment {
    /// Latitude of the coverage center.
    pub center_lat: f64,
    /// Longitude of the coverage center.
    pub center_lon: f64,
    /// Degrees of coverage along the longer grid axis.
    pub base_coverage_deg: f64,
}

impl RasterAlignment {
    /// Bounds for a grid of the given pixel shape.
    ///
    /// Wide grids spread the base coverage along the x axis; tall grids get a
    /// stretched latitude coverage so the bundle's portrait sheets line up
    /// with the basin.
    #[must_use]
    pub fn bounds_for(&self, width: usize, height: usize) -> GeoBounds {
        let aspect = width as f64 / height as f64;
        let (cov_w, cov_h) = if aspect > 1.0 {
            (self.base_coverage_deg, self.base_coverage_deg / aspect)
        } else {
            let cov_h = self.base_coverage_deg * 1.5;
            (cov_h * aspect, cov_h)
        };
        GeoBounds {
            min_lat: self.center_lat - cov_h / 2.0,
            max_lat: self.center_lat + cov_h / 2.0,
            min_lon: self.center_lon - cov_w / 2.0,
            max_lon: self.center_lon + cov_w / 2.0,
        }
    }
}

/// One decoded depth grid with its derived bounds.
#[derive(Debug)]
pub struct DepthGrid {
    width: usize,
    height: usize,
    data: Vec<f32>,
    bounds: GeoBounds,
}

impl DepthGrid {
    /// Builds a grid from decoded samples. `data` is row-major, north row
    /// first (the y axis is inverted relative to latitude).
    #[must_use]
    pub fn new(width: usize, height: usize, data: Vec<f32>, bounds: GeoBounds) -> Self {
        debug_assert_eq!(data.len(), width * height);
        Self {
            width,
            height,
            data,
            bounds,
        }
    }

    /// Grid shape as `(width, height)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Bounds derived from the manual alignment.
    #[must_use]
    pub fn bounds(&self) -> GeoBounds {
        self.bounds
    }

    /// Pixel index of a coordinate, or `None` outside the bounds.
    #[must_use]
    pub fn pixel(&self, coord: &Coord) -> Option<(usize, usize)> {
        let b = &self.bounds;
        let lon_span = b.max_lon - b.min_lon;
        let lat_span = b.max_lat - b.min_lat;
        if lon_span <= 0.0 || lat_span <= 0.0 {
            return None;
        }
        let col = ((coord.lon - b.min_lon) / lon_span * self.width as f64).floor();
        let row = ((1.0 - (coord.lat - b.min_lat) / lat_span) * self.height as f64).floor();
        if col < 0.0 || row < 0.0 {
            return None;
        }
        let (col, row) = (col as usize, row as usize);
        (col < self.width && row < self.height).then_some((row, col))
    }

    /// Center coordinate of a pixel. Inverse of [`Self::pixel`] up to
    /// sub-pixel position.
    #[must_use]
    pub fn pixel_center(&self, row: usize, col: usize) -> Coord {
        let b = &self.bounds;
        let lon = b.min_lon + (col as f64 + 0.5) / self.width as f64 * (b.max_lon - b.min_lon);
        let lat =
            b.min_lat + (1.0 - (row as f64 + 0.5) / self.height as f64) * (b.max_lat - b.min_lat);
        Coord { lat, lon }
    }

    /// Flood depth at a coordinate in meters. `None` outside the bounds;
    /// samples at or below the dry threshold read as zero.
    #[must_use]
    pub fn depth_at(&self, coord: &Coord) -> Option<f64> {
        let (row, col) = self.pixel(coord)?;
        let raw = f64::from(self.data[row * self.width + col]);
        if !raw.is_finite() || raw <= DRY_DEPTH_M {
            Some(0.0)
        } else {
            Some(raw)
        }
    }
}

/// The shared flood-depth service.
pub struct DepthGridService {
    root: PathBuf,
    alignment: RasterAlignment,
    cache: Mutex<LruCache<ScenarioKey, Arc<DepthGrid>>>,
    enabled: AtomicBool,
    load_deadline: Duration,
}

impl DepthGridService {
    /// Builds the service over a raster bundle directory.
    #[must_use]
    pub fn new(config: &RasterConfig, root: PathBuf) -> Self {
        let capacity = NonZeroUsize::new(config.cache_capacity.max(1))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            root,
            alignment: RasterAlignment {
                center_lat: config.raster_center_lat,
                center_lon: config.raster_center_lon,
                base_coverage_deg: config.raster_base_coverage_deg,
            },
            cache: Mutex::new(LruCache::new(capacity)),
            enabled: AtomicBool::new(config.geotiff_enabled),
            load_deadline: Duration::from_secs(config.load_deadline_s),
        }
    }

    /// Whether raster sampling participates in fusion.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Enables or disables raster sampling.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// The manual alignment in force.
    #[must_use]
    pub fn alignment(&self) -> RasterAlignment {
        self.alignment
    }

    /// Fetches (or loads) the grid for a scenario.
    pub async fn grid(&self, key: ScenarioKey) -> Result<Arc<DepthGrid>, RasterError> {
        if let Some(grid) = self.cache.lock().unwrap().get(&key).cloned() {
            return Ok(grid);
        }

        let path = key.file_path(&self.root);
        if !path.exists() {
            return Err(RasterError::MissingFile { path });
        }

        let alignment = self.alignment;
        let decode_path = path.clone();
        let decode = tokio::task::spawn_blocking(move || decode_grid(&decode_path, alignment));
        let grid = match tokio::time::timeout(self.load_deadline, decode).await {
            Err(_) => {
                return Err(RasterError::Deadline {
                    path,
                    deadline: self.load_deadline,
                });
            }
            Ok(Err(_)) => return Err(RasterError::TaskFailed { path }),
            Ok(Ok(result)) => Arc::new(result?),
        };

        debug!(scenario = %key, shape = ?grid.shape(), "depth grid loaded");
        self.cache.lock().unwrap().put(key, Arc::clone(&grid));
        Ok(grid)
    }

    /// Depth at one coordinate for a scenario.
    pub async fn depth_at(
        &self,
        lat: f64,
        lon: f64,
        key: ScenarioKey,
    ) -> Result<Option<f64>, RasterError> {
        let Ok(coord) = Coord::new(lat, lon) else {
            return Ok(None);
        };
        let grid = self.grid(key).await?;
        Ok(grid.depth_at(&coord))
    }

    /// Bulk per-edge depth sampling for the fusion phase. Midpoints outside
    /// the bounds are omitted from the result.
    pub async fn depths_for_edges(
        &self,
        midpoints: &[(EdgeRef, Coord)],
        key: ScenarioKey,
    ) -> Result<HashMap<EdgeRef, f64>, RasterError> {
        let grid = self.grid(key).await?;
        let mut out = HashMap::with_capacity(midpoints.len());
        for (edge, midpoint) in midpoints {
            if let Some(depth) = grid.depth_at(midpoint) {
                out.insert(*edge, depth);
            }
        }
        Ok(out)
    }
}

fn decode_grid(path: &Path, alignment: RasterAlignment) -> Result<DepthGrid, RasterError> {
    let file = std::fs::File::open(path).map_err(|e| RasterError::Decode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut decoder =
        tiff::decoder::Decoder::new(std::io::BufReader::new(file)).map_err(|e| {
            RasterError::Decode {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;
    let (width, height) = decoder.dimensions().map_err(|e| RasterError::Decode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let image = decoder.read_image().map_err(|e| RasterError::Decode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let data: Vec<f32> = match image {
        tiff::decoder::DecodingResult::F32(values) => values,
        tiff::decoder::DecodingResult::F64(values) => {
            values.into_iter().map(|v| v as f32).collect()
        }
        _ => {
            return Err(RasterError::Decode {
                path: path.to_path_buf(),
                reason: "unsupported sample format (expected float samples)".to_string(),
            });
        }
    };

    let (width, height) = (width as usize, height as usize);
    if data.len() != width * height {
        return Err(RasterError::Decode {
            path: path.to_path_buf(),
            reason: format!(
                "sample count {} does not match {width}x{height}",
                data.len()
            ),
        });
    }

    let bounds = alignment.bounds_for(width, height);
    Ok(DepthGrid::new(width, height, data, bounds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn alignment() -> RasterAlignment {
        RasterAlignment {
            center_lat: 14.65,
            center_lon: 121.10,
            base_coverage_deg: 0.06,
        }
    }

    fn grid_with(width: usize, height: usize, data: Vec<f32>) -> DepthGrid {
        let bounds = alignment().bounds_for(width, height);
        DepthGrid::new(width, height, data, bounds)
    }

    #[test]
    fn wide_grid_splits_coverage_by_aspect() {
        let bounds = alignment().bounds_for(300, 100);
        assert_relative_eq!(bounds.max_lon - bounds.min_lon, 0.06);
        assert_relative_eq!(bounds.max_lat - bounds.min_lat, 0.02);
    }

    #[test]
    fn tall_grid_stretches_latitude_coverage() {
        let bounds = alignment().bounds_for(100, 200);
        assert_relative_eq!(bounds.max_lat - bounds.min_lat, 0.09);
        assert_relative_eq!(bounds.max_lon - bounds.min_lon, 0.045);
    }

    #[test]
    fn out_of_bounds_is_none() {
        let grid = grid_with(4, 4, vec![0.5; 16]);
        let far = Coord::new(15.5, 122.5).unwrap();
        assert_eq!(grid.depth_at(&far), None);
    }

    #[test]
    fn shallow_samples_read_as_dry() {
        let grid = grid_with(2, 2, vec![0.005, 0.02, 1.2, f32::NAN]);
        let center = |row, col| grid.pixel_center(row, col);
        assert_eq!(grid.depth_at(&center(0, 0)), Some(0.0));
        assert_relative_eq!(grid.depth_at(&center(0, 1)).unwrap(), 0.02, max_relative = 1e-6);
        assert_relative_eq!(grid.depth_at(&center(1, 0)).unwrap(), 1.2, max_relative = 1e-6);
        assert_eq!(grid.depth_at(&center(1, 1)), Some(0.0));
    }

    #[test]
    fn pixel_round_trip_is_exact_on_indices() {
        let grid = grid_with(7, 5, vec![0.0; 35]);
        for row in 0..5 {
            for col in 0..7 {
                let center = grid.pixel_center(row, col);
                assert_eq!(grid.pixel(&center), Some((row, col)));
            }
        }
    }

    #[tokio::test]
    async fn missing_file_surfaces_as_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = RasterConfig::default();
        let service = DepthGridService::new(&config, dir.path().to_path_buf());
        let key = ScenarioKey::new(ReturnPeriod::Rr02, TimeStep::first());
        assert!(matches!(
            service.grid(key).await,
            Err(RasterError::MissingFile { .. })
        ));
    }
}
