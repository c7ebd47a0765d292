//! Geographic primitives shared by the graph store, fusion engine and planner.

use geo::HaversineDistance;
use geo::Point;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Meters per degree of latitude, the flat-earth constant used for cheap
/// radius-to-degree expansion before the exact Haversine filter.
pub const METERS_PER_DEGREE: f64 = 111_000.0;

/// Geographic coordinate errors.
#[derive(Debug, Error, PartialEq)]
pub enum GeoError {
    /// Latitude or longitude is non-finite or outside WGS84 bounds.
    #[error("coordinate out of range: lat={lat}, lon={lon}")]
    InvalidCoordinate {
        /// The rejected latitude.
        lat: f64,
        /// The rejected longitude.
        lon: f64,
    },
}

/// A WGS84 coordinate validated to lie within latitude/longitude bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    /// Latitude in degrees, `-90..=90`.
    pub lat: f64,
    /// Longitude in degrees, `-180..=180`.
    pub lon: f64,
}

impl Coord {
    /// Builds a coordinate, rejecting non-finite or out-of-range values.
    pub fn new(lat: f64, lon: f64) -> Result<Self, GeoError> {
        if !lat.is_finite() || !lon.is_finite() || !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(GeoError::InvalidCoordinate { lat, lon });
        }
        Ok(Self { lat, lon })
    }

    /// Great-circle distance to another coordinate in meters.
    #[must_use]
    pub fn haversine_m(&self, other: &Coord) -> f64 {
        let a = Point::new(self.lon, self.lat);
        let b = Point::new(other.lon, other.lat);
        a.haversine_distance(&b)
    }

    /// Midpoint with `other` by simple coordinate averaging.
    ///
    /// Adequate for road-segment midpoints; segments are far shorter than
    /// anything where spherical interpolation would matter.
    #[must_use]
    pub fn midpoint(&self, other: &Coord) -> Coord {
        Coord {
            lat: self.lat.midpoint(other.lat),
            lon: self.lon.midpoint(other.lon),
        }
    }
}

/// Expansion of a metric radius into degree deltas around a center latitude.
///
/// `delta_lon` widens toward the poles; the caller still applies the exact
/// Haversine check to every candidate, so this only has to over-approximate.
#[derive(Debug, Clone, Copy)]
pub struct DegreeDeltas {
    /// Latitude half-window in degrees.
    pub delta_lat: f64,
    /// Longitude half-window in degrees.
    pub delta_lon: f64,
}

/// Converts a search radius in meters to degree deltas at the given latitude.
#[must_use]
pub fn radius_to_degrees(radius_m: f64, center_lat: f64) -> DegreeDeltas {
    let delta_lat = radius_m / METERS_PER_DEGREE;
    let cos_lat = center_lat.to_radians().cos().abs().max(1e-6);
    let delta_lon = radius_m / (METERS_PER_DEGREE * cos_lat);
    DegreeDeltas {
        delta_lat,
        delta_lon,
    }
}
