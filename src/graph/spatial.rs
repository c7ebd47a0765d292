//! Grid-cell spatial index over edge midpoints.
//!
//! Cells are `cell_deg` degrees on a side (0.01 deg is roughly 1.1 km at the
//! equator), keyed by the floored longitude/latitude cell of each edge's
//! midpoint. A radial query expands the metric radius into degree deltas,
//! walks the covered cell window and leaves the exact Haversine filtering to
//! the caller.

use crate::geo::{Coord, radius_to_degrees};
use std::collections::HashMap;

/// Index from grid cell to the edge slots whose midpoints fall inside it.
#[derive(Debug, Clone, Default)]
pub struct SpatialIndex {
    cell_deg: f64,
    cells: HashMap<(i32, i32), Vec<usize>>,
    indexed: usize,
}

impl SpatialIndex {
    /// Builds the index from edge midpoints. Called once per graph load.
    #[must_use]
    pub fn build(midpoints: impl Iterator<Item = Coord>, cell_deg: f64) -> Self {
        let mut cells: HashMap<(i32, i32), Vec<usize>> = HashMap::new();
        let mut indexed = 0;
        for (slot, midpoint) in midpoints.enumerate() {
            cells
                .entry(Self::cell_of(&midpoint, cell_deg))
                .or_default()
                .push(slot);
            indexed += 1;
        }
        Self {
            cell_deg,
            cells,
            indexed,
        }
    }

    fn cell_of(coord: &Coord, cell_deg: f64) -> (i32, i32) {
        let x = (coord.lon / cell_deg).floor();
        let y = (coord.lat / cell_deg).floor();
        (x as i32, y as i32)
    }

    /// Number of indexed edges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.indexed
    }

    /// True when nothing has been indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indexed == 0
    }

    /// Edge slots in every cell the radius could touch around `center`.
    ///
    /// Over-approximates: callers must still verify the Haversine distance of
    /// each candidate midpoint against the radius.
    #[must_use]
    pub fn candidates(&self, center: &Coord, radius_m: f64) -> Vec<usize> {
        if self.is_empty() || radius_m <= 0.0 {
            return Vec::new();
        }
        let deltas = radius_to_degrees(radius_m, center.lat);
        let span_x = (deltas.delta_lon / self.cell_deg).ceil() as i32;
        let span_y = (deltas.delta_lat / self.cell_deg).ceil() as i32;
        let (cx, cy) = Self::cell_of(center, self.cell_deg);

        let mut out = Vec::new();
        for x in (cx - span_x)..=(cx + span_x) {
            for y in (cy - span_y)..=(cy + span_y) {
                if let Some(slots) = self.cells.get(&(x, y)) {
                    out.extend_from_slice(slots);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(lat: f64, lon: f64) -> Coord {
        Coord::new(lat, lon).unwrap()
    }

    #[test]
    fn build_counts_every_midpoint() {
        let midpoints = vec![coord(14.60, 121.00), coord(14.61, 121.01), coord(14.62, 121.02)];
        let index = SpatialIndex::build(midpoints.into_iter(), 0.01);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn candidates_cover_adjacent_cells() {
        // Two midpoints in neighbouring 0.01-degree cells, ~1.2 km apart.
        let midpoints = vec![coord(14.600, 121.000), coord(14.610, 121.005)];
        let index = SpatialIndex::build(midpoints.into_iter(), 0.01);

        let hits = index.candidates(&coord(14.605, 121.002), 1500.0);
        assert!(hits.contains(&0));
        assert!(hits.contains(&1));
    }

    #[test]
    fn tight_radius_skips_far_cells() {
        let midpoints = vec![coord(14.600, 121.000), coord(14.700, 121.100)];
        let index = SpatialIndex::build(midpoints.into_iter(), 0.01);

        let hits = index.candidates(&coord(14.600, 121.000), 200.0);
        assert!(hits.contains(&0));
        assert!(!hits.contains(&1));
    }

    #[test]
    fn empty_index_returns_no_candidates() {
        let index = SpatialIndex::default();
        assert!(index.candidates(&coord(0.0, 0.0), 1000.0).is_empty());
    }
}
