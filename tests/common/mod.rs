//! Shared fixtures for the integration suite.
#![allow(dead_code)] // not every test binary uses every fixture

use floodway::domain_types::{NodeId, RoadClass};
use floodway::geo::Coord;
use floodway::graph::{EdgeDescriptor, RoadGraph, RoadNode};
use std::time::Duration;

/// Node shorthand.
pub fn node(id: i64, lat: f64, lon: f64) -> RoadNode {
    RoadNode {
        id: NodeId::new(id),
        coord: Coord::new(lat, lon).unwrap(),
    }
}

/// Edge shorthand.
pub fn edge(u: i64, v: i64, length_m: f64) -> EdgeDescriptor {
    EdgeDescriptor {
        u: NodeId::new(u),
        v: NodeId::new(v),
        key: None,
        length_m,
        road_class: RoadClass::Residential,
        name: None,
    }
}

/// Named edge shorthand.
pub fn named_edge(u: i64, v: i64, length_m: f64, name: &str) -> EdgeDescriptor {
    EdgeDescriptor {
        name: Some(name.to_string()),
        ..edge(u, v, length_m)
    }
}

/// A 2x2 grid with bidirectional 150 m edges:
///
/// ```text
///   2 ---- 4        node 1 = (14.6000, 121.0000)  south-west
///   |      |        node 2 = (14.6010, 121.0000)  north-west
///   1 ---- 3        node 3 = (14.6000, 121.0010)  south-east
///                   node 4 = (14.6010, 121.0010)  north-east
/// ```
///
/// Adjacent nodes are ~110 m apart, so the declared 150 m length keeps the
/// great-circle heuristic admissible.
pub fn square_graph() -> RoadGraph {
    RoadGraph::from_parts(
        vec![
            node(1, 14.6000, 121.0000),
            node(2, 14.6010, 121.0000),
            node(3, 14.6000, 121.0010),
            node(4, 14.6010, 121.0010),
        ],
        vec![
            edge(1, 2, 150.0),
            edge(2, 1, 150.0),
            edge(1, 3, 150.0),
            edge(3, 1, 150.0),
            edge(2, 4, 150.0),
            edge(4, 2, 150.0),
            edge(3, 4, 150.0),
            edge(4, 3, 150.0),
        ],
        0.01,
        Duration::from_secs(1),
    )
    .unwrap()
}

/// The south-west and north-east corner coordinates of the square graph.
pub fn corners() -> (Coord, Coord) {
    (
        Coord::new(14.6000, 121.0000).unwrap(),
        Coord::new(14.6010, 121.0010).unwrap(),
    )
}
