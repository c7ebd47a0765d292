//! Mutable road graph store
//!
//! Owns every node and edge of the road network. Everything else refers to
//! edges by their `(u, v, key)` address. Risk writes go through the store's
//! update API under an exclusive writer lock with an acquisition deadline;
//! readers (planner, snapshots) share the lock and therefore observe either
//! the full pre-commit or full post-commit risk state.

pub mod graphml;
pub mod spatial;

use crate::domain_types::{EdgeRef, LengthMeters, NodeId, RiskScore, RoadClass};
use crate::geo::{Coord, GeoError};
use chrono::{DateTime, Utc};
use spatial::SpatialIndex;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::warn;

/// Graph store errors.
#[derive(Debug, Error)]
pub enum GraphError {
    /// An edge descriptor references a node absent from the document.
    #[error("edge references unknown node {0}")]
    MissingNode(NodeId),

    /// Two edges carry the same explicit `(u, v, key)` address.
    #[error("duplicate edge address {0}")]
    DuplicateEdge(EdgeRef),

    /// An edge has a missing, zero or negative length.
    #[error("edge {u}->{v} has no usable length: {reason}")]
    InvalidLength {
        /// Source node of the offending edge.
        u: NodeId,
        /// Target node of the offending edge.
        v: NodeId,
        /// Why the length was rejected.
        reason: String,
    },

    /// A query coordinate is outside WGS84 bounds.
    #[error(transparent)]
    InvalidCoordinate(#[from] GeoError),

    /// A single-edge update addressed an edge the graph does not hold.
    #[error("unknown edge {0}")]
    UnknownEdge(EdgeRef),

    /// The writer lock was not acquired within the deadline.
    #[error("graph write lock not acquired within {0:?}")]
    LockDeadline(Duration),

    /// The network document is malformed.
    #[error("network document error: {0}")]
    Document(String),

    /// The network document could not be read.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O failure.
        #[from]
        source: std::io::Error,
    },
}

/// A road intersection. Immutable after graph load.
#[derive(Debug, Clone)]
pub struct RoadNode {
    /// Stable identifier from the network source.
    pub id: NodeId,
    /// Intersection position.
    pub coord: Coord,
}

/// A directed road segment. Only `risk` and `last_risk_update` mutate after
/// load, and only through the store's update API.
#[derive(Debug, Clone)]
pub struct RoadEdge {
    /// Source node.
    pub u: NodeId,
    /// Target node.
    pub v: NodeId,
    /// Discriminator among parallel edges.
    pub key: u32,
    /// Physical length.
    pub length: LengthMeters,
    /// Functional road classification.
    pub road_class: RoadClass,
    /// Street name, when the source provides one.
    pub name: Option<String>,
    /// Current integrated flood risk.
    pub risk: RiskScore,
    /// When the risk was last committed; cleared when floored to zero.
    pub last_risk_update: Option<DateTime<Utc>>,
    /// Segment midpoint, precomputed for the spatial index.
    pub midpoint: Coord,
}

impl RoadEdge {
    /// The `(u, v, key)` address of this edge.
    #[must_use]
    pub fn edge_ref(&self) -> EdgeRef {
        EdgeRef::new(self.u, self.v, self.key)
    }

    /// Risk-inflated weight: `length * (1 + risk)`.
    #[must_use]
    pub fn weight(&self) -> f64 {
        self.length.as_f64() * (1.0 + self.risk.as_f64())
    }
}

/// Raw edge description handed to the builder by loaders and tests.
#[derive(Debug, Clone)]
pub struct EdgeDescriptor {
    /// Source node.
    pub u: NodeId,
    /// Target node.
    pub v: NodeId,
    /// Explicit parallel-edge key; `None` takes the next free key for `(u, v)`.
    pub key: Option<u32>,
    /// Physical length in meters; must be strictly positive.
    pub length_m: f64,
    /// Functional road classification.
    pub road_class: RoadClass,
    /// Street name, when known.
    pub name: Option<String>,
}

/// A single risk write within a batch commit.
#[derive(Debug, Clone, Copy)]
pub struct EdgeRiskUpdate {
    /// The edge to write.
    pub edge: EdgeRef,
    /// The new risk score.
    pub risk: RiskScore,
    /// When true the update stamp is cleared instead of set (floored risk).
    pub clear_stamp: bool,
}

/// An edge matched by a radial query, with its midpoint distance.
#[derive(Debug, Clone, Copy)]
pub struct EdgeHit {
    /// The matched edge.
    pub edge: EdgeRef,
    /// Great-circle distance from the query point to the edge midpoint.
    pub distance_m: f64,
}

/// Immutable-topology view of the graph contents, held under the read lock.
#[derive(Debug, Default)]
pub struct GraphData {
    nodes: HashMap<NodeId, RoadNode>,
    edges: Vec<RoadEdge>,
    edge_slots: HashMap<EdgeRef, usize>,
    adjacency: HashMap<NodeId, Vec<usize>>,
    spatial: SpatialIndex,
}

impl GraphData {
    /// Node lookup.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&RoadNode> {
        self.nodes.get(&id)
    }

    /// Every edge, in arena order.
    #[must_use]
    pub fn edges(&self) -> &[RoadEdge] {
        &self.edges
    }

    /// Edge lookup by address.
    #[must_use]
    pub fn edge(&self, edge: EdgeRef) -> Option<&RoadEdge> {
        self.edge_slots.get(&edge).map(|slot| &self.edges[*slot])
    }

    /// Outgoing edges of a node.
    pub fn edges_from(&self, node: NodeId) -> impl Iterator<Item = &RoadEdge> {
        self.adjacency
            .get(&node)
            .into_iter()
            .flatten()
            .map(|slot| &self.edges[*slot])
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Nearest node to `coord` within `max_snap_m`, by great-circle distance.
    #[must_use]
    pub fn nearest_node(&self, coord: &Coord, max_snap_m: f64) -> Option<(NodeId, f64)> {
        let mut best: Option<(NodeId, f64)> = None;
        for node in self.nodes.values() {
            let d = coord.haversine_m(&node.coord);
            if d <= max_snap_m && best.is_none_or(|(_, bd)| d < bd) {
                best = Some((node.id, d));
            }
        }
        best
    }

    /// Edges whose midpoint lies within `radius_m` of `center`, sorted by
    /// ascending distance.
    #[must_use]
    pub fn edges_within_radius(&self, center: &Coord, radius_m: f64) -> Vec<EdgeHit> {
        let mut hits: Vec<EdgeHit> = self
            .spatial
            .candidates(center, radius_m)
            .into_iter()
            .filter_map(|slot| {
                let edge = &self.edges[slot];
                let d = center.haversine_m(&edge.midpoint);
                (d <= radius_m).then_some(EdgeHit {
                    edge: edge.edge_ref(),
                    distance_m: d,
                })
            })
            .collect();
        hits.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
        hits
    }

    /// True when the spatial index and the edge arena agree one-to-one.
    #[must_use]
    pub fn index_consistent(&self) -> bool {
        self.spatial.len() == self.edges.len()
    }
}

/// The shared, lock-protected road graph.
#[derive(Debug)]
pub struct RoadGraph {
    inner: RwLock<GraphData>,
    write_deadline: Duration,
}

impl RoadGraph {
    /// Builds the graph from parts, zeroing every risk score and building the
    /// spatial index. Fails when an edge references a missing node, repeats an
    /// explicit `(u, v, key)` address, or carries a non-positive length.
    pub fn from_parts(
        nodes: Vec<RoadNode>,
        descriptors: Vec<EdgeDescriptor>,
        spatial_grid_deg: f64,
        write_deadline: Duration,
    ) -> Result<Self, GraphError> {
        let node_map: HashMap<NodeId, RoadNode> =
            nodes.into_iter().map(|n| (n.id, n)).collect();

        let mut edges: Vec<RoadEdge> = Vec::with_capacity(descriptors.len());
        let mut edge_slots: HashMap<EdgeRef, usize> = HashMap::with_capacity(descriptors.len());
        let mut adjacency: HashMap<NodeId, Vec<usize>> = HashMap::new();
        let mut next_key: HashMap<(NodeId, NodeId), u32> = HashMap::new();

        for desc in descriptors {
            let u_node = node_map.get(&desc.u).ok_or(GraphError::MissingNode(desc.u))?;
            let v_node = node_map.get(&desc.v).ok_or(GraphError::MissingNode(desc.v))?;
            let length = LengthMeters::try_new(desc.length_m).map_err(|e| {
                GraphError::InvalidLength {
                    u: desc.u,
                    v: desc.v,
                    reason: e.to_string(),
                }
            })?;

            let key = match desc.key {
                Some(k) => k,
                None => {
                    let counter = next_key.entry((desc.u, desc.v)).or_insert(0);
                    let k = *counter;
                    *counter += 1;
                    k
                }
            };
            let edge_ref = EdgeRef::new(desc.u, desc.v, key);
            if edge_slots.contains_key(&edge_ref) {
                return Err(GraphError::DuplicateEdge(edge_ref));
            }

            let slot = edges.len();
            edges.push(RoadEdge {
                u: desc.u,
                v: desc.v,
                key,
                length,
                road_class: desc.road_class,
                name: desc.name,
                risk: RiskScore::zero(),
                last_risk_update: None,
                midpoint: u_node.coord.midpoint(&v_node.coord),
            });
            edge_slots.insert(edge_ref, slot);
            adjacency.entry(desc.u).or_default().push(slot);
        }

        let spatial = SpatialIndex::build(edges.iter().map(|e| e.midpoint), spatial_grid_deg);

        Ok(Self {
            inner: RwLock::new(GraphData {
                nodes: node_map,
                edges,
                edge_slots,
                adjacency,
                spatial,
            }),
            write_deadline,
        })
    }

    /// Shared read access for the planner and snapshots.
    pub async fn view(&self) -> RwLockReadGuard<'_, GraphData> {
        self.inner.read().await
    }

    async fn write_guard(
        &self,
    ) -> Result<tokio::sync::RwLockWriteGuard<'_, GraphData>, GraphError> {
        tokio::time::timeout(self.write_deadline, self.inner.write())
            .await
            .map_err(|_| GraphError::LockDeadline(self.write_deadline))
    }

    /// Updates one edge's risk, clamping into `[0, 1]` and stamping the time.
    pub async fn update_edge_risk(
        &self,
        edge: EdgeRef,
        risk: f64,
        ts: DateTime<Utc>,
    ) -> Result<(), GraphError> {
        let update = EdgeRiskUpdate {
            edge,
            risk: RiskScore::clamped(risk),
            clear_stamp: false,
        };
        let applied = self.batch_update_edge_risks(&[update], ts).await?;
        if applied == 0 {
            return Err(GraphError::UnknownEdge(edge));
        }
        Ok(())
    }

    /// Applies many risk writes under one lock acquisition. Updates naming
    /// unknown edges are skipped with a warning, never aborting the batch.
    /// Returns how many edges were written.
    pub async fn batch_update_edge_risks(
        &self,
        updates: &[EdgeRiskUpdate],
        ts: DateTime<Utc>,
    ) -> Result<usize, GraphError> {
        let mut guard = self.write_guard().await?;
        let mut applied = 0;
        for update in updates {
            let Some(&slot) = guard.edge_slots.get(&update.edge) else {
                warn!(edge = %update.edge, "risk update for unknown edge skipped");
                continue;
            };
            let edge = &mut guard.edges[slot];
            edge.risk = update.risk;
            edge.last_risk_update = if update.clear_stamp { None } else { Some(ts) };
            applied += 1;
        }
        Ok(applied)
    }

    /// Every edge whose midpoint is within `radius_m` of `(lat, lon)`.
    pub async fn find_edges_within_radius(
        &self,
        lat: f64,
        lon: f64,
        radius_m: f64,
    ) -> Result<Vec<EdgeHit>, GraphError> {
        let center = Coord::new(lat, lon)?;
        let guard = self.inner.read().await;
        Ok(guard.edges_within_radius(&center, radius_m))
    }

    /// Atomic copy of the per-edge risk state for external readers.
    pub async fn snapshot_risk(&self) -> HashMap<EdgeRef, RiskScore> {
        let guard = self.inner.read().await;
        guard
            .edges
            .iter()
            .map(|e| (e.edge_ref(), e.risk))
            .collect()
    }

    /// Zeroes every risk score and clears the update stamps.
    pub async fn reset_risks(&self) -> Result<usize, GraphError> {
        let mut guard = self.write_guard().await?;
        let mut cleared = 0;
        for edge in &mut guard.edges {
            if edge.risk.as_f64() > 0.0 || edge.last_risk_update.is_some() {
                cleared += 1;
            }
            edge.risk = RiskScore::zero();
            edge.last_risk_update = None;
        }
        Ok(cleared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: i64, lat: f64, lon: f64) -> RoadNode {
        RoadNode {
            id: NodeId::new(id),
            coord: Coord::new(lat, lon).unwrap(),
        }
    }

    fn descriptor(u: i64, v: i64, length_m: f64) -> EdgeDescriptor {
        EdgeDescriptor {
            u: NodeId::new(u),
            v: NodeId::new(v),
            key: None,
            length_m,
            road_class: RoadClass::Residential,
            name: None,
        }
    }

    fn two_edge_graph() -> RoadGraph {
        RoadGraph::from_parts(
            vec![node(1, 14.60, 121.00), node(2, 14.61, 121.00), node(3, 14.62, 121.00)],
            vec![descriptor(1, 2, 1100.0), descriptor(2, 3, 1100.0)],
            0.01,
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn load_rejects_missing_endpoint() {
        let result = RoadGraph::from_parts(
            vec![node(1, 14.60, 121.00)],
            vec![descriptor(1, 99, 100.0)],
            0.01,
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(GraphError::MissingNode(_))));
    }

    #[test]
    fn load_rejects_non_positive_length() {
        let result = RoadGraph::from_parts(
            vec![node(1, 14.60, 121.00), node(2, 14.61, 121.00)],
            vec![descriptor(1, 2, 0.0)],
            0.01,
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(GraphError::InvalidLength { .. })));
    }

    #[test]
    fn parallel_edges_get_distinct_keys() {
        let graph = RoadGraph::from_parts(
            vec![node(1, 14.60, 121.00), node(2, 14.61, 121.00)],
            vec![descriptor(1, 2, 100.0), descriptor(1, 2, 150.0)],
            0.01,
            Duration::from_secs(1),
        )
        .unwrap();
        let view = futures::executor::block_on(graph.view());
        assert!(view.edge(EdgeRef::new(NodeId::new(1), NodeId::new(2), 0)).is_some());
        assert!(view.edge(EdgeRef::new(NodeId::new(1), NodeId::new(2), 1)).is_some());
    }

    #[tokio::test]
    async fn update_clamps_and_stamps() {
        let graph = two_edge_graph();
        let edge = EdgeRef::new(NodeId::new(1), NodeId::new(2), 0);
        let ts = Utc::now();
        graph.update_edge_risk(edge, 3.5, ts).await.unwrap();

        let view = graph.view().await;
        let updated = view.edge(edge).unwrap();
        assert_eq!(updated.risk.as_f64(), 1.0);
        assert_eq!(updated.last_risk_update, Some(ts));
        // weight follows length * (1 + risk)
        assert_eq!(updated.weight(), 2200.0);
    }

    #[tokio::test]
    async fn batch_update_skips_unknown_edges() {
        let graph = two_edge_graph();
        let updates = vec![
            EdgeRiskUpdate {
                edge: EdgeRef::new(NodeId::new(1), NodeId::new(2), 0),
                risk: RiskScore::clamped(0.4),
                clear_stamp: false,
            },
            EdgeRiskUpdate {
                edge: EdgeRef::new(NodeId::new(7), NodeId::new(8), 0),
                risk: RiskScore::clamped(0.4),
                clear_stamp: false,
            },
        ];
        let applied = graph.batch_update_edge_risks(&updates, Utc::now()).await.unwrap();
        assert_eq!(applied, 1);
    }

    #[tokio::test]
    async fn radial_query_filters_by_haversine() {
        let graph = two_edge_graph();
        // Midpoint of edge 1->2 sits at lat 14.605; edge 2->3 at 14.615.
        let hits = graph
            .find_edges_within_radius(14.605, 121.00, 300.0)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].edge.u, NodeId::new(1));

        let wide = graph
            .find_edges_within_radius(14.605, 121.00, 2000.0)
            .await
            .unwrap();
        assert_eq!(wide.len(), 2);
    }

    #[tokio::test]
    async fn radial_query_rejects_bad_coordinates() {
        let graph = two_edge_graph();
        let result = graph.find_edges_within_radius(95.0, 121.00, 300.0).await;
        assert!(matches!(result, Err(GraphError::InvalidCoordinate(_))));
    }

    #[tokio::test]
    async fn reset_zeroes_all_risk() {
        let graph = two_edge_graph();
        let edge = EdgeRef::new(NodeId::new(1), NodeId::new(2), 0);
        graph.update_edge_risk(edge, 0.8, Utc::now()).await.unwrap();
        graph.reset_risks().await.unwrap();

        let snapshot = graph.snapshot_risk().await;
        assert!(snapshot.values().all(|r| r.as_f64() == 0.0));
    }
}
