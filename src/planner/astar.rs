//! A* search over the road graph.
//!
//! The heuristic is the great-circle distance to the goal scaled by the
//! distance weight, an absolute lower bound on any remaining path cost, so
//! the first goal expansion is optimal. Ties on `f` break toward the lower
//! heuristic.

use super::{CostModel, RouteError};
use crate::domain_types::NodeId;
use crate::geo::Coord;
use crate::graph::GraphData;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// A finished search: the node path plus how many impassable edges the
/// expansion ran into.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Traversed nodes, start to goal.
    pub nodes: Vec<NodeId>,
    /// Distinct impassable edges touched during expansion.
    pub blocked_edges: usize,
}

/// Frontier entry ordered for a min-heap on `(f, h)`.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    f: f64,
    h: f64,
    node: NodeId,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.f == other.f && self.h == other.h && self.node == other.node
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reversed: BinaryHeap is a max-heap, we pop the lowest f, then the
        // lowest h on ties.
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.h.total_cmp(&self.h))
    }
}

/// Snaps a coordinate to the nearest graph node within `max_snap_m`.
pub fn snap_to_node(
    view: &GraphData,
    coord: &Coord,
    max_snap_m: f64,
) -> Result<NodeId, RouteError> {
    view.nearest_node(coord, max_snap_m)
        .map(|(id, _)| id)
        .ok_or(RouteError::NoNearbyNode {
            lat: coord.lat,
            lon: coord.lon,
            max_snap_m,
        })
}

/// A* from `start` to `goal` under `cost`, optionally masking node pairs and
/// nodes (used by the k-shortest-paths deviation search).
pub fn search(
    view: &GraphData,
    start: NodeId,
    goal: NodeId,
    cost: &CostModel,
    banned_hops: Option<&HashSet<(NodeId, NodeId)>>,
    banned_nodes: Option<&HashSet<NodeId>>,
) -> Result<SearchOutcome, RouteError> {
    if start == goal {
        return Ok(SearchOutcome {
            nodes: vec![start],
            blocked_edges: 0,
        });
    }
    let goal_coord = view.node(goal).ok_or(RouteError::NoPath)?.coord;
    view.node(start).ok_or(RouteError::NoPath)?;

    let heuristic = |node: NodeId| -> f64 {
        view.node(node)
            .map_or(0.0, |n| {
                n.coord.haversine_m(&goal_coord) * cost.distance_weight.max(0.0)
            })
    };

    let mut open = BinaryHeap::new();
    let mut g_score: HashMap<NodeId, f64> = HashMap::new();
    let mut came_from: HashMap<NodeId, NodeId> = HashMap::new();
    let mut blocked: HashSet<crate::domain_types::EdgeRef> = HashSet::new();

    g_score.insert(start, 0.0);
    let h0 = heuristic(start);
    open.push(Candidate {
        f: h0,
        h: h0,
        node: start,
    });

    while let Some(Candidate { node, .. }) = open.pop() {
        let current_g = g_score.get(&node).copied().unwrap_or(f64::INFINITY);
        if node == goal {
            return Ok(SearchOutcome {
                nodes: reconstruct(&came_from, start, goal),
                blocked_edges: blocked.len(),
            });
        }

        // Cheapest passable hop per neighbour across parallel edges.
        let mut hops: HashMap<NodeId, f64> = HashMap::new();
        for edge in view.edges_from(node) {
            if banned_nodes.is_some_and(|set| set.contains(&edge.v)) {
                continue;
            }
            if banned_hops.is_some_and(|set| set.contains(&(edge.u, edge.v))) {
                continue;
            }
            match cost.edge_cost(edge.length.as_f64(), edge.risk.as_f64()) {
                Some(hop_cost) => {
                    hops.entry(edge.v)
                        .and_modify(|c| *c = c.min(hop_cost))
                        .or_insert(hop_cost);
                }
                None => {
                    blocked.insert(edge.edge_ref());
                }
            }
        }

        for (neighbour, hop_cost) in hops {
            let tentative = current_g + hop_cost;
            if tentative < g_score.get(&neighbour).copied().unwrap_or(f64::INFINITY) {
                g_score.insert(neighbour, tentative);
                came_from.insert(neighbour, node);
                let h = heuristic(neighbour);
                open.push(Candidate {
                    f: tentative + h,
                    h,
                    node: neighbour,
                });
            }
        }
    }

    Err(RouteError::NoPath)
}

fn reconstruct(came_from: &HashMap<NodeId, NodeId>, start: NodeId, goal: NodeId) -> Vec<NodeId> {
    let mut nodes = vec![goal];
    let mut current = goal;
    while current != start {
        match came_from.get(&current) {
            Some(previous) => {
                current = *previous;
                nodes.push(current);
            }
            None => break,
        }
    }
    nodes.reverse();
    nodes
}
