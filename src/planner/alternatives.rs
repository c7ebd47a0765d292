//! Alternative routes via Yen's k-shortest-paths over the risk-aware cost.
//!
//! Deviation searches mask the hop leaving each spur node of every accepted
//! path sharing the same root, plus the root nodes themselves. Results are
//! deduplicated by edge-set Jaccard similarity.

use super::astar::{self, SearchOutcome};
use super::{CostModel, RouteError};
use crate::domain_types::{EdgeRef, NodeId};
use crate::graph::GraphData;
use std::collections::HashSet;

/// Total virtual-meters cost of a node path, infinity when any hop lacks a
/// passable edge.
fn path_cost(view: &GraphData, nodes: &[NodeId], cost: &CostModel) -> f64 {
    nodes
        .windows(2)
        .map(|pair| {
            cost.best_edge(view, pair[0], pair[1])
                .map_or(f64::INFINITY, |(_, c)| c)
        })
        .sum()
}

/// Edge set of a node path under the cheapest-parallel-edge selection.
fn edge_set(view: &GraphData, nodes: &[NodeId], cost: &CostModel) -> HashSet<EdgeRef> {
    nodes
        .windows(2)
        .filter_map(|pair| cost.best_edge(view, pair[0], pair[1]).map(|(e, _)| e.edge_ref()))
        .collect()
}

fn jaccard(a: &HashSet<EdgeRef>, b: &HashSet<EdgeRef>) -> f64 {
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        1.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Up to `k` loopless paths from `start` to `goal`, cheapest first, with
/// near-duplicates (Jaccard >= `jaccard_max`) filtered out.
pub fn k_shortest(
    view: &GraphData,
    start: NodeId,
    goal: NodeId,
    cost: &CostModel,
    k: usize,
    jaccard_max: f64,
) -> Result<Vec<SearchOutcome>, RouteError> {
    let best = astar::search(view, start, goal, cost, None, None)?;
    let mut accepted: Vec<SearchOutcome> = vec![best];
    let mut candidates: Vec<(f64, SearchOutcome)> = Vec::new();

    while accepted.len() < k {
        let previous = accepted
            .last()
            .map_or_else(Vec::new, |p| p.nodes.clone());
        for i in 0..previous.len().saturating_sub(1) {
            let spur = previous[i];
            let root = &previous[..=i];

            let mut banned_hops: HashSet<(NodeId, NodeId)> = HashSet::new();
            for path in &accepted {
                if path.nodes.len() > i + 1 && path.nodes[..=i] == *root {
                    banned_hops.insert((spur, path.nodes[i + 1]));
                }
            }
            let banned_nodes: HashSet<NodeId> = root[..i].iter().copied().collect();

            let Ok(spur_outcome) = astar::search(
                view,
                spur,
                goal,
                cost,
                Some(&banned_hops),
                Some(&banned_nodes),
            ) else {
                continue;
            };

            let mut nodes = root[..i].to_vec();
            nodes.extend(spur_outcome.nodes.iter().copied());

            let already_known = accepted.iter().any(|p| p.nodes == nodes)
                || candidates.iter().any(|(_, p)| p.nodes == nodes);
            if already_known {
                continue;
            }
            let total = path_cost(view, &nodes, cost);
            if total.is_finite() {
                candidates.push((
                    total,
                    SearchOutcome {
                        nodes,
                        blocked_edges: spur_outcome.blocked_edges,
                    },
                ));
            }
        }

        if candidates.is_empty() {
            break;
        }
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (_, next) = candidates.remove(0);
        accepted.push(next);
    }

    // Jaccard filter: the optimal path always survives; each later path must
    // differ enough from everything already kept.
    let mut kept: Vec<SearchOutcome> = Vec::new();
    let mut kept_edges: Vec<HashSet<EdgeRef>> = Vec::new();
    for outcome in accepted {
        let edges = edge_set(view, &outcome.nodes, cost);
        if kept_edges
            .iter()
            .all(|existing| jaccard(existing, &edges) < jaccard_max)
        {
            kept.push(outcome);
            kept_edges.push(edges);
        }
    }
    Ok(kept)
}
