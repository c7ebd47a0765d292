//! Risk-aware path planner
//!
//! Costs are expressed in virtual meters: physical length plus a risk
//! penalty proportional to length and risk. Edges at or above the
//! impassability threshold cost infinity and are never relaxed.

pub mod alternatives;
pub mod astar;

use crate::config::PlannerConfig;
use crate::domain_types::{EdgeRef, NodeId};
use crate::geo::{Coord, GeoError};
use crate::graph::{GraphData, RoadEdge};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Edges at or above this risk produce a human-readable warning.
const HIGH_RISK_WARNING: f64 = 0.5;

/// Assumed urban average speed, meters per minute (12 m/s).
const URBAN_SPEED_M_PER_MIN: f64 = 720.0;

/// Routing errors. Domain failures, not log noise.
#[derive(Debug, Error)]
pub enum RouteError {
    /// No graph node close enough to snap the endpoint to.
    #[error("no graph node within {max_snap_m} m of ({lat}, {lon})")]
    NoNearbyNode {
        /// Requested latitude.
        lat: f64,
        /// Requested longitude.
        lon: f64,
        /// The snap radius that was searched.
        max_snap_m: f64,
    },

    /// The goal is unreachable under the current risk thresholds.
    #[error("no path between the requested endpoints under the current risk thresholds")]
    NoPath,

    /// An endpoint is outside WGS84 bounds.
    #[error(transparent)]
    InvalidCoordinate(#[from] GeoError),
}

/// Named cost profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileKind {
    /// Pure distance, no risk penalty.
    Fastest,
    /// Moderate risk penalty.
    Balanced,
    /// Heavy risk penalty and a low impassability threshold.
    Safest,
}

/// Caller preferences, every field optional on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutePreferences {
    /// Named cost profile.
    pub profile: Option<ProfileKind>,
    /// Convenience switch: selects the safest profile unless an explicit
    /// profile is also given.
    pub avoid_floods: Option<bool>,
    /// Override of the impassability threshold.
    pub max_risk_threshold: Option<f64>,
    /// Override of the distance weight.
    pub distance_weight: Option<f64>,
    /// Override of the risk weight, virtual meters per unit risk per meter.
    pub risk_weight: Option<f64>,
    /// Number of alternative routes to compute alongside the best one.
    pub alternatives: Option<usize>,
}

/// Resolved virtual-meters cost model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    /// Multiplier on physical length.
    pub distance_weight: f64,
    /// Virtual meters per unit risk per meter of length.
    pub risk_weight: f64,
    /// Risk at or above which an edge costs infinity.
    pub max_risk_threshold: f64,
}

impl CostModel {
    /// The table values for a named profile. The balanced impassability
    /// threshold comes from configuration (0.9 by default).
    #[must_use]
    pub fn profile(kind: ProfileKind, config: &PlannerConfig) -> Self {
        match kind {
            ProfileKind::Fastest => Self {
                distance_weight: 1.0,
                risk_weight: 0.0,
                max_risk_threshold: 1.0,
            },
            ProfileKind::Balanced => Self {
                distance_weight: 1.0,
                risk_weight: 2000.0,
                max_risk_threshold: config.impassability_threshold,
            },
            ProfileKind::Safest => Self {
                distance_weight: 1.0,
                risk_weight: 100_000.0,
                max_risk_threshold: 0.7,
            },
        }
    }

    /// Resolves preferences against the profile table: profile first (with
    /// `avoid_floods` as a safest alias), then per-field overrides.
    #[must_use]
    pub fn from_preferences(preferences: &RoutePreferences, config: &PlannerConfig) -> Self {
        let kind = preferences.profile.unwrap_or({
            if preferences.avoid_floods == Some(true) {
                ProfileKind::Safest
            } else {
                ProfileKind::Balanced
            }
        });
        let mut model = Self::profile(kind, config);
        if let Some(w) = preferences.distance_weight {
            model.distance_weight = w;
        }
        if let Some(w) = preferences.risk_weight {
            model.risk_weight = w;
        }
        if let Some(t) = preferences.max_risk_threshold {
            model.max_risk_threshold = t;
        }
        model
    }

    /// Virtual-meters cost of traversing an edge, or `None` when the edge is
    /// impassable under this model.
    #[must_use]
    pub fn edge_cost(&self, length_m: f64, risk: f64) -> Option<f64> {
        if risk >= self.max_risk_threshold {
            return None;
        }
        Some(length_m * self.distance_weight + length_m * risk * self.risk_weight)
    }

    /// Cheapest passable edge between `u` and `v` across parallel keys.
    #[must_use]
    pub fn best_edge<'a>(
        &self,
        view: &'a GraphData,
        u: NodeId,
        v: NodeId,
    ) -> Option<(&'a RoadEdge, f64)> {
        let mut best: Option<(&RoadEdge, f64)> = None;
        for edge in view.edges_from(u).filter(|e| e.v == v) {
            if let Some(cost) = self.edge_cost(edge.length.as_f64(), edge.risk.as_f64()) {
                if best.is_none_or(|(_, c)| cost < c) {
                    best = Some((edge, cost));
                }
            }
        }
        best
    }
}

/// A computed route with its metrics and warnings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputedRoute {
    /// Traversed nodes in order.
    pub nodes: Vec<NodeId>,
    /// Node coordinates along the path, for rendering.
    pub path: Vec<Coord>,
    /// The chosen edge per hop.
    pub edges: Vec<EdgeRef>,
    /// Sum of the traversed edges' lengths.
    pub total_distance_m: f64,
    /// Travel-time estimate at the urban average speed.
    pub estimated_time_min: f64,
    /// Length-weighted average edge risk.
    pub avg_risk: f64,
    /// Highest edge risk along the path.
    pub max_risk: f64,
    /// Edges at or above the warning threshold.
    pub high_risk_segments: usize,
    /// Human-readable warnings for the risky segments.
    pub warnings: Vec<String>,
    /// Impassable edges encountered during the search.
    pub blocked_edges: usize,
}

/// Plans the single best route between two coordinates.
pub fn plan_route(
    view: &GraphData,
    start: Coord,
    end: Coord,
    preferences: &RoutePreferences,
    config: &PlannerConfig,
) -> Result<ComputedRoute, RouteError> {
    let cost = CostModel::from_preferences(preferences, config);
    let start_node = astar::snap_to_node(view, &start, config.max_snap_m)?;
    let end_node = astar::snap_to_node(view, &end, config.max_snap_m)?;
    let outcome = astar::search(view, start_node, end_node, &cost, None, None)?;
    Ok(assemble(view, &outcome.nodes, &cost, outcome.blocked_edges))
}

/// Plans the best route plus up to `preferences.alternatives` extra routes,
/// deduplicated by edge-set Jaccard.
pub fn plan_with_alternatives(
    view: &GraphData,
    start: Coord,
    end: Coord,
    preferences: &RoutePreferences,
    config: &PlannerConfig,
) -> Result<Vec<ComputedRoute>, RouteError> {
    let extra = preferences.alternatives.unwrap_or(0);
    if extra < 2 {
        return Ok(vec![plan_route(view, start, end, preferences, config)?]);
    }
    let cost = CostModel::from_preferences(preferences, config);
    let start_node = astar::snap_to_node(view, &start, config.max_snap_m)?;
    let end_node = astar::snap_to_node(view, &end, config.max_snap_m)?;
    let paths = alternatives::k_shortest(
        view,
        start_node,
        end_node,
        &cost,
        1 + extra,
        config.alternative_jaccard_max,
    )?;
    Ok(paths
        .into_iter()
        .map(|outcome| assemble(view, &outcome.nodes, &cost, outcome.blocked_edges))
        .collect())
}

/// Builds the route record for a found node path.
fn assemble(view: &GraphData, nodes: &[NodeId], cost: &CostModel, blocked: usize) -> ComputedRoute {
    let mut edges = Vec::new();
    let mut warnings = Vec::new();
    let mut total_distance = 0.0f64;
    let mut weighted_risk = 0.0f64;
    let mut max_risk = 0.0f64;
    let mut high_risk_segments = 0usize;

    for (segment, pair) in nodes.windows(2).enumerate() {
        // The search only returns hops with at least one passable edge.
        let Some((edge, _)) = cost.best_edge(view, pair[0], pair[1]) else {
            continue;
        };
        let length = edge.length.as_f64();
        let risk = edge.risk.as_f64();
        edges.push(edge.edge_ref());
        total_distance += length;
        weighted_risk += length * risk;
        max_risk = max_risk.max(risk);
        if risk >= HIGH_RISK_WARNING {
            high_risk_segments += 1;
            let label = edge
                .name
                .clone()
                .unwrap_or_else(|| format!("segment-{}", segment + 1));
            warnings.push(format!("{label} at {:.0}% flood risk", risk * 100.0));
        }
    }

    let avg_risk = if total_distance > 0.0 {
        weighted_risk / total_distance
    } else {
        0.0
    };
    let path = nodes
        .iter()
        .filter_map(|id| view.node(*id).map(|n| n.coord))
        .collect();

    ComputedRoute {
        nodes: nodes.to_vec(),
        path,
        edges,
        total_distance_m: total_distance,
        estimated_time_min: total_distance / URBAN_SPEED_M_PER_MIN,
        avg_risk,
        max_risk,
        high_risk_segments,
        warnings,
        blocked_edges: blocked,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_table_matches_defaults() {
        let config = PlannerConfig::default();
        let fastest = CostModel::profile(ProfileKind::Fastest, &config);
        assert_eq!(fastest.risk_weight, 0.0);
        assert_eq!(fastest.max_risk_threshold, 1.0);

        let balanced = CostModel::profile(ProfileKind::Balanced, &config);
        assert_eq!(balanced.risk_weight, 2000.0);
        assert_eq!(balanced.max_risk_threshold, 0.9);

        let safest = CostModel::profile(ProfileKind::Safest, &config);
        assert_eq!(safest.risk_weight, 100_000.0);
        assert_eq!(safest.max_risk_threshold, 0.7);
    }

    #[test]
    fn preferences_override_individual_fields() {
        let config = PlannerConfig::default();
        let preferences = RoutePreferences {
            profile: Some(ProfileKind::Fastest),
            max_risk_threshold: Some(0.95),
            ..RoutePreferences::default()
        };
        let model = CostModel::from_preferences(&preferences, &config);
        assert_eq!(model.risk_weight, 0.0);
        assert_eq!(model.max_risk_threshold, 0.95);
    }

    #[test]
    fn avoid_floods_selects_safest_without_explicit_profile() {
        let config = PlannerConfig::default();
        let preferences = RoutePreferences {
            avoid_floods: Some(true),
            ..RoutePreferences::default()
        };
        let model = CostModel::from_preferences(&preferences, &config);
        assert_eq!(model.max_risk_threshold, 0.7);
    }

    #[test]
    fn virtual_meters_cost() {
        let config = PlannerConfig::default();
        let balanced = CostModel::profile(ProfileKind::Balanced, &config);
        // 1000 m at risk 0.4: 1000 + 1000 * 0.4 * 2000 = 801000 virtual meters.
        assert_eq!(balanced.edge_cost(1000.0, 0.4), Some(801_000.0));
        assert_eq!(balanced.edge_cost(1400.0, 0.0), Some(1400.0));
        // At or above the threshold the edge is impassable.
        assert_eq!(balanced.edge_cost(100.0, 0.9), None);
    }
}
