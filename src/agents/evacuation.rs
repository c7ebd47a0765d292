//! Evacuation targets and the evacuation manager agent
//!
//! The roster lists shelters with capacity. Target selection routes to the
//! nearest few candidates and keeps the one with the lowest average risk;
//! ties go to the shorter route, then to the larger shelter. The manager
//! agent translates distress calls into planner requests and relays the
//! answers, without ever calling the planner directly.

use super::{Agent, AgentError, StepContext, StepReport};
use crate::config::PlannerConfig;
use crate::domain_types::{AgentName, MailboxCapacity};
use crate::geo::Coord;
use crate::graph::GraphData;
use crate::messaging::{AclMessage, Mailbox, MailboxRouter, MessageContent, Performative, names};
use crate::planner::{self, ComputedRoute, RouteError, RoutePreferences};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// One evacuation shelter.
#[derive(Debug, Clone)]
pub struct Shelter {
    /// Display name.
    pub name: String,
    /// Shelter position.
    pub coord: Coord,
    /// How many evacuees it can take.
    pub capacity: u32,
    /// Facility kind (school, hall, court, ...).
    pub kind: String,
    /// Street address, when known.
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ShelterRow {
    name: String,
    lat: f64,
    lon: f64,
    capacity: u32,
    kind: String,
    #[serde(default)]
    address: Option<String>,
}

/// The loaded shelter roster.
#[derive(Debug, Default)]
pub struct ShelterRoster {
    shelters: Vec<Shelter>,
}

impl ShelterRoster {
    /// Loads the roster CSV (`name, lat, lon, capacity, kind, address`).
    /// Rows with invalid coordinates are dropped with a warning.
    pub fn from_csv_path(path: &Path) -> Result<Self, AgentError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| AgentError::Roster(e.to_string()))?;
        let mut shelters = Vec::new();
        for row in reader.deserialize::<ShelterRow>() {
            let row = row.map_err(|e| AgentError::Roster(e.to_string()))?;
            match Coord::new(row.lat, row.lon) {
                Ok(coord) => shelters.push(Shelter {
                    name: row.name,
                    coord,
                    capacity: row.capacity,
                    kind: row.kind,
                    address: row.address,
                }),
                Err(err) => warn!(shelter = %row.name, error = %err, "shelter dropped"),
            }
        }
        Ok(Self { shelters })
    }

    /// Builds a roster from in-memory shelters.
    #[must_use]
    pub fn from_shelters(shelters: Vec<Shelter>) -> Self {
        Self { shelters }
    }

    /// Number of shelters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shelters.len()
    }

    /// True when no shelter is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shelters.is_empty()
    }

    /// Up to `n` shelters nearest to `start` by great-circle distance.
    #[must_use]
    pub fn nearest_candidates(&self, start: &Coord, n: usize) -> Vec<&Shelter> {
        let mut by_distance: Vec<(&Shelter, f64)> = self
            .shelters
            .iter()
            .map(|s| (s, start.haversine_m(&s.coord)))
            .collect();
        by_distance.sort_by(|a, b| a.1.total_cmp(&b.1));
        by_distance.into_iter().take(n).map(|(s, _)| s).collect()
    }
}

/// A selected shelter with its route.
#[derive(Debug, Clone)]
pub struct EvacuationPlan {
    /// The chosen shelter.
    pub shelter: Shelter,
    /// The route to it under the requested preferences.
    pub route: ComputedRoute,
}

/// Routes to the nearest feasible shelters and keeps the safest.
pub fn select_shelter(
    view: &GraphData,
    start: Coord,
    preferences: &RoutePreferences,
    roster: &ShelterRoster,
    config: &PlannerConfig,
) -> Result<EvacuationPlan, RouteError> {
    let candidates = roster.nearest_candidates(&start, config.n_shelter_candidates);
    let mut best: Option<EvacuationPlan> = None;

    for shelter in candidates {
        let route = match planner::plan_route(view, start, shelter.coord, preferences, config) {
            Ok(route) => route,
            Err(err) => {
                debug!(shelter = %shelter.name, error = %err, "shelter unreachable");
                continue;
            }
        };
        let better = match &best {
            None => true,
            Some(current) => {
                let by_risk = route.avg_risk.total_cmp(&current.route.avg_risk);
                let by_distance = route
                    .total_distance_m
                    .total_cmp(&current.route.total_distance_m);
                by_risk
                    .then(by_distance)
                    .then(current.shelter.capacity.cmp(&shelter.capacity))
                    .is_lt()
            }
        };
        if better {
            best = Some(EvacuationPlan {
                shelter: shelter.clone(),
                route,
            });
        }
    }

    best.ok_or(RouteError::NoPath)
}

struct PendingConversation {
    original: AclMessage,
    reply_id: Uuid,
    issued_at: DateTime<Utc>,
}

/// The evacuation manager agent.
pub struct EvacuationManager {
    name: AgentName,
    router: Arc<MailboxRouter>,
    mailbox: Mailbox,
    pending: Vec<PendingConversation>,
    reply_deadline: Duration,
}

impl EvacuationManager {
    /// Builds the manager and registers its mailbox.
    pub fn new(
        router: Arc<MailboxRouter>,
        capacity: MailboxCapacity,
        reply_deadline: Duration,
    ) -> Self {
        let name = names::evacuation_manager();
        let mailbox = router.register(name.clone(), capacity);
        Self {
            name,
            router,
            mailbox,
            pending: Vec::new(),
            reply_deadline,
        }
    }

    /// Conversations still waiting on the planner.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl Agent for EvacuationManager {
    fn name(&self) -> &AgentName {
        &self.name
    }

    async fn step(&mut self, ctx: &StepContext) -> Result<StepReport, AgentError> {
        let mut report = StepReport::default();

        for message in self.mailbox.drain() {
            report.handled += 1;

            // Planner replies come back correlated to a pending conversation.
            if let Some(reply_to) = message.in_reply_to {
                if let Some(pos) = self.pending.iter().position(|p| p.reply_id == reply_to) {
                    let pending = self.pending.swap_remove(pos);
                    let relayed = pending
                        .original
                        .reply(message.performative, message.content.clone());
                    self.router.send(relayed).await?;
                    report.sent += 1;
                    continue;
                }
            }

            match &message.content {
                MessageContent::DistressCall { lat, lon, preferences } => {
                    let request = AclMessage::request(
                        self.name.clone(),
                        names::planner_agent(),
                        MessageContent::FindEvacuationRoute {
                            start_lat: *lat,
                            start_lon: *lon,
                            preferences: preferences.clone(),
                        },
                    );
                    let reply_id = request
                        .reply_with
                        .unwrap_or_else(Uuid::new_v4);
                    self.router.send(request).await?;
                    report.sent += 1;
                    self.pending.push(PendingConversation {
                        original: message,
                        reply_id,
                        issued_at: ctx.now,
                    });
                }
                other => {
                    if message.performative == Performative::Request {
                        self.router
                            .send(message.reply(
                                Performative::Refuse,
                                MessageContent::Failed {
                                    reason: format!("unsupported request {}", other.info_type()),
                                },
                            ))
                            .await?;
                        report.sent += 1;
                    }
                }
            }
        }

        // Conversations past the reply deadline fail back to the originator.
        let deadline = chrono::Duration::from_std(self.reply_deadline)
            .unwrap_or_else(|_| chrono::Duration::seconds(10));
        let mut expired = Vec::new();
        self.pending.retain(|p| {
            if ctx.now - p.issued_at > deadline {
                expired.push(p.original.clone());
                false
            } else {
                true
            }
        });
        for original in expired {
            self.router
                .send(original.failure("planner did not reply in time"))
                .await?;
            report.sent += 1;
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_types::{NodeId, RoadClass};
    use crate::graph::{EdgeDescriptor, RoadGraph, RoadNode};

    fn grid_graph() -> RoadGraph {
        let node = |id: i64, lat: f64, lon: f64| RoadNode {
            id: NodeId::new(id),
            coord: Coord::new(lat, lon).unwrap(),
        };
        let edge = |u: i64, v: i64, length_m: f64| EdgeDescriptor {
            u: NodeId::new(u),
            v: NodeId::new(v),
            key: None,
            length_m,
            road_class: RoadClass::Residential,
            name: None,
        };
        RoadGraph::from_parts(
            vec![
                node(1, 14.600, 121.000),
                node(2, 14.610, 121.000),
                node(3, 14.600, 121.010),
            ],
            vec![
                edge(1, 2, 1100.0),
                edge(2, 1, 1100.0),
                edge(1, 3, 1080.0),
                edge(3, 1, 1080.0),
            ],
            0.01,
            Duration::from_secs(1),
        )
        .unwrap()
    }

    fn shelter(name: &str, lat: f64, lon: f64, capacity: u32) -> Shelter {
        Shelter {
            name: name.to_string(),
            coord: Coord::new(lat, lon).unwrap(),
            capacity,
            kind: "school".to_string(),
            address: None,
        }
    }

    #[tokio::test]
    async fn picks_the_lower_risk_shelter() {
        let graph = grid_graph();
        // The northern branch is risky, the eastern one is clean.
        graph
            .update_edge_risk(
                crate::domain_types::EdgeRef::new(NodeId::new(1), NodeId::new(2), 0),
                0.6,
                Utc::now(),
            )
            .await
            .unwrap();

        let roster = ShelterRoster::from_shelters(vec![
            shelter("North School", 14.610, 121.000, 500),
            shelter("East Gym", 14.600, 121.010, 200),
        ]);

        let view = graph.view().await;
        let plan = select_shelter(
            &view,
            Coord::new(14.600, 121.000).unwrap(),
            &RoutePreferences::default(),
            &roster,
            &PlannerConfig::default(),
        )
        .unwrap();
        assert_eq!(plan.shelter.name, "East Gym");
        assert_eq!(plan.route.max_risk, 0.0);
    }

    #[tokio::test]
    async fn capacity_breaks_exact_ties() {
        let graph = grid_graph();
        // Two shelters at the same point: identical route, different capacity.
        let roster = ShelterRoster::from_shelters(vec![
            shelter("Small Hall", 14.610, 121.000, 150),
            shelter("Big Hall", 14.610, 121.000, 900),
        ]);

        let view = graph.view().await;
        let plan = select_shelter(
            &view,
            Coord::new(14.600, 121.000).unwrap(),
            &RoutePreferences::default(),
            &roster,
            &PlannerConfig::default(),
        )
        .unwrap();
        assert_eq!(plan.shelter.name, "Big Hall");
    }

    #[test]
    fn nearest_candidates_are_sorted_by_distance() {
        let roster = ShelterRoster::from_shelters(vec![
            shelter("Far", 14.700, 121.100, 100),
            shelter("Near", 14.601, 121.001, 100),
            shelter("Mid", 14.650, 121.050, 100),
        ]);
        let start = Coord::new(14.600, 121.000).unwrap();
        let picks = roster.nearest_candidates(&start, 2);
        assert_eq!(picks[0].name, "Near");
        assert_eq!(picks[1].name, "Mid");
    }
}
