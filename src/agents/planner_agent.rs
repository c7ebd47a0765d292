//! Planner agent
//!
//! Serves `calculate_route` and `find_evacuation_route` REQUESTs during the
//! routing phase, answering from whatever risk state the graph holds at that
//! moment. Domain failures (`NoPath`, `NoNearbyNode`) become FAILURE replies
//! without log noise.

use super::evacuation::{self, ShelterRoster};
use super::{Agent, AgentError, StepContext, StepReport};
use crate::config::PlannerConfig;
use crate::domain_types::{AgentName, MailboxCapacity};
use crate::geo::Coord;
use crate::graph::RoadGraph;
use crate::messaging::{Mailbox, MailboxRouter, MessageContent, Performative, names};
use crate::planner::{self, RouteError, RoutePreferences};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// The planner agent.
pub struct PlannerAgent {
    name: AgentName,
    router: Arc<MailboxRouter>,
    mailbox: Mailbox,
    graph: Arc<RoadGraph>,
    shelters: Arc<ShelterRoster>,
    config: PlannerConfig,
}

impl PlannerAgent {
    /// Builds the agent and registers its mailbox.
    pub fn new(
        router: Arc<MailboxRouter>,
        capacity: MailboxCapacity,
        graph: Arc<RoadGraph>,
        shelters: Arc<ShelterRoster>,
        config: PlannerConfig,
    ) -> Self {
        let name = names::planner_agent();
        let mailbox = router.register(name.clone(), capacity);
        Self {
            name,
            router,
            mailbox,
            graph,
            shelters,
            config,
        }
    }

    async fn route_reply(
        &self,
        start_lat: f64,
        start_lon: f64,
        end_lat: f64,
        end_lon: f64,
        preferences: &RoutePreferences,
    ) -> Result<MessageContent, RouteError> {
        let start = Coord::new(start_lat, start_lon)?;
        let end = Coord::new(end_lat, end_lon)?;
        let view = self.graph.view().await;
        let route = planner::plan_route(&view, start, end, preferences, &self.config)?;
        Ok(MessageContent::RouteResult {
            route,
            shelter_name: None,
        })
    }

    async fn evacuation_reply(
        &self,
        start_lat: f64,
        start_lon: f64,
        preferences: &RoutePreferences,
    ) -> Result<MessageContent, RouteError> {
        let start = Coord::new(start_lat, start_lon)?;
        let view = self.graph.view().await;
        let plan =
            evacuation::select_shelter(&view, start, preferences, &self.shelters, &self.config)?;
        Ok(MessageContent::RouteResult {
            route: plan.route,
            shelter_name: Some(plan.shelter.name),
        })
    }
}

#[async_trait]
impl Agent for PlannerAgent {
    fn name(&self) -> &AgentName {
        &self.name
    }

    async fn step(&mut self, _ctx: &StepContext) -> Result<StepReport, AgentError> {
        let mut report = StepReport::default();

        for message in self.mailbox.drain() {
            report.handled += 1;
            let reply = match &message.content {
                MessageContent::CalculateRoute {
                    start_lat,
                    start_lon,
                    end_lat,
                    end_lon,
                    preferences,
                } => {
                    match self
                        .route_reply(*start_lat, *start_lon, *end_lat, *end_lon, preferences)
                        .await
                    {
                        Ok(content) => message.reply(Performative::Inform, content),
                        Err(err) => message.failure(err.to_string()),
                    }
                }
                MessageContent::FindEvacuationRoute {
                    start_lat,
                    start_lon,
                    preferences,
                } => {
                    match self
                        .evacuation_reply(*start_lat, *start_lon, preferences)
                        .await
                    {
                        Ok(content) => message.reply(Performative::Inform, content),
                        Err(err) => message.failure(err.to_string()),
                    }
                }
                other => {
                    if message.performative == Performative::Request
                        || message.performative == Performative::Query
                    {
                        message.reply(
                            Performative::Refuse,
                            MessageContent::Failed {
                                reason: format!("unsupported request {}", other.info_type()),
                            },
                        )
                    } else {
                        debug!(info_type = other.info_type(), "planner ignoring message");
                        continue;
                    }
                }
            };
            self.router.send(reply).await?;
            report.sent += 1;
        }
        Ok(report)
    }
}
