//! Hazard agent
//!
//! Front-end of the fusion engine: drains its mailbox, validates incoming
//! batches entry by entry (a bad entry is dropped with a warning, never
//! aborting the batch), stages the survivors on the shared bus, and answers
//! risk queries. It never mutates the graph itself.

use super::{Agent, AgentError, StepContext, StepReport};
use crate::domain_types::{AgentName, EdgeRef, MailboxCapacity, NodeId, TrendDirection};
use crate::fusion::{HazardReading, ScoutReport};
use crate::graph::RoadGraph;
use crate::messaging::{Mailbox, MailboxRouter, MessageContent, Performative, names};
use crate::orchestrator::bus::SharedDataBus;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// The hazard agent.
pub struct HazardAgent {
    name: AgentName,
    router: Arc<MailboxRouter>,
    mailbox: Mailbox,
    bus: Arc<SharedDataBus>,
    graph: Arc<RoadGraph>,
}

impl HazardAgent {
    /// Builds the agent and registers its mailbox.
    pub fn new(
        router: Arc<MailboxRouter>,
        capacity: MailboxCapacity,
        bus: Arc<SharedDataBus>,
        graph: Arc<RoadGraph>,
    ) -> Self {
        let name = names::hazard_agent();
        let mailbox = router.register(name.clone(), capacity);
        Self {
            name,
            router,
            mailbox,
            bus,
            graph,
        }
    }
}

#[async_trait]
impl Agent for HazardAgent {
    fn name(&self) -> &AgentName {
        &self.name
    }

    async fn step(&mut self, _ctx: &StepContext) -> Result<StepReport, AgentError> {
        let mut report = StepReport::default();

        for message in self.mailbox.drain() {
            report.handled += 1;
            match message.content.clone() {
                MessageContent::FloodDataBatch { readings, source_tag } => {
                    let mut accepted = Vec::with_capacity(readings.len());
                    for (location_id, payload) in readings {
                        match HazardReading::from_payload(
                            location_id.clone(),
                            source_tag.clone(),
                            payload,
                        ) {
                            Ok(reading) => accepted.push(reading),
                            Err(err) => {
                                warn!(location = %location_id, error = %err, "hazard reading dropped");
                            }
                        }
                    }
                    debug!(count = accepted.len(), source = %source_tag, "flood batch staged");
                    self.bus.stage_flood(accepted);
                }
                MessageContent::ScoutReportBatch { reports } => {
                    let mut accepted = Vec::with_capacity(reports.len());
                    for payload in reports {
                        match ScoutReport::from_payload(payload) {
                            Ok(parsed) => accepted.push(parsed),
                            Err(err) => warn!(error = %err, "scout report dropped"),
                        }
                    }
                    debug!(count = accepted.len(), "scout batch staged");
                    self.bus.stage_scouts(accepted);
                }
                MessageContent::RiskAtEdge { u, v, key } => {
                    let edge = EdgeRef::new(NodeId::new(u), NodeId::new(v), key);
                    let risk = {
                        let view = self.graph.view().await;
                        view.edge(edge).map(|e| e.risk.as_f64())
                    };
                    let reply = match risk {
                        Some(risk) => message.reply(
                            Performative::Inform,
                            MessageContent::RiskReport {
                                edge,
                                risk,
                                trend: self
                                    .bus
                                    .last_outcome()
                                    .map_or(TrendDirection::Stable, |o| o.risk_trend),
                            },
                        ),
                        None => message.failure(format!("unknown edge {edge}")),
                    };
                    self.router.send(reply).await?;
                    report.sent += 1;
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
                    } else {
                        debug!(info_type = other.info_type(), "hazard agent ignoring message");
                    }
                }
            }
        }
        Ok(report)
    }
}
