//! Scout collector agent
//!
//! Forwards pre-classified crowdsourced reports to the hazard agent as
//! `scout_report_batch` INFORMs. In live mode batches arrive in its mailbox
//! from the ingestion surface; in simulated mode they come from the
//! pre-recorded event stream.

use super::{Agent, AgentError, ScenarioFeed, StepContext, StepReport};
use crate::domain_types::{AgentName, MailboxCapacity};
use crate::fusion::ScoutReportPayload;
use crate::messaging::{AclMessage, Mailbox, MailboxRouter, MessageContent, names};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// The scout collector.
pub struct ScoutCollector {
    name: AgentName,
    router: Arc<MailboxRouter>,
    mailbox: Mailbox,
    feed: Option<ScenarioFeed>,
}

impl ScoutCollector {
    /// Builds the collector and registers its mailbox.
    pub fn new(
        router: Arc<MailboxRouter>,
        capacity: MailboxCapacity,
        feed: Option<ScenarioFeed>,
    ) -> Self {
        let name = names::scout_collector();
        let mailbox = router.register(name.clone(), capacity);
        Self {
            name,
            router,
            mailbox,
            feed,
        }
    }

    /// Rewinds the simulated feed (session reset).
    pub fn rewind_feed(&mut self) {
        if let Some(feed) = self.feed.as_mut() {
            feed.rewind();
        }
    }

    async fn forward(&self, reports: Vec<ScoutReportPayload>) -> Result<bool, AgentError> {
        if reports.is_empty() {
            return Ok(false);
        }
        self.router
            .send(AclMessage::inform(
                self.name.clone(),
                names::hazard_agent(),
                MessageContent::ScoutReportBatch { reports },
            ))
            .await?;
        Ok(true)
    }
}

#[async_trait]
impl Agent for ScoutCollector {
    fn name(&self) -> &AgentName {
        &self.name
    }

    async fn step(&mut self, ctx: &StepContext) -> Result<StepReport, AgentError> {
        let mut report = StepReport::default();

        // Live mode: relay batches pushed into our mailbox.
        let mut outbound: Vec<Vec<ScoutReportPayload>> = Vec::new();
        for message in self.mailbox.drain() {
            report.handled += 1;
            match message.content {
                MessageContent::ScoutReportBatch { reports } => outbound.push(reports),
                other => {
                    debug!(info_type = other.info_type(), "scout collector ignoring message");
                }
            }
        }

        // Simulated mode: stream events due on the simulation clock.
        if let Some(feed) = self.feed.as_mut() {
            for payload in feed.due(ctx.sim_elapsed_s) {
                match serde_json::from_value::<Vec<ScoutReportPayload>>(payload) {
                    Ok(reports) => outbound.push(reports),
                    Err(err) => warn!(error = %err, "malformed scout scenario event dropped"),
                }
            }
        }

        for batch in outbound {
            if self.forward(batch).await? {
                report.sent += 1;
            }
        }
        Ok(report)
    }
}
