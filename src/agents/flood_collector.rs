//! Flood collector agent
//!
//! Collects official hazard readings and forwards them to the hazard agent
//! as `flood_data_batch` INFORMs. Refreshes are driven two ways that look
//! identical downstream: the periodic scheduler's `CollectNow` nudge and the
//! tick's own collection phase draining the simulated feed.

use super::{Agent, AgentError, ScenarioFeed, StepContext, StepReport};
use crate::domain_types::{AgentName, MailboxCapacity};
use crate::fusion::HazardReadingPayload;
use crate::messaging::{AclMessage, Mailbox, MailboxRouter, MessageContent, names};
use crate::orchestrator::scheduler::SchedulerStats;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Pluggable upstream source of official readings.
///
/// The production scraper lives outside this crate; the simulated feed and a
/// null source are the in-tree implementations.
#[async_trait]
pub trait FloodSource: Send + Sync {
    /// Fetches the latest batch keyed by location id.
    async fn fetch(&mut self) -> Result<Vec<HashMap<String, HazardReadingPayload>>, AgentError>;
}

/// Source that never produces data (live mode without an attached scraper).
#[derive(Debug, Default)]
pub struct NullSource;

#[async_trait]
impl FloodSource for NullSource {
    async fn fetch(&mut self) -> Result<Vec<HashMap<String, HazardReadingPayload>>, AgentError> {
        Ok(Vec::new())
    }
}

/// The flood collector.
pub struct FloodCollector {
    name: AgentName,
    router: Arc<MailboxRouter>,
    mailbox: Mailbox,
    feed: Option<ScenarioFeed>,
    source: Box<dyn FloodSource>,
    source_tag: String,
    stats: Option<Arc<SchedulerStats>>,
}

impl FloodCollector {
    /// Builds the collector and registers its mailbox.
    pub fn new(
        router: Arc<MailboxRouter>,
        capacity: MailboxCapacity,
        feed: Option<ScenarioFeed>,
        stats: Option<Arc<SchedulerStats>>,
    ) -> Self {
        let name = names::flood_collector();
        let mailbox = router.register(name.clone(), capacity);
        Self {
            name,
            router,
            mailbox,
            feed,
            source: Box::new(NullSource),
            source_tag: "upstream".to_string(),
            stats,
        }
    }

    /// Swaps in a live upstream source.
    pub fn with_source(mut self, source: Box<dyn FloodSource>, tag: impl Into<String>) -> Self {
        self.source = source;
        self.source_tag = tag.into();
        self
    }

    /// Rewinds the simulated feed (session reset).
    pub fn rewind_feed(&mut self) {
        if let Some(feed) = self.feed.as_mut() {
            feed.rewind();
        }
    }

    async fn emit_batch(
        &self,
        readings: HashMap<String, HazardReadingPayload>,
    ) -> Result<usize, AgentError> {
        let count = readings.len();
        if count == 0 {
            return Ok(0);
        }
        self.router
            .send(AclMessage::inform(
                self.name.clone(),
                names::hazard_agent(),
                MessageContent::FloodDataBatch {
                    readings,
                    source_tag: self.source_tag.clone(),
                },
            ))
            .await?;
        if let Some(stats) = &self.stats {
            stats.add_data_points(count);
        }
        Ok(count)
    }
}

#[async_trait]
impl Agent for FloodCollector {
    fn name(&self) -> &AgentName {
        &self.name
    }

    async fn step(&mut self, ctx: &StepContext) -> Result<StepReport, AgentError> {
        let mut report = StepReport::default();
        let mut refresh_requested = false;

        for message in self.mailbox.drain() {
            report.handled += 1;
            match message.content {
                MessageContent::CollectNow => refresh_requested = true,
                other => {
                    debug!(info_type = other.info_type(), "flood collector ignoring message");
                }
            }
        }

        // Simulated events flow on the tick clock regardless of the scheduler.
        let mut batches: Vec<HashMap<String, HazardReadingPayload>> = Vec::new();
        if let Some(feed) = self.feed.as_mut() {
            for payload in feed.due(ctx.sim_elapsed_s) {
                match serde_json::from_value::<HashMap<String, HazardReadingPayload>>(payload) {
                    Ok(batch) => batches.push(batch),
                    Err(err) => warn!(error = %err, "malformed flood scenario event dropped"),
                }
            }
        }

        if refresh_requested {
            batches.extend(self.source.fetch().await?);
        }

        for batch in batches {
            if self.emit_batch(batch).await? > 0 {
                report.sent += 1;
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use std::time::Duration;

    fn feed_with_one_station() -> ScenarioFeed {
        ScenarioFeed::from_events(vec![(
            10.0,
            json!({
                "marikina-1": {
                    "rainfall_1h": 12.0,
                    "rainfall_24h": 48.0,
                    "river_level_m": 15.1,
                    "alert_level_m": 14.0,
                    "alarm_level_m": 15.0,
                    "critical_level_m": 16.0,
                    "timestamp": "2026-07-01T10:30:00"
                }
            }),
        )])
    }

    #[tokio::test]
    async fn due_events_become_flood_data_batches() {
        let router = MailboxRouter::new(Duration::from_millis(100));
        let mut hazard_mailbox =
            router.register(names::hazard_agent(), MailboxCapacity::default());
        let mut collector = FloodCollector::new(
            Arc::clone(&router),
            MailboxCapacity::default(),
            Some(feed_with_one_station()),
            None,
        );

        let early = StepContext {
            now: Utc::now(),
            sim_elapsed_s: 5.0,
        };
        let report = collector.step(&early).await.unwrap();
        assert_eq!(report.sent, 0);

        let later = StepContext {
            now: Utc::now(),
            sim_elapsed_s: 15.0,
        };
        let report = collector.step(&later).await.unwrap();
        assert_eq!(report.sent, 1);

        let delivered = hazard_mailbox.drain();
        assert_eq!(delivered.len(), 1);
        match &delivered[0].content {
            MessageContent::FloodDataBatch { readings, .. } => {
                assert!(readings.contains_key("marikina-1"));
            }
            other => panic!("unexpected content: {}", other.info_type()),
        }
    }

    #[tokio::test]
    async fn collect_now_with_null_source_sends_nothing() {
        let router = MailboxRouter::new(Duration::from_millis(100));
        let mut hazard_mailbox =
            router.register(names::hazard_agent(), MailboxCapacity::default());
        let mut collector =
            FloodCollector::new(Arc::clone(&router), MailboxCapacity::default(), None, None);

        router
            .send(AclMessage::inform(
                names::system(),
                names::flood_collector(),
                MessageContent::CollectNow,
            ))
            .await
            .unwrap();

        let ctx = StepContext {
            now: Utc::now(),
            sim_elapsed_s: 0.0,
        };
        let report = collector.step(&ctx).await.unwrap();
        assert_eq!(report.handled, 1);
        assert_eq!(report.sent, 0);
        assert!(hazard_mailbox.drain().is_empty());
    }
}
