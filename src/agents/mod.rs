//! Agents
//!
//! Every agent implements [`Agent::step`]: drain the mailbox, do the work,
//! emit messages through the router. No agent holds a reference to another
//! agent; the tick orchestrator decides when each one steps.

pub mod evacuation;
pub mod flood_collector;
pub mod hazard_agent;
pub mod planner_agent;
pub mod scout_collector;

use crate::domain_types::AgentName;
use crate::graph::GraphError;
use crate::messaging::SendError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Agent step errors. Send failures are the common case; everything else an
/// agent can usually drop-and-warn locally.
#[derive(Debug, Error)]
pub enum AgentError {
    /// A mailbox send failed.
    #[error(transparent)]
    Send(#[from] SendError),

    /// A graph query failed.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// The scenario CSV could not be loaded.
    #[error("scenario file error: {0}")]
    Scenario(String),

    /// The shelter roster CSV could not be loaded.
    #[error("shelter roster error: {0}")]
    Roster(String),
}

/// Per-step context handed down by the orchestrator.
#[derive(Debug, Clone, Copy)]
pub struct StepContext {
    /// Wall-clock time of this tick.
    pub now: DateTime<Utc>,
    /// Simulation clock: seconds elapsed since the session started.
    pub sim_elapsed_s: f64,
}

/// What one step accomplished.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepReport {
    /// Inbound messages drained and dispatched.
    pub handled: usize,
    /// Outbound messages emitted.
    pub sent: usize,
}

/// One autonomous participant of the tick pipeline.
#[async_trait]
pub trait Agent: Send {
    /// The agent's registered mailbox name.
    fn name(&self) -> &AgentName;

    /// Drains mail, does this tick's work, emits messages.
    async fn step(&mut self, ctx: &StepContext) -> Result<StepReport, AgentError>;
}

/// One row of the pre-recorded scenario stream.
#[derive(Debug, Clone, Deserialize)]
struct ScenarioRow {
    time_offset_seconds: f64,
    agent: String,
    payload_json: String,
}

/// A pre-recorded event stream for one agent, delivered in simulation time.
///
/// Events fire when the simulation clock first exceeds their offset; the
/// cursor only moves forward, so each event is delivered exactly once.
#[derive(Debug, Default)]
pub struct ScenarioFeed {
    events: Vec<(f64, serde_json::Value)>,
    cursor: usize,
}

impl ScenarioFeed {
    /// Loads the rows tagged for `agent_tag` from a scenario CSV. Header and
    /// field whitespace is tolerated.
    pub fn from_csv_path(path: &Path, agent_tag: &str) -> Result<Self, AgentError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| AgentError::Scenario(e.to_string()))?;
        let mut events = Vec::new();
        for row in reader.deserialize::<ScenarioRow>() {
            let row = row.map_err(|e| AgentError::Scenario(e.to_string()))?;
            if row.agent != agent_tag {
                continue;
            }
            let payload: serde_json::Value = serde_json::from_str(&row.payload_json)
                .map_err(|e| {
                    AgentError::Scenario(format!(
                        "bad payload at offset {}: {e}",
                        row.time_offset_seconds
                    ))
                })?;
            events.push((row.time_offset_seconds, payload));
        }
        events.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(Self { events, cursor: 0 })
    }

    /// Builds a feed from in-memory events (tests, synthetic scenarios).
    #[must_use]
    pub fn from_events(mut events: Vec<(f64, serde_json::Value)>) -> Self {
        events.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { events, cursor: 0 }
    }

    /// Events whose offset the simulation clock has now passed.
    pub fn due(&mut self, sim_elapsed_s: f64) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        while let Some((offset, payload)) = self.events.get(self.cursor) {
            if *offset < sim_elapsed_s {
                out.push(payload.clone());
                self.cursor += 1;
            } else {
                break;
            }
        }
        out
    }

    /// Rewinds delivery to the beginning (session reset).
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Events not yet delivered.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.events.len() - self.cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn feed_delivers_in_order_exactly_once() {
        let mut feed = ScenarioFeed::from_events(vec![
            (30.0, json!({"b": 2})),
            (5.0, json!({"a": 1})),
            (90.0, json!({"c": 3})),
        ]);

        assert!(feed.due(0.0).is_empty());
        let first = feed.due(31.0);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0]["a"], 1);
        assert_eq!(first[1]["b"], 2);
        // Clock moving on does not re-deliver.
        assert!(feed.due(31.0).is_empty());
        assert_eq!(feed.remaining(), 1);

        feed.rewind();
        assert_eq!(feed.remaining(), 3);
    }

    #[test]
    fn feed_loads_only_matching_agent_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenario.csv");
        std::fs::write(
            &path,
            "time_offset_seconds,agent,payload_json\n\
             10.0,flood_agent,\"{\"\"x\"\": 1}\"\n\
             20.0,scout_agent,\"{\"\"y\"\": 2}\"\n",
        )
        .unwrap();

        let mut feed = ScenarioFeed::from_csv_path(&path, "scout_agent").unwrap();
        assert_eq!(feed.remaining(), 1);
        let due = feed.due(25.0);
        assert_eq!(due[0]["y"], 2);
    }
}
