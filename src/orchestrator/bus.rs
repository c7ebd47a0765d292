//! Shared data bus
//!
//! The orchestrator-owned staging area between tick phases. Collectors feed
//! the hazard agent through their mailboxes; the hazard agent validates and
//! stages entities here; the fusion phase takes them. Cleared at the start
//! of every collection phase.

use crate::fusion::{FusionOutcome, HazardReading, ScoutReport};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct BusInner {
    flood_data: Vec<HazardReading>,
    scout_data: Vec<ScoutReport>,
    graph_updated: bool,
    last_outcome: Option<FusionOutcome>,
}

/// The per-tick staging aggregate. Short mutex sections only.
#[derive(Debug, Default)]
pub struct SharedDataBus {
    inner: Mutex<BusInner>,
}

impl SharedDataBus {
    /// Builds an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the staged inputs and the updated flag (collection phase start).
    pub fn begin_collection(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.flood_data.clear();
        inner.scout_data.clear();
        inner.graph_updated = false;
    }

    /// Stages validated official readings.
    pub fn stage_flood(&self, readings: Vec<HazardReading>) {
        self.inner.lock().unwrap().flood_data.extend(readings);
    }

    /// Stages validated scout reports.
    pub fn stage_scouts(&self, reports: Vec<ScoutReport>) {
        self.inner.lock().unwrap().scout_data.extend(reports);
    }

    /// Takes everything staged for the fusion phase.
    pub fn take_inputs(&self) -> (Vec<HazardReading>, Vec<ScoutReport>) {
        let mut inner = self.inner.lock().unwrap();
        (
            std::mem::take(&mut inner.flood_data),
            std::mem::take(&mut inner.scout_data),
        )
    }

    /// Records the fusion result for this tick.
    pub fn record_outcome(&self, outcome: FusionOutcome) {
        let mut inner = self.inner.lock().unwrap();
        inner.graph_updated = outcome.edges_updated > 0;
        inner.last_outcome = Some(outcome);
    }

    /// Whether the last fusion pass changed any edge.
    #[must_use]
    pub fn graph_updated(&self) -> bool {
        self.inner.lock().unwrap().graph_updated
    }

    /// The most recent fusion outcome, if any tick has run.
    #[must_use]
    pub fn last_outcome(&self) -> Option<FusionOutcome> {
        self.inner.lock().unwrap().last_outcome.clone()
    }

    /// Full reset: staged inputs and the recorded outcome.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = BusInner::default();
    }
}
