//! Tick orchestrator
//!
//! Drives the four tick phases in strict order: Collection, Fusion, Routing,
//! Advancement. Phase N observes the completion of phase N-1; external
//! readers of the graph see either the pre-tick or the post-tick risk state,
//! never a partial commit.

pub mod bus;
pub mod scheduler;

use crate::agents::evacuation::{EvacuationManager, ShelterRoster};
use crate::agents::flood_collector::FloodCollector;
use crate::agents::hazard_agent::HazardAgent;
use crate::agents::planner_agent::PlannerAgent;
use crate::agents::scout_collector::ScoutCollector;
use crate::agents::{Agent, AgentError, ScenarioFeed, StepContext};
use crate::config::AppConfig;
use crate::fusion::{FusionEngine, FusionError, FusionOutcome, HazardReading};
use crate::graph::{GraphError, RoadGraph};
use crate::messaging::MailboxRouter;
use crate::raster::{DepthGridService, ScenarioKey};
use crate::domain_types::{ReturnPeriod, SimulationMode, TimeStep};
use bus::SharedDataBus;
use chrono::{DateTime, Utc};
use scheduler::{SchedulerStats, SchedulerStatsSnapshot};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Tick-level errors. Everything here aborts the current tick; the graph
/// keeps its pre-tick state.
#[derive(Debug, Error)]
pub enum TickError {
    /// `run_tick` was called outside a running session.
    #[error("simulation is not running")]
    NotRunning,

    /// The fusion phase failed.
    #[error(transparent)]
    Fusion(#[from] FusionError),

    /// An agent step failed.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// A graph operation failed.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Events fanned out to WebSocket clients at phase boundaries.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    /// The official-reading cache changed this tick.
    FloodUpdate {
        /// Latest cached readings.
        readings: Vec<HazardReading>,
    },
    /// A location's classified risk reached critical this tick.
    CriticalAlert {
        /// The critical reading.
        reading: HazardReading,
    },
    /// The fusion phase changed at least one edge.
    RiskUpdate(FusionOutcome),
    /// Refresh scheduler statistics changed.
    SchedulerUpdate(SchedulerStatsSnapshot),
}

/// Serializable view of the session state.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationStatus {
    /// Whether ticks are executing.
    pub running: bool,
    /// Bound scenario mode, once started.
    pub mode: Option<SimulationMode>,
    /// Active raster bundle.
    pub return_period: ReturnPeriod,
    /// Next time step to fuse against.
    pub time_step: TimeStep,
    /// Ticks executed this session.
    pub tick_count: u64,
    /// When the session was started.
    pub started_at: Option<DateTime<Utc>>,
}

/// What one tick accomplished.
#[derive(Debug, Clone, Serialize)]
pub struct TickSummary {
    /// Tick counter after advancement.
    pub tick_count: u64,
    /// Time step after advancement.
    pub time_step: TimeStep,
    /// The fusion result.
    pub outcome: FusionOutcome,
}

/// The tick orchestrator. Owns the fusion engine, the shared bus and every
/// agent; the HTTP layer reaches it behind an async mutex.
pub struct TickOrchestrator {
    config: AppConfig,
    graph: Arc<RoadGraph>,
    raster: Arc<DepthGridService>,
    bus: Arc<SharedDataBus>,
    fusion: FusionEngine,
    flood_collector: FloodCollector,
    scout_collector: ScoutCollector,
    hazard_agent: HazardAgent,
    planner_agent: PlannerAgent,
    evacuation_manager: EvacuationManager,
    events: broadcast::Sender<OrchestratorEvent>,
    running: bool,
    mode: Option<SimulationMode>,
    return_period: ReturnPeriod,
    time_step: TimeStep,
    tick_count: u64,
    started_at: Option<DateTime<Utc>>,
}

impl TickOrchestrator {
    /// Wires the agents onto the router and builds the orchestrator.
    /// Simulated feeds come from the configured scenario file when present.
    pub fn new(
        config: AppConfig,
        graph: Arc<RoadGraph>,
        raster: Arc<DepthGridService>,
        router: Arc<MailboxRouter>,
        shelters: Arc<ShelterRoster>,
        stats: Arc<SchedulerStats>,
        events: broadcast::Sender<OrchestratorEvent>,
    ) -> Result<Self, AgentError> {
        let capacity = config.messaging.mailbox_capacity;
        let (flood_feed, scout_feed) = match &config.data.scenario_path {
            Some(path) => (
                Some(ScenarioFeed::from_csv_path(path, "flood_agent")?),
                Some(ScenarioFeed::from_csv_path(path, "scout_agent")?),
            ),
            None => (None, None),
        };

        let bus = Arc::new(SharedDataBus::new());
        let flood_collector = FloodCollector::new(
            Arc::clone(&router),
            capacity,
            flood_feed,
            Some(stats),
        );
        let scout_collector = ScoutCollector::new(Arc::clone(&router), capacity, scout_feed);
        let hazard_agent = HazardAgent::new(
            Arc::clone(&router),
            capacity,
            Arc::clone(&bus),
            Arc::clone(&graph),
        );
        let planner_agent = PlannerAgent::new(
            Arc::clone(&router),
            capacity,
            Arc::clone(&graph),
            shelters,
            config.planner.clone(),
        );
        let evacuation_manager =
            EvacuationManager::new(Arc::clone(&router), capacity, config.reply_deadline());

        Ok(Self {
            fusion: FusionEngine::new(config.fusion.clone()),
            config,
            graph,
            raster,
            bus,
            flood_collector,
            scout_collector,
            hazard_agent,
            planner_agent,
            evacuation_manager,
            events,
            running: false,
            mode: None,
            return_period: ReturnPeriod::Rr02,
            time_step: TimeStep::first(),
            tick_count: 0,
            started_at: None,
        })
    }

    /// The shared bus (read by the WebSocket status surface).
    #[must_use]
    pub fn bus(&self) -> Arc<SharedDataBus> {
        Arc::clone(&self.bus)
    }

    /// Whether ticks are currently being executed.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Binds a scenario mode and begins at time step 1.
    pub fn start(&mut self, mode: SimulationMode) {
        self.mode = Some(mode);
        self.return_period = mode.return_period();
        self.time_step = TimeStep::first();
        self.tick_count = 0;
        self.running = true;
        self.started_at = Some(Utc::now());
        info!(mode = ?mode, return_period = %self.return_period, "simulation started");
    }

    /// Pauses tick scheduling. State is preserved.
    pub fn stop(&mut self) {
        self.running = false;
        info!("simulation stopped");
    }

    /// Clears every cache, zeroes graph risk, rewinds simulated feeds.
    pub async fn reset(&mut self) -> Result<(), TickError> {
        self.fusion.clear();
        self.bus.reset();
        self.flood_collector.rewind_feed();
        self.scout_collector.rewind_feed();
        let cleared = self.graph.reset_risks().await?;
        self.time_step = TimeStep::first();
        self.tick_count = 0;
        info!(edges_cleared = cleared, "simulation reset");
        Ok(())
    }

    /// Overrides the active raster scenario.
    pub fn set_scenario(&mut self, return_period: ReturnPeriod, time_step: TimeStep) {
        self.return_period = return_period;
        self.time_step = time_step;
    }

    /// Current session state.
    #[must_use]
    pub fn status(&self) -> SimulationStatus {
        SimulationStatus {
            running: self.running,
            mode: self.mode,
            return_period: self.return_period,
            time_step: self.time_step,
            tick_count: self.tick_count,
            started_at: self.started_at,
        }
    }

    fn emit(&self, event: OrchestratorEvent) {
        // Lagging or absent subscribers are not an error.
        let _ = self.events.send(event);
    }

    /// Executes one tick: Collection, Fusion, Routing, Advancement.
    pub async fn run_tick(
        &mut self,
        override_time_step: Option<TimeStep>,
    ) -> Result<TickSummary, TickError> {
        if !self.running {
            return Err(TickError::NotRunning);
        }
        if let Some(step) = override_time_step {
            self.time_step = step;
        }
        let now = Utc::now();
        let ctx = StepContext {
            now,
            sim_elapsed_s: self.tick_count as f64 * self.config.tick.tick_interval_ms as f64
                / 1000.0,
        };
        let scenario = ScenarioKey::new(self.return_period, self.time_step);

        // Phase 1 - Collection. The bus clears, collectors produce inputs.
        self.bus.begin_collection();
        self.flood_collector.step(&ctx).await?;
        self.scout_collector.step(&ctx).await?;

        // Phase 2 - Fusion. The hazard agent stages validated entities, the
        // engine ingests them and commits the integrated risk state.
        self.hazard_agent.step(&ctx).await?;
        let (flood_inputs, scout_inputs) = self.bus.take_inputs();
        if !flood_inputs.is_empty() {
            self.fusion.ingest_flood_batch(flood_inputs);
            self.emit(OrchestratorEvent::FloodUpdate {
                readings: self.fusion.cached_readings().into_iter().cloned().collect(),
            });
        }
        self.fusion.ingest_scout_batch(scout_inputs);
        for reading in self.fusion.take_newly_critical() {
            warn!(location = %reading.location_id, "location risk is critical");
            self.emit(OrchestratorEvent::CriticalAlert { reading });
        }
        let outcome = self
            .fusion
            .run_tick(&self.graph, &self.raster, scenario, now)
            .await?;
        self.bus.record_outcome(outcome.clone());
        if outcome.edges_updated > 0 {
            self.emit(OrchestratorEvent::RiskUpdate(outcome.clone()));
        }

        // Phase 3 - Routing. The manager translates distress calls, the
        // planner answers, the manager relays. Requests arriving after the
        // planner's drain wait for the next tick.
        self.evacuation_manager.step(&ctx).await?;
        self.planner_agent.step(&ctx).await?;
        self.evacuation_manager.step(&ctx).await?;

        // Phase 4 - Advancement.
        self.time_step = self.time_step.advance();
        self.tick_count += 1;

        Ok(TickSummary {
            tick_count: self.tick_count,
            time_step: self.time_step,
            outcome,
        })
    }
}

/// Spawns the periodic tick driver. Ticks only run while the orchestrator is
/// in the running state; errors are logged and the loop keeps going.
pub fn spawn_tick_driver(
    orchestrator: Arc<tokio::sync::Mutex<TickOrchestrator>>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let mut guard = orchestrator.lock().await;
            if !guard.is_running() {
                continue;
            }
            match guard.run_tick(None).await {
                Ok(summary) => {
                    if summary.outcome.edges_updated > 0 {
                        info!(
                            tick = summary.tick_count,
                            edges = summary.outcome.edges_updated,
                            avg_risk = summary.outcome.average_risk,
                            "tick committed"
                        );
                    }
                }
                Err(TickError::NotRunning) => {}
                Err(err) => error!(error = %err, "tick failed, pre-tick state kept"),
            }
        }
    })
}
