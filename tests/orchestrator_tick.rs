//! Tick orchestration: phase ordering, scenario advancement, reset, and the
//! message-driven round trip from scout report to risk-aware route reply.

mod common;

use chrono::Utc;
use common::{corners, square_graph};
use floodway::agents::evacuation::{Shelter, ShelterRoster};
use floodway::config::{AppConfig, RasterConfig};
use floodway::domain_types::{MailboxCapacity, ReturnPeriod, SimulationMode, TimeStep};
use floodway::fusion::ScoutReportPayload;
use floodway::messaging::{AclMessage, MessageContent, Performative, names};
use floodway::orchestrator::scheduler::SchedulerStats;
use floodway::orchestrator::{OrchestratorEvent, TickError, TickOrchestrator};
use floodway::raster::DepthGridService;
use floodway::messaging::MailboxRouter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

struct Harness {
    orchestrator: TickOrchestrator,
    router: Arc<MailboxRouter>,
    events: broadcast::Receiver<OrchestratorEvent>,
}

fn harness() -> Harness {
    let config = AppConfig::default();
    let graph = Arc::new(square_graph());
    let raster_config = RasterConfig {
        geotiff_enabled: false,
        ..RasterConfig::default()
    };
    let raster = Arc::new(DepthGridService::new(
        &raster_config,
        std::env::temp_dir().join("floodway-orchestrator-tests"),
    ));
    let router = MailboxRouter::new(config.send_timeout());
    let shelters = Arc::new(ShelterRoster::from_shelters(vec![Shelter {
        name: "Barangay Hall".to_string(),
        coord: corners().1,
        capacity: 400,
        kind: "hall".to_string(),
        address: None,
    }]));
    let (events_tx, events) = broadcast::channel(64);

    let orchestrator = TickOrchestrator::new(
        config,
        graph,
        raster,
        Arc::clone(&router),
        shelters,
        Arc::new(SchedulerStats::default()),
        events_tx,
    )
    .unwrap();

    Harness {
        orchestrator,
        router,
        events,
    }
}

fn scout_batch() -> MessageContent {
    MessageContent::ScoutReportBatch {
        reports: vec![ScoutReportPayload {
            location_name: None,
            coordinates: Some(floodway::fusion::LatLonPayload {
                lat: 14.6005,
                lon: 121.0000,
            }),
            severity: 0.9,
            confidence: 1.0,
            report_kind: floodway::domain_types::ReportKind::Flood,
            timestamp: Utc::now().to_rfc3339(),
            body: None,
        }],
    }
}

#[tokio::test]
async fn ticks_require_a_running_session() {
    let mut h = harness();
    let result = h.orchestrator.run_tick(None).await;
    assert!(matches!(result, Err(TickError::NotRunning)));
}

#[tokio::test]
async fn start_binds_the_mode_and_ticks_advance_the_scenario() {
    let mut h = harness();
    h.orchestrator.start(SimulationMode::Medium);

    let status = h.orchestrator.status();
    assert!(status.running);
    assert_eq!(status.return_period, ReturnPeriod::Rr02);
    assert_eq!(status.time_step.as_u8(), 1);

    let summary = h.orchestrator.run_tick(None).await.unwrap();
    assert_eq!(summary.tick_count, 1);
    assert_eq!(summary.time_step.as_u8(), 2);

    // Seventeen more ticks wrap the hourly index back to 1.
    for _ in 0..17 {
        h.orchestrator.run_tick(None).await.unwrap();
    }
    assert_eq!(h.orchestrator.status().time_step.as_u8(), 1);
    assert_eq!(h.orchestrator.status().tick_count, 18);
}

#[tokio::test]
async fn scout_message_raises_risk_and_broadcasts_the_update() {
    let mut h = harness();
    h.orchestrator.start(SimulationMode::Medium);

    h.router
        .send(AclMessage::inform(
            names::system(),
            names::hazard_agent(),
            scout_batch(),
        ))
        .await
        .unwrap();

    let summary = h.orchestrator.run_tick(None).await.unwrap();
    assert!(summary.outcome.edges_updated > 0);
    assert!(summary.outcome.average_risk > 0.0);

    let mut saw_risk_update = false;
    while let Ok(event) = h.events.try_recv() {
        if matches!(event, OrchestratorEvent::RiskUpdate(_)) {
            saw_risk_update = true;
        }
    }
    assert!(saw_risk_update);
}

#[tokio::test]
async fn quiet_ticks_do_not_broadcast_risk_updates() {
    let mut h = harness();
    h.orchestrator.start(SimulationMode::Light);

    h.orchestrator.run_tick(None).await.unwrap();
    while let Ok(event) = h.events.try_recv() {
        assert!(
            !matches!(event, OrchestratorEvent::RiskUpdate(_)),
            "no risk_update expected on a tick with zero changed edges"
        );
    }
    // Time still advanced.
    assert_eq!(h.orchestrator.status().tick_count, 1);
}

#[tokio::test]
async fn route_requests_are_served_in_the_routing_phase() {
    let mut h = harness();
    h.orchestrator.start(SimulationMode::Medium);
    let mut asker = h
        .router
        .register(names::system(), MailboxCapacity::default());

    let (start, end) = corners();
    let request = AclMessage::request(
        names::system(),
        names::planner_agent(),
        MessageContent::CalculateRoute {
            start_lat: start.lat,
            start_lon: start.lon,
            end_lat: end.lat,
            end_lon: end.lon,
            preferences: floodway::planner::RoutePreferences::default(),
        },
    );
    let reply_id = request.reply_with.unwrap();
    h.router.send(request).await.unwrap();

    h.orchestrator.run_tick(None).await.unwrap();

    let reply = asker
        .await_reply(reply_id, Duration::from_millis(200))
        .await
        .unwrap();
    assert_eq!(reply.performative, Performative::Inform);
    match reply.content {
        MessageContent::RouteResult { route, .. } => {
            assert_eq!(route.nodes.len(), 3);
        }
        other => panic!("unexpected reply content: {}", other.info_type()),
    }
}

#[tokio::test]
async fn distress_calls_round_trip_through_the_evacuation_manager() {
    let mut h = harness();
    h.orchestrator.start(SimulationMode::Medium);
    let mut caller = h
        .router
        .register(names::system(), MailboxCapacity::default());

    let (start, _) = corners();
    let distress = AclMessage::request(
        names::system(),
        names::evacuation_manager(),
        MessageContent::DistressCall {
            lat: start.lat,
            lon: start.lon,
            preferences: floodway::planner::RoutePreferences::default(),
        },
    );
    let reply_id = distress.reply_with.unwrap();
    h.router.send(distress).await.unwrap();

    h.orchestrator.run_tick(None).await.unwrap();

    let reply = caller
        .await_reply(reply_id, Duration::from_millis(200))
        .await
        .unwrap();
    match reply.content {
        MessageContent::RouteResult { shelter_name, .. } => {
            assert_eq!(shelter_name.as_deref(), Some("Barangay Hall"));
        }
        other => panic!("unexpected reply content: {}", other.info_type()),
    }
}

#[tokio::test]
async fn reset_clears_risk_and_rewinds_the_session() {
    let mut h = harness();
    h.orchestrator.start(SimulationMode::Heavy);

    h.router
        .send(AclMessage::inform(
            names::system(),
            names::hazard_agent(),
            scout_batch(),
        ))
        .await
        .unwrap();
    h.orchestrator.run_tick(None).await.unwrap();

    h.orchestrator.reset().await.unwrap();
    let status = h.orchestrator.status();
    assert_eq!(status.tick_count, 0);
    assert_eq!(status.time_step.as_u8(), 1);

    // All risk is gone; the next tick starts from a clean slate.
    let summary = h.orchestrator.run_tick(None).await.unwrap();
    assert_eq!(summary.outcome.average_risk, 0.0);
}

#[tokio::test]
async fn stop_pauses_the_session() {
    let mut h = harness();
    h.orchestrator.start(SimulationMode::Light);
    h.orchestrator.run_tick(None).await.unwrap();
    h.orchestrator.stop();
    assert!(matches!(
        h.orchestrator.run_tick(None).await,
        Err(TickError::NotRunning)
    ));
}

#[tokio::test]
async fn scenario_override_takes_effect_for_the_next_tick() {
    let mut h = harness();
    h.orchestrator.start(SimulationMode::Light);
    h.orchestrator
        .set_scenario(ReturnPeriod::Rr04, TimeStep::try_new(10).unwrap());

    let status = h.orchestrator.status();
    assert_eq!(status.return_period, ReturnPeriod::Rr04);
    assert_eq!(status.time_step.as_u8(), 10);

    let summary = h.orchestrator.run_tick(None).await.unwrap();
    assert_eq!(summary.time_step.as_u8(), 11);
}
