//! Fusion engine scenarios: spatial propagation, time decay, TTL eviction,
//! official uniform terms, raster sampling and trend classification.

mod common;

use approx::assert_relative_eq;
use chrono::{Duration as ChronoDuration, Utc};
use common::{edge, node};
use floodway::config::{FusionConfig, RasterConfig};
use floodway::domain_types::{EdgeRef, NodeId, ReportKind, ReturnPeriod, TimeStep, TrendDirection};
use floodway::fusion::{
    FusionEngine, HazardReading, HazardReadingPayload, ScoutReport, ScoutReportPayload,
    classify,
};
use floodway::geo::Coord;
use floodway::graph::RoadGraph;
use floodway::raster::{DepthGridService, ScenarioKey};
use proptest::prelude::*;
use std::time::Duration;

/// Two east-west edges north of the reference point: one ~400 m away, one
/// ~1000 m away. Lengths exceed the ~216 m geographic span.
fn two_band_graph() -> RoadGraph {
    RoadGraph::from_parts(
        vec![
            node(1, 14.6536, 121.0990),
            node(2, 14.6536, 121.1010),
            node(3, 14.6590, 121.0990),
            node(4, 14.6590, 121.1010),
        ],
        vec![edge(1, 2, 250.0), edge(3, 4, 250.0)],
        0.01,
        Duration::from_secs(1),
    )
    .unwrap()
}

fn report_point() -> Coord {
    Coord::new(14.6500, 121.1000).unwrap()
}

fn near_edge() -> EdgeRef {
    EdgeRef::new(NodeId::new(1), NodeId::new(2), 0)
}

fn far_edge() -> EdgeRef {
    EdgeRef::new(NodeId::new(3), NodeId::new(4), 0)
}

fn disabled_raster() -> DepthGridService {
    let config = RasterConfig {
        geotiff_enabled: false,
        ..RasterConfig::default()
    };
    DepthGridService::new(&config, std::env::temp_dir().join("floodway-no-rasters"))
}

fn scenario() -> ScenarioKey {
    ScenarioKey::new(ReturnPeriod::Rr02, TimeStep::first())
}

fn scout(severity: f64, confidence: f64, at: chrono::DateTime<chrono::Utc>) -> ScoutReport {
    ScoutReport::from_payload(ScoutReportPayload {
        location_name: None,
        coordinates: Some(floodway::fusion::LatLonPayload {
            lat: report_point().lat,
            lon: report_point().lon,
        }),
        severity,
        confidence,
        report_kind: ReportKind::Flood,
        timestamp: at.to_rfc3339(),
        body: None,
    })
    .unwrap()
}

fn river_alarm_reading(at: chrono::DateTime<chrono::Utc>) -> HazardReading {
    HazardReading::from_payload(
        "marikina-1".to_string(),
        "test".to_string(),
        HazardReadingPayload {
            flood_depth: None,
            rainfall_1h: 0.0,
            rainfall_24h: 0.0,
            river_level_m: Some(15.5),
            alert_level_m: Some(14.0),
            alarm_level_m: Some(15.0),
            critical_level_m: Some(16.0),
            reservoir_water_level_m: None,
            normal_high_water_level_m: None,
            timestamp: at.to_rfc3339(),
        },
    )
    .unwrap()
}

#[tokio::test]
async fn geocoded_report_propagates_with_proximity_falloff() {
    let graph = two_band_graph();
    let raster = disabled_raster();
    let mut engine = FusionEngine::new(FusionConfig::default());
    let now = Utc::now();

    engine.ingest_scout_batch(vec![scout(1.0, 1.0, now)]);
    let outcome = engine
        .run_tick(&graph, &raster, scenario(), now)
        .await
        .unwrap();
    assert!(outcome.edges_updated >= 1);

    // Independent re-derivation of the proximity factor from the radial query.
    let hits = graph
        .find_edges_within_radius(report_point().lat, report_point().lon, 800.0)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    let expected = (1.0 - hits[0].distance_m / 800.0) * 0.3;

    let snapshot = graph.snapshot_risk().await;
    assert_relative_eq!(
        snapshot[&near_edge()].as_f64(),
        expected,
        max_relative = 1e-9
    );
    // The edge a kilometer out is untouched.
    assert_eq!(snapshot[&far_edge()].as_f64(), 0.0);
}

#[tokio::test]
async fn severity_decays_to_the_closed_form_then_floors_out() {
    let graph = two_band_graph();
    let raster = disabled_raster();
    let mut engine = FusionEngine::new(FusionConfig::default());
    let t0 = Utc::now();

    engine.ingest_scout_batch(vec![scout(0.8, 1.0, t0)]);

    // Five silent ticks one minute apart.
    for minute in 1..=5 {
        engine
            .run_tick(
                &graph,
                &raster,
                scenario(),
                t0 + ChronoDuration::minutes(minute),
            )
            .await
            .unwrap();
    }

    let hits = graph
        .find_edges_within_radius(report_point().lat, report_point().lon, 800.0)
        .await
        .unwrap();
    let proximity = 1.0 - hits[0].distance_m / 800.0;
    // No official river data, so the fast rate (0.10/min) applies.
    let expected = 0.8 * proximity * (-0.10f64 * 5.0).exp() * 0.3;

    let snapshot = graph.snapshot_risk().await;
    assert_relative_eq!(
        snapshot[&near_edge()].as_f64(),
        expected,
        max_relative = 0.01
    );

    // Past the 45-minute TTL the report is gone and the residual falls
    // through the floor to exactly zero.
    engine
        .run_tick(&graph, &raster, scenario(), t0 + ChronoDuration::minutes(50))
        .await
        .unwrap();
    let snapshot = graph.snapshot_risk().await;
    assert_eq!(snapshot[&near_edge()].as_f64(), 0.0);
    assert_eq!(engine.scout_cache_len(), 0);
}

#[tokio::test]
async fn official_reading_raises_every_edge_uniformly() {
    let graph = two_band_graph();
    let raster = disabled_raster();
    let mut engine = FusionEngine::new(FusionConfig::default());
    let now = Utc::now();

    engine.ingest_flood_batch(vec![river_alarm_reading(now)]);
    engine
        .run_tick(&graph, &raster, scenario(), now)
        .await
        .unwrap();

    // Alarm classifies to 0.8; the historical weight is 0.2.
    let snapshot = graph.snapshot_risk().await;
    assert_relative_eq!(snapshot[&near_edge()].as_f64(), 0.16, max_relative = 1e-6);
    assert_relative_eq!(snapshot[&far_edge()].as_f64(), 0.16, max_relative = 1e-6);
}

#[tokio::test]
async fn silence_converges_risk_to_zero_monotonically() {
    let graph = two_band_graph();
    let raster = disabled_raster();
    let mut engine = FusionEngine::new(FusionConfig::default());
    let t0 = Utc::now();

    engine.ingest_flood_batch(vec![river_alarm_reading(t0)]);
    engine
        .run_tick(&graph, &raster, scenario(), t0)
        .await
        .unwrap();
    let mut previous = graph.snapshot_risk().await[&near_edge()].as_f64();
    assert!(previous > 0.0);

    // The official reading keeps decaying, then TTLs out at 90 minutes, and
    // whatever residual remains decays spatially. Risk never rises.
    for minutes in [30, 60, 95, 120, 180] {
        engine
            .run_tick(
                &graph,
                &raster,
                scenario(),
                t0 + ChronoDuration::minutes(minutes),
            )
            .await
            .unwrap();
        let current = graph.snapshot_risk().await[&near_edge()].as_f64();
        assert!(current <= previous + 1e-12);
        previous = current;
    }
    assert_eq!(previous, 0.0);
}

#[tokio::test]
async fn non_geocoded_reports_feed_the_environment_factor() {
    let graph = two_band_graph();
    let raster = disabled_raster();
    let mut engine = FusionEngine::new(FusionConfig::default());
    let now = Utc::now();

    let ungeolocated = ScoutReport::from_payload(ScoutReportPayload {
        location_name: Some("somewhere in Marikina".to_string()),
        coordinates: None,
        severity: 0.6,
        confidence: 1.0,
        report_kind: ReportKind::Flood,
        timestamp: now.to_rfc3339(),
        body: None,
    })
    .unwrap();
    engine.ingest_scout_batch(vec![ungeolocated]);
    engine
        .run_tick(&graph, &raster, scenario(), now)
        .await
        .unwrap();

    // Half the crowd weight, uniformly: 0.6 * (0.3 / 2).
    let snapshot = graph.snapshot_risk().await;
    assert_relative_eq!(snapshot[&near_edge()].as_f64(), 0.09, max_relative = 1e-6);
    assert_relative_eq!(snapshot[&far_edge()].as_f64(), 0.09, max_relative = 1e-6);
}

#[tokio::test]
async fn raster_depth_contributes_at_half_weight() {
    // Write a 4x4 grid of 0.8 m depth under rr02/rr02-1.tif.
    let dir = tempfile::tempdir().unwrap();
    let rr02 = dir.path().join("rr02");
    std::fs::create_dir_all(&rr02).unwrap();
    let file = std::fs::File::create(rr02.join("rr02-1.tif")).unwrap();
    let mut encoder = tiff::encoder::TiffEncoder::new(std::io::BufWriter::new(file)).unwrap();
    encoder
        .write_image::<tiff::encoder::colortype::Gray32Float>(4, 4, &[0.8f32; 16])
        .unwrap();

    let graph = two_band_graph();
    let raster = DepthGridService::new(&RasterConfig::default(), dir.path().to_path_buf());
    let mut engine = FusionEngine::new(FusionConfig::default());
    let now = Utc::now();

    engine
        .run_tick(&graph, &raster, scenario(), now)
        .await
        .unwrap();

    // depth_to_risk(0.8) = 0.7, weighted at 0.5.
    let expected = classify::depth_to_risk(0.8) * 0.5;
    let snapshot = graph.snapshot_risk().await;
    assert_relative_eq!(
        snapshot[&near_edge()].as_f64(),
        expected,
        max_relative = 1e-6
    );
    assert_relative_eq!(
        snapshot[&far_edge()].as_f64(),
        expected,
        max_relative = 1e-6
    );

    // Disabling the service removes the depth term on the next tick.
    raster.set_enabled(false);
    engine
        .run_tick(
            &graph,
            &raster,
            scenario(),
            now + ChronoDuration::minutes(1),
        )
        .await
        .unwrap();
    let snapshot = graph.snapshot_risk().await;
    assert!(snapshot[&near_edge()].as_f64() < expected);
}

#[tokio::test]
async fn trend_tracks_rising_then_falling_average() {
    let graph = two_band_graph();
    let raster = disabled_raster();
    let mut engine = FusionEngine::new(FusionConfig::default());
    let t0 = Utc::now();

    // Quiet baseline commit.
    let baseline = engine
        .run_tick(&graph, &raster, scenario(), t0)
        .await
        .unwrap();
    assert_eq!(baseline.risk_trend, TrendDirection::Stable);

    // New official signal: the average jumps.
    engine.ingest_flood_batch(vec![river_alarm_reading(t0 + ChronoDuration::minutes(1))]);
    let rising = engine
        .run_tick(&graph, &raster, scenario(), t0 + ChronoDuration::minutes(1))
        .await
        .unwrap();
    assert_eq!(rising.risk_trend, TrendDirection::Increasing);
    assert!(rising.risk_change_rate > 0.0);

    // Silence afterwards: decay pulls the average down.
    let falling = engine
        .run_tick(&graph, &raster, scenario(), t0 + ChronoDuration::minutes(30))
        .await
        .unwrap();
    assert_eq!(falling.risk_trend, TrendDirection::Decreasing);
}

proptest! {
    /// One decay over `a + b` minutes equals the composition of decays over
    /// `a` then `b` minutes (the silent-tick idempotence law).
    #[test]
    fn decay_composes(
        value in 0.0f64..1.0,
        k in 0.01f64..0.2,
        a in 0.0f64..60.0,
        b in 0.0f64..60.0,
    ) {
        let whole = floodway::fusion::decay::exp_decay(value, k, a + b);
        let split = floodway::fusion::decay::exp_decay(
            floodway::fusion::decay::exp_decay(value, k, a),
            k,
            b,
        );
        prop_assert!((whole - split).abs() <= 1e-12_f64.max(whole * 1e-9));
    }

    /// The depth curve is monotone non-decreasing and bounded by [0, 1].
    #[test]
    fn depth_curve_monotone(d1 in 0.0f64..3.0, d2 in 0.0f64..3.0) {
        let (lo, hi) = if d1 <= d2 { (d1, d2) } else { (d2, d1) };
        let r_lo = classify::depth_to_risk(lo);
        let r_hi = classify::depth_to_risk(hi);
        prop_assert!(r_lo <= r_hi + 1e-12);
        prop_assert!((0.0..=1.0).contains(&r_lo));
        prop_assert!((0.0..=1.0).contains(&r_hi));
    }
}
