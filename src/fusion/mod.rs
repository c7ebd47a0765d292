//! Hazard fusion engine
//!
//! Maintains the caches of official hazard readings and crowdsourced scout
//! reports, derives an integrated risk score per road edge every tick, and
//! commits the scores to the graph store in one batch. Contributions are
//! additive with a clamp; a fresh signal replaces the decayed residual so
//! risk can fall when conditions improve.

pub mod classify;
pub mod decay;

use crate::config::FusionConfig;
use crate::domain_types::{
    Confidence, EdgeRef, ReportKind, RiskLevel, RiskScore, Severity, TimeStep, TrendDirection,
};
use crate::geo::Coord;
use crate::graph::{EdgeRiskUpdate, GraphError, RoadGraph};
use crate::raster::{DepthGridService, ScenarioKey};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Fusion phase errors. Anything surfacing here is fatal for the tick; the
/// dropped-input path only warns.
#[derive(Debug, Error)]
pub enum FusionError {
    /// The batch write to the graph failed (lock deadline included).
    #[error("risk commit failed: {0}")]
    Commit(#[from] GraphError),
}

/// Payload validation errors. Offending entries are dropped with a warning.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// The timestamp matched no accepted format.
    #[error("unparseable timestamp: {0}")]
    BadTimestamp(String),

    /// Coordinates outside WGS84 bounds.
    #[error("invalid coordinate lat={lat} lon={lon}")]
    BadCoordinate {
        /// The rejected latitude.
        lat: f64,
        /// The rejected longitude.
        lon: f64,
    },

    /// Severity or confidence outside `[0, 1]`.
    #[error("severity/confidence out of range: {0}")]
    BadScore(f64),
}

/// Official per-location hazard reading, classified at ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HazardReading {
    /// Station or gauge identifier.
    pub location_id: String,
    /// When the reading was taken.
    pub timestamp: DateTime<Utc>,
    /// Rainfall over the last hour.
    pub rainfall_1h_mm: f64,
    /// Rainfall over the last day.
    pub rainfall_24h_mm: f64,
    /// Observed river water level.
    pub river_level_m: Option<f64>,
    /// Station alert threshold.
    pub alert_level_m: Option<f64>,
    /// Station alarm threshold.
    pub alarm_level_m: Option<f64>,
    /// Station critical threshold.
    pub critical_level_m: Option<f64>,
    /// Reservoir deviation from normal high-water level, meters.
    pub dam_deviation_m: Option<f64>,
    /// Observed flood depth at the station, if the source reports one.
    pub flood_depth_m: Option<f64>,
    /// Classified alert level.
    pub risk_level: RiskLevel,
    /// Classified numeric risk, `[0, 1]`.
    pub risk_score: f64,
    /// Which upstream produced the reading.
    pub source_tag: String,
}

impl HazardReading {
    /// Builds a classified reading from the §external payload shape.
    pub fn from_payload(
        location_id: String,
        source_tag: String,
        payload: HazardReadingPayload,
    ) -> Result<Self, PayloadError> {
        let timestamp = parse_timestamp(&payload.timestamp)?;
        let dam_deviation_m = match (
            payload.reservoir_water_level_m,
            payload.normal_high_water_level_m,
        ) {
            (Some(level), Some(nhwl)) => Some(level - nhwl),
            _ => None,
        };

        let river_class = payload.river_level_m.map(|level| {
            classify::river_level(
                level,
                payload.alert_level_m,
                payload.alarm_level_m,
                payload.critical_level_m,
            )
        });

        let mut score: f64 = 0.0;
        if let Some(class) = river_class {
            score = score.max(classify::river_risk(class));
        }
        if let Some(dev) = dam_deviation_m {
            score = score.max(classify::dam_deviation_risk(dev));
        }
        score = score.max(classify::rain_severity_factor(payload.rainfall_1h));

        let risk_level = river_class.unwrap_or(match dam_deviation_m {
            Some(dev) if dev >= 2.0 => RiskLevel::Critical,
            Some(dev) if dev >= 1.0 => RiskLevel::Alarm,
            Some(dev) if dev >= 0.5 => RiskLevel::Alert,
            _ => {
                if classify::RainIntensity::classify(payload.rainfall_1h)
                    >= classify::RainIntensity::Intense
                {
                    RiskLevel::Alert
                } else {
                    RiskLevel::Normal
                }
            }
        });

        Ok(Self {
            location_id,
            timestamp,
            rainfall_1h_mm: payload.rainfall_1h,
            rainfall_24h_mm: payload.rainfall_24h,
            river_level_m: payload.river_level_m,
            alert_level_m: payload.alert_level_m,
            alarm_level_m: payload.alarm_level_m,
            critical_level_m: payload.critical_level_m,
            dam_deviation_m,
            flood_depth_m: payload.flood_depth,
            risk_level,
            risk_score: score,
            source_tag,
        })
    }

    /// True when the river stands at or above its alert threshold.
    #[must_use]
    pub fn river_elevated(&self) -> bool {
        matches!(
            self.river_level_m.map(|level| {
                classify::river_level(
                    level,
                    self.alert_level_m,
                    self.alarm_level_m,
                    self.critical_level_m,
                )
            }),
            Some(RiskLevel::Alert | RiskLevel::Alarm | RiskLevel::Critical)
        )
    }
}

/// Crowdsourced scout report, pre-classified upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoutReport {
    /// Identifier assigned at ingest.
    pub report_id: Uuid,
    /// When the observation was made.
    pub timestamp: DateTime<Utc>,
    /// Free-text body, when not pre-classified away.
    pub body: Option<String>,
    /// Place name, when the reporter gave one.
    pub location_name: Option<String>,
    /// Position; only geocoded reports propagate spatially.
    pub coordinates: Option<Coord>,
    /// Classified severity.
    pub severity: Severity,
    /// Classifier confidence.
    pub confidence: Confidence,
    /// What was observed.
    pub report_kind: ReportKind,
}

impl ScoutReport {
    /// Builds a report from the external payload shape.
    pub fn from_payload(payload: ScoutReportPayload) -> Result<Self, PayloadError> {
        let timestamp = parse_timestamp(&payload.timestamp)?;
        let coordinates = match payload.coordinates {
            Some(c) => Some(
                Coord::new(c.lat, c.lon)
                    .map_err(|_| PayloadError::BadCoordinate { lat: c.lat, lon: c.lon })?,
            ),
            None => None,
        };
        let severity =
            Severity::try_new(payload.severity).map_err(|_| PayloadError::BadScore(payload.severity))?;
        let confidence = Confidence::try_new(payload.confidence)
            .map_err(|_| PayloadError::BadScore(payload.confidence))?;
        Ok(Self {
            report_id: Uuid::new_v4(),
            timestamp,
            body: payload.body,
            location_name: payload.location_name,
            coordinates,
            severity,
            confidence,
            report_kind: payload.report_kind,
        })
    }

    /// A report propagates spatially only when it carries valid coordinates.
    #[must_use]
    pub fn is_geocoded(&self) -> bool {
        self.coordinates.is_some()
    }
}

/// Wire shape of one official reading within a `flood_data_batch` INFORM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HazardReadingPayload {
    /// Observed flood depth in meters, when measured.
    #[serde(default)]
    pub flood_depth: Option<f64>,
    /// Rainfall over the last hour, millimeters.
    pub rainfall_1h: f64,
    /// Rainfall over the last day, millimeters.
    pub rainfall_24h: f64,
    /// River water level in meters.
    #[serde(default)]
    pub river_level_m: Option<f64>,
    /// Station alert threshold.
    #[serde(default)]
    pub alert_level_m: Option<f64>,
    /// Station alarm threshold.
    #[serde(default)]
    pub alarm_level_m: Option<f64>,
    /// Station critical threshold.
    #[serde(default)]
    pub critical_level_m: Option<f64>,
    /// Reservoir water level, for dam stations.
    #[serde(default)]
    pub reservoir_water_level_m: Option<f64>,
    /// Normal high-water level, for dam stations.
    #[serde(default)]
    pub normal_high_water_level_m: Option<f64>,
    /// Reading time; naive values are taken as UTC.
    pub timestamp: String,
}

/// Wire shape of a coordinate within a scout payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LatLonPayload {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

/// Wire shape of one report within a `scout_report_batch` INFORM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoutReportPayload {
    /// Place name, when given.
    #[serde(default)]
    pub location_name: Option<String>,
    /// Position, when the report is geocoded.
    #[serde(default)]
    pub coordinates: Option<LatLonPayload>,
    /// Classified severity, `[0, 1]`.
    pub severity: f64,
    /// Classifier confidence, `[0, 1]`.
    pub confidence: f64,
    /// What was observed.
    pub report_kind: ReportKind,
    /// Observation time; naive values are taken as UTC.
    pub timestamp: String,
    /// Free-text body, when present.
    #[serde(default)]
    pub body: Option<String>,
}

/// Timestamps without an offset are treated as UTC.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, PayloadError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }
    Err(PayloadError::BadTimestamp(raw.to_string()))
}

/// Result of one fusion commit, broadcast as `risk_update` when any edge
/// actually changed.
#[derive(Debug, Clone, Serialize)]
pub struct FusionOutcome {
    /// Edges whose risk actually changed this commit.
    pub edges_updated: usize,
    /// Mean risk across every edge after the commit.
    pub average_risk: f64,
    /// Trend classified over the last two commits.
    pub risk_trend: TrendDirection,
    /// Average-risk change per minute between the last two commits.
    pub risk_change_rate: f64,
    /// Scenario time step the commit fused against.
    pub time_step: TimeStep,
}

/// Per-edge state copied out of the graph at the start of a fusion pass.
struct EdgeState {
    edge: EdgeRef,
    midpoint: Coord,
    risk: f64,
    last_update: Option<DateTime<Utc>>,
}

/// The hazard fusion engine.
pub struct FusionEngine {
    config: FusionConfig,
    flood_cache: HashMap<String, HazardReading>,
    scout_cache: Vec<ScoutReport>,
    edge_history: HashMap<EdgeRef, VecDeque<(DateTime<Utc>, f64)>>,
    commit_history: VecDeque<(DateTime<Utc>, f64)>,
    alert_state: HashMap<String, RiskLevel>,
}

impl FusionEngine {
    /// Builds an engine with empty caches.
    #[must_use]
    pub fn new(config: FusionConfig) -> Self {
        Self {
            config,
            flood_cache: HashMap::new(),
            scout_cache: Vec::new(),
            edge_history: HashMap::new(),
            commit_history: VecDeque::new(),
            alert_state: HashMap::new(),
        }
    }

    /// Number of cached official readings.
    #[must_use]
    pub fn flood_cache_len(&self) -> usize {
        self.flood_cache.len()
    }

    /// Number of cached scout reports.
    #[must_use]
    pub fn scout_cache_len(&self) -> usize {
        self.scout_cache.len()
    }

    /// Latest cached readings, for `flood_update` broadcasts.
    #[must_use]
    pub fn cached_readings(&self) -> Vec<&HazardReading> {
        self.flood_cache.values().collect()
    }

    /// Replaces the cached reading per location. Within one batch the latest
    /// timestamp wins; ties resolve to the later arrival.
    pub fn ingest_flood_batch(&mut self, readings: Vec<HazardReading>) -> usize {
        let mut accepted = 0;
        for reading in readings {
            match self.flood_cache.get(&reading.location_id) {
                Some(existing) if existing.timestamp > reading.timestamp => {
                    debug!(
                        location = %reading.location_id,
                        "stale reading ignored in favour of newer cache entry"
                    );
                }
                _ => {
                    self.flood_cache
                        .insert(reading.location_id.clone(), reading);
                    accepted += 1;
                }
            }
        }
        accepted
    }

    /// Appends scout reports to the cache.
    pub fn ingest_scout_batch(&mut self, reports: Vec<ScoutReport>) -> usize {
        let count = reports.len();
        self.scout_cache.extend(reports);
        count
    }

    /// Locations whose classified level reached critical since the last call.
    pub fn take_newly_critical(&mut self) -> Vec<HazardReading> {
        let mut newly = Vec::new();
        for reading in self.flood_cache.values() {
            let previous = self.alert_state.get(&reading.location_id).copied();
            if reading.risk_level == RiskLevel::Critical && previous != Some(RiskLevel::Critical) {
                newly.push(reading.clone());
            }
        }
        for reading in self.flood_cache.values() {
            self.alert_state
                .insert(reading.location_id.clone(), reading.risk_level);
        }
        newly
    }

    /// Clears every cache and history buffer (explicit reset command).
    pub fn clear(&mut self) {
        self.flood_cache.clear();
        self.scout_cache.clear();
        self.edge_history.clear();
        self.commit_history.clear();
        self.alert_state.clear();
    }

    /// True when any cached river station is at or above alert.
    #[must_use]
    pub fn river_elevated(&self) -> bool {
        self.flood_cache.values().any(HazardReading::river_elevated)
    }

    /// Recent risk history of one edge, oldest first.
    #[must_use]
    pub fn edge_history(&self, edge: EdgeRef) -> Vec<(DateTime<Utc>, f64)> {
        self.edge_history
            .get(&edge)
            .map(|ring| ring.iter().copied().collect())
            .unwrap_or_default()
    }

    fn evict_expired(&mut self, now: DateTime<Utc>) {
        let scout_ttl = Duration::minutes(self.config.scout_ttl_min);
        let flood_ttl = Duration::minutes(self.config.flood_ttl_min);
        let before_scouts = self.scout_cache.len();
        self.scout_cache.retain(|r| now - r.timestamp <= scout_ttl);
        let before_floods = self.flood_cache.len();
        self.flood_cache.retain(|_, r| now - r.timestamp <= flood_ttl);

        let evicted_scouts = before_scouts - self.scout_cache.len();
        let evicted_floods = before_floods - self.flood_cache.len();
        if evicted_scouts > 0 || evicted_floods > 0 {
            debug!(evicted_scouts, evicted_floods, "expired cache entries evicted");
        }
    }

    /// System-wide uniform term: the strongest decayed official reading at
    /// the historical weight, plus the non-geocoded scout environment factor
    /// at half the crowd weight.
    fn uniform_term(&self, now: DateTime<Utc>, river_elevated: bool) -> f64 {
        let official = self
            .flood_cache
            .values()
            .map(|reading| {
                decay::exp_decay(
                    reading.risk_score,
                    self.config.k_official,
                    decay::age_minutes(reading.timestamp, now),
                )
            })
            .fold(0.0f64, f64::max)
            * self.config.weight_official;

        let environment = self
            .scout_cache
            .iter()
            .filter(|r| !r.is_geocoded())
            .map(|report| {
                let rate = decay::scout_decay_rate(report.report_kind, river_elevated, &self.config);
                decay::exp_decay(
                    report.severity.as_f64() * report.confidence.as_f64(),
                    rate,
                    decay::age_minutes(report.timestamp, now),
                )
            })
            .fold(0.0f64, f64::max)
            * (self.config.weight_crowd / 2.0);

        official + environment
    }

    /// Runs the per-tick fusion procedure and commits the result.
    ///
    /// Raster unavailability degrades to a zero raster term; a writer-lock
    /// deadline bubbles out as a fatal [`FusionError::Commit`].
    pub async fn run_tick(
        &mut self,
        graph: &RoadGraph,
        raster: &DepthGridService,
        scenario: ScenarioKey,
        now: DateTime<Utc>,
    ) -> Result<FusionOutcome, FusionError> {
        self.evict_expired(now);
        let river_elevated = self.river_elevated();

        // Immutable copy of the per-edge state; the read guard drops before
        // the batch write so the lock never re-enters.
        let edge_states: Vec<EdgeState> = {
            let view = graph.view().await;
            view.edges()
                .iter()
                .map(|e| EdgeState {
                    edge: e.edge_ref(),
                    midpoint: e.midpoint,
                    risk: e.risk.as_f64(),
                    last_update: e.last_risk_update,
                })
                .collect()
        };

        // Raster term per edge.
        let mut raster_terms: HashMap<EdgeRef, f64> = HashMap::new();
        if raster.is_enabled() {
            let midpoints: Vec<(EdgeRef, Coord)> =
                edge_states.iter().map(|s| (s.edge, s.midpoint)).collect();
            match raster.depths_for_edges(&midpoints, scenario).await {
                Ok(depths) => {
                    for (edge, depth) in depths {
                        let term =
                            classify::depth_to_risk(depth) * self.config.weight_raster;
                        if term > 0.0 {
                            raster_terms.insert(edge, term);
                        }
                    }
                }
                Err(err) => {
                    warn!(scenario = %scenario, error = %err, "raster unavailable, fusing without depth term");
                }
            }
        }

        // Crowd term: every geocoded report re-propagates with its decayed
        // severity; contributions accumulate per edge.
        let mut crowd_terms: HashMap<EdgeRef, f64> = HashMap::new();
        let radius = self.config.scout_propagation_radius_m;
        for report in self.scout_cache.iter().filter(|r| r.is_geocoded()) {
            let Some(center) = report.coordinates else {
                continue;
            };
            let rate = decay::scout_decay_rate(report.report_kind, river_elevated, &self.config);
            let decayed_severity = decay::exp_decay(
                report.severity.as_f64(),
                rate,
                decay::age_minutes(report.timestamp, now),
            );
            if decayed_severity <= 0.0 {
                continue;
            }
            let hits = match graph
                .find_edges_within_radius(center.lat, center.lon, radius)
                .await
            {
                Ok(hits) => hits,
                Err(err) => {
                    warn!(report = %report.report_id, error = %err, "scout propagation skipped");
                    continue;
                }
            };
            for hit in hits {
                let proximity = 1.0 - hit.distance_m / radius;
                let contribution = decayed_severity
                    * report.confidence.as_f64()
                    * proximity
                    * self.config.weight_crowd;
                *crowd_terms.entry(hit.edge).or_insert(0.0) += contribution;
            }
        }

        let uniform = self.uniform_term(now, river_elevated);

        // Combine: a fresh signal replaces the residual; edges with no signal
        // keep their residual decayed at the spatial rate.
        let mut updates = Vec::with_capacity(edge_states.len());
        let mut changed = 0usize;
        let mut risk_sum = 0.0f64;
        for state in &edge_states {
            let fresh = raster_terms.get(&state.edge).copied().unwrap_or(0.0)
                + crowd_terms.get(&state.edge).copied().unwrap_or(0.0)
                + uniform;

            let mut new_risk = if fresh > 0.0 {
                fresh.min(1.0)
            } else if state.risk > 0.0 {
                let age = state
                    .last_update
                    .map_or(0.0, |ts| decay::age_minutes(ts, now));
                decay::exp_decay(state.risk, self.config.k_spatial_edge, age)
            } else {
                0.0
            };

            let mut clear_stamp = false;
            if new_risk < self.config.min_risk_floor {
                new_risk = 0.0;
                clear_stamp = true;
            }

            risk_sum += new_risk;
            if (new_risk - state.risk).abs() > 1e-9 {
                changed += 1;
            }
            if (new_risk - state.risk).abs() > 1e-9 || (!clear_stamp && new_risk > 0.0) {
                updates.push(EdgeRiskUpdate {
                    edge: state.edge,
                    risk: RiskScore::clamped(new_risk),
                    clear_stamp,
                });
            }

            let ring = self.edge_history.entry(state.edge).or_default();
            ring.push_back((now, new_risk));
            while ring.len() > self.config.risk_history_len {
                ring.pop_front();
            }
        }

        graph.batch_update_edge_risks(&updates, now).await?;

        let edge_count = edge_states.len().max(1);
        let average_risk = risk_sum / edge_count as f64;
        let (risk_trend, risk_change_rate) = self.record_commit(now, average_risk);

        Ok(FusionOutcome {
            edges_updated: changed,
            average_risk,
            risk_trend,
            risk_change_rate,
            time_step: scenario.time_step,
        })
    }

    /// Pushes a commit average and classifies the trend across the last two.
    fn record_commit(&mut self, now: DateTime<Utc>, average: f64) -> (TrendDirection, f64) {
        let previous = self.commit_history.back().copied();
        self.commit_history.push_back((now, average));
        while self.commit_history.len() > self.config.risk_history_len {
            self.commit_history.pop_front();
        }

        let Some((prev_ts, prev_avg)) = previous else {
            return (TrendDirection::Stable, 0.0);
        };
        let minutes = decay::age_minutes(prev_ts, now);
        if minutes <= 0.0 {
            return (TrendDirection::Stable, 0.0);
        }
        let rate = (average - prev_avg) / minutes;
        let trend = if rate > self.config.trend_epsilon_per_min {
            TrendDirection::Increasing
        } else if rate < -self.config.trend_epsilon_per_min {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Stable
        };
        (trend, rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading_payload(timestamp: &str) -> HazardReadingPayload {
        HazardReadingPayload {
            flood_depth: None,
            rainfall_1h: 0.0,
            rainfall_24h: 0.0,
            river_level_m: None,
            alert_level_m: None,
            alarm_level_m: None,
            critical_level_m: None,
            reservoir_water_level_m: None,
            normal_high_water_level_m: None,
            timestamp: timestamp.to_string(),
        }
    }

    #[test]
    fn naive_timestamps_are_utc() {
        let parsed = parse_timestamp("2026-07-01T10:30:00").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-07-01T10:30:00+00:00");
        assert!(parse_timestamp("not a time").is_err());
    }

    #[test]
    fn reading_classifies_river_over_rain() {
        let mut payload = reading_payload("2026-07-01T10:30:00");
        payload.river_level_m = Some(15.2);
        payload.alert_level_m = Some(14.0);
        payload.alarm_level_m = Some(15.0);
        payload.critical_level_m = Some(16.0);
        payload.rainfall_1h = 4.0;

        let reading =
            HazardReading::from_payload("marikina-1".into(), "pagasa".into(), payload).unwrap();
        assert_eq!(reading.risk_level, RiskLevel::Alarm);
        assert_eq!(reading.risk_score, 0.8);
        assert!(reading.river_elevated());
    }

    #[test]
    fn reading_derives_dam_deviation() {
        let mut payload = reading_payload("2026-07-01T10:30:00");
        payload.reservoir_water_level_m = Some(80.9);
        payload.normal_high_water_level_m = Some(80.0);

        let reading =
            HazardReading::from_payload("ipo-dam".into(), "ncwr".into(), payload).unwrap();
        let deviation = reading.dam_deviation_m.unwrap();
        assert!((deviation - 0.9).abs() < 1e-9);
        assert_eq!(reading.risk_score, 0.5);
    }

    #[test]
    fn batch_keeps_latest_per_location() {
        let mut engine = FusionEngine::new(FusionConfig::default());
        let newer = HazardReading::from_payload(
            "st-1".into(),
            "t".into(),
            reading_payload("2026-07-01T11:00:00"),
        )
        .unwrap();
        let older = HazardReading::from_payload(
            "st-1".into(),
            "t".into(),
            reading_payload("2026-07-01T10:00:00"),
        )
        .unwrap();

        engine.ingest_flood_batch(vec![newer.clone(), older]);
        assert_eq!(engine.flood_cache_len(), 1);
        assert_eq!(
            engine.cached_readings()[0].timestamp,
            newer.timestamp
        );
    }

    #[test]
    fn newly_critical_fires_once() {
        let mut engine = FusionEngine::new(FusionConfig::default());
        let mut payload = reading_payload("2026-07-01T10:30:00");
        payload.river_level_m = Some(17.0);
        payload.alert_level_m = Some(14.0);
        payload.alarm_level_m = Some(15.0);
        payload.critical_level_m = Some(16.0);
        let reading =
            HazardReading::from_payload("st-9".into(), "t".into(), payload).unwrap();

        engine.ingest_flood_batch(vec![reading]);
        assert_eq!(engine.take_newly_critical().len(), 1);
        assert!(engine.take_newly_critical().is_empty());
    }

    #[test]
    fn scout_payload_validation() {
        let payload = ScoutReportPayload {
            location_name: None,
            coordinates: Some(LatLonPayload { lat: 95.0, lon: 121.0 }),
            severity: 0.8,
            confidence: 1.0,
            report_kind: ReportKind::Flood,
            timestamp: "2026-07-01T10:30:00".to_string(),
            body: None,
        };
        assert!(matches!(
            ScoutReport::from_payload(payload),
            Err(PayloadError::BadCoordinate { .. })
        ));

        let bad_severity = ScoutReportPayload {
            location_name: None,
            coordinates: None,
            severity: 1.4,
            confidence: 1.0,
            report_kind: ReportKind::Flood,
            timestamp: "2026-07-01T10:30:00".to_string(),
            body: None,
        };
        assert!(matches!(
            ScoutReport::from_payload(bad_severity),
            Err(PayloadError::BadScore(_))
        ));
    }
}
