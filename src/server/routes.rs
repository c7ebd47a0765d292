//! HTTP handlers
//!
//! JSON over HTTP with validation at the boundary: payloads parse into
//! domain types before touching any subsystem, and domain failures map to
//! their status codes (400 bad input, 404 no path / no nearby node, 503
//! graph not initialized).

use super::AppState;
use crate::agents::evacuation;
use crate::domain_types::{ReturnPeriod, SimulationMode, TimeStep};
use crate::geo::Coord;
use crate::orchestrator::OrchestratorEvent;
use crate::planner::{self, ComputedRoute, ProfileKind, RouteError, RoutePreferences};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Error body shared by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Optional additional detail about the error.
    pub details: Option<String>,
}

fn error_response(status: StatusCode, error: &str, details: Option<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            details,
        }),
    )
        .into_response()
}

fn route_error_response(err: &RouteError) -> Response {
    match err {
        RouteError::NoPath | RouteError::NoNearbyNode { .. } => {
            error_response(StatusCode::NOT_FOUND, "no route", Some(err.to_string()))
        }
        RouteError::InvalidCoordinate(_) => {
            error_response(StatusCode::BAD_REQUEST, "invalid coordinate", Some(err.to_string()))
        }
    }
}

/// Route request body.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteBody {
    /// Start coordinate as `[lat, lon]`.
    pub start: [f64; 2],
    /// Destination coordinate as `[lat, lon]`.
    pub end: [f64; 2],
    /// Optional cost-model overrides.
    #[serde(default)]
    pub preferences: RoutePreferences,
}

/// One route in a response.
#[derive(Debug, Clone, Serialize)]
pub struct RoutePayload {
    /// Node coordinates along the path as `[lat, lon]` pairs.
    pub path: Vec<[f64; 2]>,
    /// Total physical length in meters.
    pub distance_m: f64,
    /// Travel-time estimate at the urban average speed.
    pub estimated_time_min: f64,
    /// Length-weighted average risk along the path.
    pub avg_risk: f64,
    /// Highest edge risk along the path.
    pub max_risk: f64,
    /// Edges at or above the warning threshold.
    pub high_risk_segments: usize,
    /// Human-readable warnings for the risky segments.
    pub warnings: Vec<String>,
    /// Impassable edges the search ran into.
    pub blocked_edges: usize,
}

impl From<&ComputedRoute> for RoutePayload {
    fn from(route: &ComputedRoute) -> Self {
        Self {
            path: route.path.iter().map(|c| [c.lat, c.lon]).collect(),
            distance_m: route.total_distance_m,
            estimated_time_min: route.estimated_time_min,
            avg_risk: route.avg_risk,
            max_risk: route.max_risk,
            high_risk_segments: route.high_risk_segments,
            warnings: route.warnings.clone(),
            blocked_edges: route.blocked_edges,
        }
    }
}

/// Route response: the best route flattened, extra routes alongside.
#[derive(Debug, Clone, Serialize)]
pub struct RouteResponse {
    /// Always `"ok"` on success.
    pub status: String,
    /// The best route.
    #[serde(flatten)]
    pub route: RoutePayload,
    /// Deduplicated alternatives, when requested.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<RoutePayload>,
}

fn parse_coord(pair: [f64; 2]) -> Result<Coord, Response> {
    Coord::new(pair[0], pair[1]).map_err(|err| {
        error_response(
            StatusCode::BAD_REQUEST,
            "invalid coordinate",
            Some(err.to_string()),
        )
    })
}

/// `POST /route`
pub async fn route(State(state): State<AppState>, Json(body): Json<RouteBody>) -> Response {
    let start = match parse_coord(body.start) {
        Ok(c) => c,
        Err(response) => return response,
    };
    let end = match parse_coord(body.end) {
        Ok(c) => c,
        Err(response) => return response,
    };

    let view = state.graph.view().await;
    if view.node_count() == 0 {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "graph not initialized",
            None,
        );
    }

    match planner::plan_with_alternatives(&view, start, end, &body.preferences, &state.config.planner)
    {
        Ok(routes) => {
            let mut payloads = routes.iter().map(RoutePayload::from);
            let Some(primary) = payloads.next() else {
                return error_response(StatusCode::NOT_FOUND, "no route", None);
            };
            (
                StatusCode::OK,
                Json(RouteResponse {
                    status: "ok".to_string(),
                    route: primary,
                    alternatives: payloads.collect(),
                }),
            )
                .into_response()
        }
        Err(err) => route_error_response(&err),
    }
}

/// Evacuation request body.
#[derive(Debug, Clone, Deserialize)]
pub struct EvacuateBody {
    /// Distress coordinate as `[lat, lon]`.
    pub start: [f64; 2],
    /// Optional cost profile for the shelter routes.
    #[serde(default)]
    pub profile: Option<ProfileKind>,
}

/// `POST /evacuate`
pub async fn evacuate(State(state): State<AppState>, Json(body): Json<EvacuateBody>) -> Response {
    let start = match parse_coord(body.start) {
        Ok(c) => c,
        Err(response) => return response,
    };
    let view = state.graph.view().await;
    if view.node_count() == 0 {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "graph not initialized",
            None,
        );
    }
    let preferences = RoutePreferences {
        profile: body.profile,
        ..RoutePreferences::default()
    };

    match evacuation::select_shelter(
        &view,
        start,
        &preferences,
        &state.shelters,
        &state.config.planner,
    ) {
        Ok(plan) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "shelter": {
                    "name": plan.shelter.name,
                    "coord": [plan.shelter.coord.lat, plan.shelter.coord.lon],
                    "capacity": plan.shelter.capacity,
                    "kind": plan.shelter.kind,
                },
                "route": RoutePayload::from(&plan.route),
            })),
        )
            .into_response(),
        Err(err) => route_error_response(&err),
    }
}

/// `POST /admin/collect-flood-data` and `POST /scheduler/trigger`
pub async fn trigger_collection(State(state): State<AppState>) -> Response {
    match state.scheduler.trigger().await {
        Ok(()) => {
            let snapshot = state.scheduler.stats().snapshot();
            let _ = state
                .events
                .send(OrchestratorEvent::SchedulerUpdate(snapshot.clone()));
            (StatusCode::OK, Json(json!({ "status": "ok", "stats": snapshot }))).into_response()
        }
        Err(err) => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "collection trigger failed",
            Some(err.to_string()),
        ),
    }
}

/// `GET /scheduler/status`
pub async fn scheduler_status(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "running": state.scheduler.is_running(),
            "interval_s": state.scheduler.interval().as_secs(),
        })),
    )
        .into_response()
}

/// `GET /scheduler/stats`
pub async fn scheduler_stats(State(state): State<AppState>) -> Response {
    (StatusCode::OK, Json(state.scheduler.stats().snapshot())).into_response()
}

/// Query string of `POST /simulation/start`.
#[derive(Debug, Deserialize)]
pub struct ModeQuery {
    /// Scenario intensity: `light`, `medium`, `heavy` or `extreme`.
    pub mode: String,
}

/// `POST /simulation/start?mode=`
pub async fn simulation_start(
    State(state): State<AppState>,
    Query(query): Query<ModeQuery>,
) -> Response {
    let Some(mode) = SimulationMode::parse(&query.mode) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "unknown mode",
            Some(format!("expected light|medium|heavy|extreme, got {}", query.mode)),
        );
    };
    let mut orchestrator = state.orchestrator.lock().await;
    orchestrator.start(mode);
    (StatusCode::OK, Json(json!({ "status": "ok", "state": orchestrator.status() })))
        .into_response()
}

/// `POST /simulation/stop`
pub async fn simulation_stop(State(state): State<AppState>) -> Response {
    let mut orchestrator = state.orchestrator.lock().await;
    orchestrator.stop();
    (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response()
}

/// `POST /simulation/reset`
pub async fn simulation_reset(State(state): State<AppState>) -> Response {
    let mut orchestrator = state.orchestrator.lock().await;
    match orchestrator.reset().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response(),
        Err(err) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "reset failed",
            Some(err.to_string()),
        ),
    }
}

/// `GET /simulation/status`
pub async fn simulation_status(State(state): State<AppState>) -> Response {
    let orchestrator = state.orchestrator.lock().await;
    (StatusCode::OK, Json(orchestrator.status())).into_response()
}

/// `POST /admin/geotiff/enable`
pub async fn geotiff_enable(State(state): State<AppState>) -> Response {
    state.raster.set_enabled(true);
    geotiff_status(State(state)).await
}

/// `POST /admin/geotiff/disable`
pub async fn geotiff_disable(State(state): State<AppState>) -> Response {
    state.raster.set_enabled(false);
    geotiff_status(State(state)).await
}

/// `GET /admin/geotiff/status`
pub async fn geotiff_status(State(state): State<AppState>) -> Response {
    let alignment = state.raster.alignment();
    (
        StatusCode::OK,
        Json(json!({
            "enabled": state.raster.is_enabled(),
            "center_lat": alignment.center_lat,
            "center_lon": alignment.center_lon,
            "base_coverage_deg": alignment.base_coverage_deg,
        })),
    )
        .into_response()
}

/// Query string of `POST /admin/geotiff/set-scenario`.
#[derive(Debug, Deserialize)]
pub struct ScenarioQuery {
    /// Raster bundle stem: `rr01` through `rr04`.
    pub return_period: String,
    /// Hourly index into the bundle, `1..=18`.
    pub time_step: u8,
}

/// `POST /admin/geotiff/set-scenario?return_period=&time_step=`
pub async fn geotiff_set_scenario(
    State(state): State<AppState>,
    Query(query): Query<ScenarioQuery>,
) -> Response {
    let Some(return_period) = ReturnPeriod::parse(&query.return_period) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "unknown return period",
            Some(format!("expected rr01..rr04, got {}", query.return_period)),
        );
    };
    let Ok(time_step) = TimeStep::try_new(query.time_step) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "time step out of range",
            Some(format!("expected 1..=18, got {}", query.time_step)),
        );
    };
    let mut orchestrator = state.orchestrator.lock().await;
    orchestrator.set_scenario(return_period, time_step);
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "state": orchestrator.status() })),
    )
        .into_response()
}

/// `GET /health`
pub async fn health() -> &'static str {
    "OK"
}
