//! WebSocket broadcast hub
//!
//! Every client gets the envelope stream: `connection` on attach, `pong` for
//! pings, and the tick-driven `flood_update` / `critical_alert` /
//! `risk_update` / `scheduler_update` / `system_status` fan-out.

use super::AppState;
use crate::orchestrator::OrchestratorEvent;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

/// The wire envelope every broadcast uses.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    /// Message type tag (`flood_update`, `risk_update`, ...).
    #[serde(rename = "type")]
    pub message_type: String,
    /// ISO-8601 emission time.
    pub timestamp: String,
    /// Type-specific payload.
    pub data: serde_json::Value,
}

impl Envelope {
    /// Builds an envelope stamped now.
    #[must_use]
    pub fn new(message_type: &str, data: serde_json::Value) -> Self {
        Self {
            message_type: message_type.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            data,
        }
    }

    fn to_message(&self) -> Message {
        Message::Text(
            serde_json::to_string(self)
                .unwrap_or_else(|_| "{}".to_string())
                .into(),
        )
    }
}

/// Maps an orchestrator event onto its envelope.
#[must_use]
pub fn envelope_for(event: &OrchestratorEvent) -> Envelope {
    match event {
        OrchestratorEvent::FloodUpdate { readings } => {
            Envelope::new("flood_update", json!({ "readings": readings }))
        }
        OrchestratorEvent::CriticalAlert { reading } => {
            Envelope::new("critical_alert", json!({ "reading": reading }))
        }
        OrchestratorEvent::RiskUpdate(outcome) => Envelope::new(
            "risk_update",
            json!({
                "edges_updated": outcome.edges_updated,
                "average_risk": outcome.average_risk,
                "risk_trend": outcome.risk_trend,
                "risk_change_rate": outcome.risk_change_rate,
                "time_step": outcome.time_step,
            }),
        ),
        OrchestratorEvent::SchedulerUpdate(snapshot) => {
            Envelope::new("scheduler_update", json!(snapshot))
        }
    }
}

/// HTTP upgrade entry point.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| client_loop(socket, state))
}

async fn client_loop(mut socket: WebSocket, state: AppState) {
    let mut events = state.events.subscribe();

    let hello = Envelope::new(
        "connection",
        json!({ "message": "connected to floodway stream" }),
    );
    if socket.send(hello.to_message()).await.is_err() {
        return;
    }
    let status = {
        let orchestrator = state.orchestrator.lock().await;
        orchestrator.status()
    };
    let status_envelope = Envelope::new("system_status", json!(status));
    if socket.send(status_envelope.to_message()).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if socket.send(envelope_for(&event).to_message()).await.is_err() {
                            break;
                        }
                    }
                    // A lagged receiver skips missed events and carries on.
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "websocket client lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) if text.as_str().contains("ping") => {
                        let pong = Envelope::new("pong", json!({}));
                        if socket.send(pong.to_message()).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }
}
