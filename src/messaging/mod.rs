//! Agent messaging protocol
//!
//! FIPA-ACL-style performatives over bounded mailboxes. Agents never hold
//! references to each other; every interaction is a message routed by name
//! through the [`router::MailboxRouter`].

pub mod router;

pub use router::{Mailbox, MailboxRouter, ReceiveError, SendError};

use crate::domain_types::{AgentName, EdgeRef, TrendDirection};
use crate::fusion::{HazardReadingPayload, ScoutReportPayload};
use crate::planner::{ComputedRoute, RoutePreferences};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Message intent labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Performative {
    /// Assert a fact or deliver data.
    Inform,
    /// Ask the receiver to perform an action.
    Request,
    /// Ask the receiver for information.
    Query,
    /// Positive acknowledgement.
    Confirm,
    /// The receiver declines the request.
    Refuse,
    /// The receiver accepts the request.
    Agree,
    /// The requested action failed.
    Failure,
    /// Offer in a negotiation.
    Propose,
    /// Call for proposals.
    Cfp,
}

/// Structured, tagged message content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "info_type", rename_all = "snake_case")]
pub enum MessageContent {
    /// Official hazard readings keyed by location id.
    FloodDataBatch {
        /// One payload per reporting location.
        readings: HashMap<String, HazardReadingPayload>,
        /// Which upstream produced the batch.
        source_tag: String,
    },
    /// Pre-classified crowdsourced reports.
    ScoutReportBatch {
        /// The reports, in arrival order.
        reports: Vec<ScoutReportPayload>,
    },
    /// Scheduler nudge: refresh upstream data now.
    CollectNow,
    /// Route computation request.
    CalculateRoute {
        /// Start latitude.
        start_lat: f64,
        /// Start longitude.
        start_lon: f64,
        /// Destination latitude.
        end_lat: f64,
        /// Destination longitude.
        end_lon: f64,
        /// Optional cost-model overrides.
        #[serde(default)]
        preferences: RoutePreferences,
    },
    /// Evacuation routing request: route to the best shelter.
    FindEvacuationRoute {
        /// Start latitude.
        start_lat: f64,
        /// Start longitude.
        start_lon: f64,
        /// Optional cost-model overrides.
        #[serde(default)]
        preferences: RoutePreferences,
    },
    /// Distress call from the field, translated by the evacuation manager.
    DistressCall {
        /// Caller latitude.
        lat: f64,
        /// Caller longitude.
        lon: f64,
        /// Optional cost-model overrides.
        #[serde(default)]
        preferences: RoutePreferences,
    },
    /// Current risk query for one edge.
    RiskAtEdge {
        /// Source node id.
        u: i64,
        /// Target node id.
        v: i64,
        /// Parallel-edge key.
        key: u32,
    },
    /// Reply to a risk query.
    RiskReport {
        /// The queried edge.
        edge: EdgeRef,
        /// Its current risk score.
        risk: f64,
        /// The system-wide trend at the last commit.
        trend: TrendDirection,
    },
    /// Successful route reply.
    RouteResult {
        /// The computed route.
        route: ComputedRoute,
        /// Chosen shelter, for evacuation requests.
        #[serde(default)]
        shelter_name: Option<String>,
    },
    /// Terminal failure reply.
    Failed {
        /// Human-readable cause.
        reason: String,
    },
    /// Bare acknowledgement.
    Ack,
}

impl MessageContent {
    /// Stable tag string, used for dispatch logging.
    #[must_use]
    pub fn info_type(&self) -> &'static str {
        match self {
            Self::FloodDataBatch { .. } => "flood_data_batch",
            Self::ScoutReportBatch { .. } => "scout_report_batch",
            Self::CollectNow => "collect_now",
            Self::CalculateRoute { .. } => "calculate_route",
            Self::FindEvacuationRoute { .. } => "find_evacuation_route",
            Self::DistressCall { .. } => "distress_call",
            Self::RiskAtEdge { .. } => "risk_at_edge",
            Self::RiskReport { .. } => "risk_report",
            Self::RouteResult { .. } => "route_result",
            Self::Failed { .. } => "failed",
            Self::Ack => "ack",
        }
    }
}

/// One inter-agent message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AclMessage {
    /// The sender's intent.
    pub performative: Performative,
    /// Originating mailbox.
    pub sender: AgentName,
    /// Destination mailbox.
    pub receiver: AgentName,
    /// Tagged payload.
    pub content: MessageContent,
    /// Groups the messages of one multi-turn exchange.
    pub conversation_id: Option<Uuid>,
    /// Correlation id a reply must echo in `in_reply_to`.
    pub reply_with: Option<Uuid>,
    /// The `reply_with` of the message being answered.
    pub in_reply_to: Option<Uuid>,
    /// When the message was built.
    pub sent_at: DateTime<Utc>,
}

impl AclMessage {
    /// Builds an INFORM.
    #[must_use]
    pub fn inform(sender: AgentName, receiver: AgentName, content: MessageContent) -> Self {
        Self {
            performative: Performative::Inform,
            sender,
            receiver,
            content,
            conversation_id: None,
            reply_with: None,
            in_reply_to: None,
            sent_at: Utc::now(),
        }
    }

    /// Builds a REQUEST with a fresh reply correlation id.
    #[must_use]
    pub fn request(sender: AgentName, receiver: AgentName, content: MessageContent) -> Self {
        Self {
            performative: Performative::Request,
            sender,
            receiver,
            content,
            conversation_id: Some(Uuid::new_v4()),
            reply_with: Some(Uuid::new_v4()),
            in_reply_to: None,
            sent_at: Utc::now(),
        }
    }

    /// Builds a QUERY with a fresh reply correlation id.
    #[must_use]
    pub fn query(sender: AgentName, receiver: AgentName, content: MessageContent) -> Self {
        Self {
            performative: Performative::Query,
            ..Self::request(sender, receiver, content)
        }
    }

    /// Builds the reply to this message, echoing the conversation and
    /// correlation ids back to the sender.
    #[must_use]
    pub fn reply(&self, performative: Performative, content: MessageContent) -> Self {
        Self {
            performative,
            sender: self.receiver.clone(),
            receiver: self.sender.clone(),
            content,
            conversation_id: self.conversation_id,
            reply_with: None,
            in_reply_to: self.reply_with,
            sent_at: Utc::now(),
        }
    }

    /// Builds a FAILURE reply with a reason.
    #[must_use]
    pub fn failure(&self, reason: impl Into<String>) -> Self {
        self.reply(
            Performative::Failure,
            MessageContent::Failed {
                reason: reason.into(),
            },
        )
    }
}

/// Well-known agent mailbox names.
pub mod names {
    use crate::domain_types::AgentName;

    fn known(name: &str) -> AgentName {
        AgentName::try_new(name.to_string()).expect("static agent name is valid")
    }

    /// Official hazard data collector.
    #[must_use]
    pub fn flood_collector() -> AgentName {
        known("flood_collector")
    }

    /// Crowdsourced report collector.
    #[must_use]
    pub fn scout_collector() -> AgentName {
        known("scout_collector")
    }

    /// Hazard fusion front-end.
    #[must_use]
    pub fn hazard_agent() -> AgentName {
        known("hazard_agent")
    }

    /// Route planner.
    #[must_use]
    pub fn planner_agent() -> AgentName {
        known("planner_agent")
    }

    /// Evacuation manager.
    #[must_use]
    pub fn evacuation_manager() -> AgentName {
        known("evacuation_manager")
    }

    /// Synthetic sender used by the HTTP layer and the scheduler.
    #[must_use]
    pub fn system() -> AgentName {
        known("system")
    }
}
