//! Domain types for the floodway routing service
//!
//! This module defines strongly-typed domain values to prevent primitive obsession
//! and improve type safety throughout the codebase.

use nutype::nutype;
use serde::{Deserialize, Serialize};

/// Stable identifier of a road intersection, as assigned by the network source.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    From,
    Into
))]
pub struct NodeId(i64);

/// Risk score on a road segment, always within `[0, 1]`.
#[nutype(
    validate(finite, greater_or_equal = 0.0, less_or_equal = 1.0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        PartialOrd,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 0.0
)]
pub struct RiskScore(f64);

impl RiskScore {
    /// Returns a zero risk score.
    #[must_use]
    pub fn zero() -> Self {
        Self::default()
    }

    /// Builds a risk score from an unchecked value, clamping into `[0, 1]`.
    ///
    /// Non-finite inputs collapse to zero rather than poisoning the graph.
    #[must_use]
    pub fn clamped(value: f64) -> Self {
        if !value.is_finite() {
            return Self::zero();
        }
        Self::try_new(value.clamp(0.0, 1.0)).unwrap_or_default()
    }

    /// Gets the value as f64.
    #[must_use]
    pub fn as_f64(&self) -> f64 {
        self.into_inner()
    }
}

/// Reported severity of a scout observation, within `[0, 1]`.
#[nutype(
    validate(finite, greater_or_equal = 0.0, less_or_equal = 1.0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        PartialOrd,
        Serialize,
        Deserialize,
        Display,
        TryFrom,
        Into
    )
)]
pub struct Severity(f64);

impl Severity {
    /// Gets the value as f64.
    #[must_use]
    pub fn as_f64(&self) -> f64 {
        self.into_inner()
    }
}

/// Classifier confidence attached to a scout observation, within `[0, 1]`.
#[nutype(
    validate(finite, greater_or_equal = 0.0, less_or_equal = 1.0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        PartialOrd,
        Serialize,
        Deserialize,
        Display,
        TryFrom,
        Into
    )
)]
pub struct Confidence(f64);

impl Confidence {
    /// Gets the value as f64.
    #[must_use]
    pub fn as_f64(&self) -> f64 {
        self.into_inner()
    }
}

/// Physical length of a road segment in meters. Always strictly positive.
#[nutype(
    validate(finite, greater = 0.0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        PartialOrd,
        Serialize,
        Deserialize,
        Display,
        TryFrom,
        Into
    )
)]
pub struct LengthMeters(f64);

impl LengthMeters {
    /// Gets the value as f64.
    #[must_use]
    pub fn as_f64(&self) -> f64 {
        self.into_inner()
    }
}

/// Bounded capacity of an agent mailbox.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 1_000_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 1024
)]
pub struct MailboxCapacity(usize);

impl MailboxCapacity {
    /// Gets the value as usize for use with tokio channels.
    #[must_use]
    pub fn as_usize(&self) -> usize {
        self.into_inner()
    }
}

/// Registered name of an agent mailbox.
#[nutype(
    validate(len_char_min = 1, len_char_max = 64),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Serialize,
        Deserialize,
        Display,
        TryFrom,
        Into
    )
)]
pub struct AgentName(String);

/// Hourly index into a flood-raster bundle, always within `1..=18`.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 18),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        Hash,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 1
)]
pub struct TimeStep(u8);

impl TimeStep {
    /// First time step of a scenario.
    #[must_use]
    pub fn first() -> Self {
        Self::default()
    }

    /// Advances to the next time step, wrapping 18 back to 1.
    #[must_use]
    pub fn advance(self) -> Self {
        let next = (self.into_inner() % 18) + 1;
        Self::try_new(next).unwrap_or_default()
    }

    /// Gets the value as u8.
    #[must_use]
    pub fn as_u8(&self) -> u8 {
        self.into_inner()
    }
}

/// Recurrence-interval category of a flood raster bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnPeriod {
    /// Shortest recurrence interval, mild flooding.
    Rr01,
    /// Moderate recurrence interval.
    Rr02,
    /// Long recurrence interval, severe flooding.
    Rr03,
    /// Longest recurrence interval, extreme flooding.
    Rr04,
}

impl ReturnPeriod {
    /// Directory and file-name stem for this return period.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rr01 => "rr01",
            Self::Rr02 => "rr02",
            Self::Rr03 => "rr03",
            Self::Rr04 => "rr04",
        }
    }

    /// Parses the `rr01..rr04` stem used in query strings and file names.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "rr01" => Some(Self::Rr01),
            "rr02" => Some(Self::Rr02),
            "rr03" => Some(Self::Rr03),
            "rr04" => Some(Self::Rr04),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReturnPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Intensity mode of a simulation session. Each mode binds one return period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationMode {
    /// Mild scenario, bound to `rr01`.
    Light,
    /// Moderate scenario, bound to `rr02`.
    Medium,
    /// Severe scenario, bound to `rr03`.
    Heavy,
    /// Worst-case scenario, bound to `rr04`.
    Extreme,
}

impl SimulationMode {
    /// The raster bundle bound by this mode.
    #[must_use]
    pub fn return_period(&self) -> ReturnPeriod {
        match self {
            Self::Light => ReturnPeriod::Rr01,
            Self::Medium => ReturnPeriod::Rr02,
            Self::Heavy => ReturnPeriod::Rr03,
            Self::Extreme => ReturnPeriod::Rr04,
        }
    }

    /// Parses the mode name used in query strings.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "light" => Some(Self::Light),
            "medium" => Some(Self::Medium),
            "heavy" => Some(Self::Heavy),
            "extreme" => Some(Self::Extreme),
            _ => None,
        }
    }
}

/// Functional classification of a road segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoadClass {
    /// Controlled-access highway.
    Motorway,
    /// Major inter-city road below motorway grade.
    Trunk,
    /// Primary arterial.
    Primary,
    /// Secondary arterial.
    Secondary,
    /// Tertiary connector.
    Tertiary,
    /// Residential street.
    Residential,
    /// Minor road of unknown grade, also the fallback for odd tags.
    Unclassified,
    /// Access or service road.
    Service,
    /// Pedestrian footway.
    Footway,
    /// Unpaved path.
    Path,
}

impl RoadClass {
    /// Parses the tag value found in network documents. Unknown tags map to
    /// `Unclassified` so a single odd segment never aborts a graph load.
    #[must_use]
    pub fn parse(tag: &str) -> Self {
        match tag {
            "motorway" => Self::Motorway,
            "trunk" => Self::Trunk,
            "primary" => Self::Primary,
            "secondary" => Self::Secondary,
            "tertiary" => Self::Tertiary,
            "residential" => Self::Residential,
            "service" => Self::Service,
            "footway" => Self::Footway,
            "path" => Self::Path,
            _ => Self::Unclassified,
        }
    }
}

/// Kind of a crowdsourced scout report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    /// Rain observation with no standing water yet.
    RainReport,
    /// Standing or flowing flood water.
    Flood,
    /// Road blocked (debris, vehicles, collapse).
    Blockage,
    /// All-clear: a previously reported hazard has receded.
    Clear,
}

/// Classified alert level of an official hazard reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Below every threshold.
    Normal,
    /// At or above the alert threshold.
    Alert,
    /// At or above the alarm threshold.
    Alarm,
    /// At or above the critical threshold.
    Critical,
}

/// Direction of the system-wide risk trend between fusion commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    /// Average risk is rising faster than the epsilon.
    Increasing,
    /// Average risk is falling faster than the epsilon.
    Decreasing,
    /// Average risk is holding within the epsilon.
    Stable,
}

/// A directed edge address: endpoints plus the parallel-edge discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeRef {
    /// Source node.
    pub u: NodeId,
    /// Target node.
    pub v: NodeId,
    /// Discriminator among parallel edges between the same nodes.
    pub key: u32,
}

impl EdgeRef {
    /// Builds an edge address from raw parts.
    #[must_use]
    pub fn new(u: NodeId, v: NodeId, key: u32) -> Self {
        Self { u, v, key }
    }
}

impl std::fmt::Display for EdgeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}->{}#{}", self.u, self.v, self.key)
    }
}
