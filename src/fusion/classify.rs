//! Hazard classifiers: raw measurements to risk contributions.

use crate::domain_types::RiskLevel;

/// Converts a flood depth in meters to a risk score.
///
/// Piecewise linear and monotone non-decreasing: knee-deep water is already
/// dangerous, so the curve front-loads the first meter.
#[must_use]
pub fn depth_to_risk(depth_m: f64) -> f64 {
    if !depth_m.is_finite() || depth_m <= 0.0 {
        0.0
    } else if depth_m <= 0.3 {
        depth_m
    } else if depth_m <= 0.6 {
        0.3 + (depth_m - 0.3)
    } else if depth_m <= 1.0 {
        0.6 + (depth_m - 0.6) * 0.5
    } else {
        (0.8 + (depth_m - 1.0) * 0.2).min(1.0)
    }
}

/// Classifies a river water level against its station thresholds.
#[must_use]
pub fn river_level(
    level_m: f64,
    alert_m: Option<f64>,
    alarm_m: Option<f64>,
    critical_m: Option<f64>,
) -> RiskLevel {
    if critical_m.is_some_and(|t| level_m >= t) {
        RiskLevel::Critical
    } else if alarm_m.is_some_and(|t| level_m >= t) {
        RiskLevel::Alarm
    } else if alert_m.is_some_and(|t| level_m >= t) {
        RiskLevel::Alert
    } else {
        RiskLevel::Normal
    }
}

/// Risk score for a classified river level.
#[must_use]
pub fn river_risk(level: RiskLevel) -> f64 {
    match level {
        RiskLevel::Normal => 0.2,
        RiskLevel::Alert => 0.5,
        RiskLevel::Alarm => 0.8,
        RiskLevel::Critical => 1.0,
    }
}

/// Risk score for a dam's deviation from its normal high-water level.
#[must_use]
pub fn dam_deviation_risk(deviation_m: f64) -> f64 {
    if deviation_m >= 2.0 {
        1.0
    } else if deviation_m >= 1.0 {
        0.8
    } else if deviation_m >= 0.5 {
        0.5
    } else if deviation_m >= 0.0 {
        0.3
    } else {
        0.1
    }
}

/// Rainfall intensity bands in mm/h.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RainIntensity {
    /// No rain.
    None,
    /// Up to 2.5 mm/h.
    Light,
    /// Up to 7.5 mm/h.
    Moderate,
    /// Up to 15 mm/h.
    Heavy,
    /// Up to 30 mm/h.
    Intense,
    /// Above 30 mm/h.
    Torrential,
}

impl RainIntensity {
    /// Classifies an hourly rainfall rate.
    #[must_use]
    pub fn classify(mm_per_hour: f64) -> Self {
        if !mm_per_hour.is_finite() || mm_per_hour <= 0.0 {
            Self::None
        } else if mm_per_hour <= 2.5 {
            Self::Light
        } else if mm_per_hour <= 7.5 {
            Self::Moderate
        } else if mm_per_hour <= 15.0 {
            Self::Heavy
        } else if mm_per_hour <= 30.0 {
            Self::Intense
        } else {
            Self::Torrential
        }
    }

    /// Contribution of this band to the rain-severity factor, scaled
    /// linearly up to 0.6 at torrential.
    #[must_use]
    pub fn severity_factor(&self) -> f64 {
        let band = match self {
            Self::None => 0.0,
            Self::Light => 1.0,
            Self::Moderate => 2.0,
            Self::Heavy => 3.0,
            Self::Intense => 4.0,
            Self::Torrential => 5.0,
        };
        band / 5.0 * 0.6
    }
}

/// Rain-severity factor for an hourly rainfall rate.
#[must_use]
pub fn rain_severity_factor(mm_per_hour: f64) -> f64 {
    RainIntensity::classify(mm_per_hour).severity_factor()
}
