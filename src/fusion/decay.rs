//! Time-decay curves for cached hazard signals.

use crate::config::FusionConfig;
use crate::domain_types::ReportKind;
use chrono::{DateTime, Utc};

/// Exponential decay `v * exp(-k * age_minutes)`. Ages in the future (clock
/// skew between sources) decay by zero rather than amplifying.
#[must_use]
pub fn exp_decay(value: f64, k_per_min: f64, age_minutes: f64) -> f64 {
    let age = age_minutes.max(0.0);
    value * (-k_per_min * age).exp()
}

/// Age of a timestamp in fractional minutes at `now`.
#[must_use]
pub fn age_minutes(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - timestamp).num_milliseconds() as f64 / 60_000.0
}

/// Adaptive decay rate for a scout report.
///
/// Rain observations wash out fast. Flood or blockage reports backed by an
/// elevated river station decay slowly, since the blocking water has a
/// supply. Everything else splits the difference.
#[must_use]
pub fn scout_decay_rate(kind: ReportKind, river_elevated: bool, config: &FusionConfig) -> f64 {
    match kind {
        ReportKind::RainReport => config.k_scout_fast,
        ReportKind::Flood | ReportKind::Blockage if river_elevated => config.k_scout_slow,
        _ if !river_elevated => config.k_scout_fast,
        _ => (config.k_scout_fast + config.k_scout_slow) / 2.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::Duration;

    #[test]
    fn decay_matches_closed_form() {
        let v = exp_decay(0.8, 0.10, 5.0);
        assert_relative_eq!(v, 0.8 * (-0.5f64).exp(), max_relative = 1e-12);
    }

    #[test]
    fn future_timestamps_do_not_amplify() {
        assert_relative_eq!(exp_decay(0.5, 0.10, -3.0), 0.5);
    }

    #[test]
    fn age_is_fractional_minutes() {
        let now = Utc::now();
        let earlier = now - Duration::seconds(90);
        assert_relative_eq!(age_minutes(earlier, now), 1.5, max_relative = 1e-9);
    }

    #[test]
    fn adaptive_rate_selection() {
        let config = FusionConfig::default();
        // Rain reports always decay fast.
        assert_relative_eq!(
            scout_decay_rate(ReportKind::RainReport, true, &config),
            config.k_scout_fast
        );
        // Flood reports persist while the river is elevated.
        assert_relative_eq!(
            scout_decay_rate(ReportKind::Flood, true, &config),
            config.k_scout_slow
        );
        // Without an elevated river everything decays fast.
        assert_relative_eq!(
            scout_decay_rate(ReportKind::Flood, false, &config),
            config.k_scout_fast
        );
        // Elevated river but unrelated kind: split the difference.
        assert_relative_eq!(
            scout_decay_rate(ReportKind::Clear, true, &config),
            (config.k_scout_fast + config.k_scout_slow) / 2.0
        );
    }
}
