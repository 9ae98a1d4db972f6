use crate::config::ThresholdConfig;
use crate::types::Severity;

/// Classify a percentage change against warn/critical thresholds.
/// Critical is checked first; both compare the absolute change.
pub fn classify(percent_change: f64, thresholds: &ThresholdConfig) -> Severity {
    let magnitude = percent_change.abs();
    if magnitude >= thresholds.percent_change_critical {
        Severity::Severe
    } else if magnitude >= thresholds.percent_change_warn {
        Severity::Notable
    } else {
        Severity::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds(warn: f64, crit: f64) -> ThresholdConfig {
        ThresholdConfig {
            percent_change_warn: warn,
            percent_change_critical: crit,
            minimum_baseline_count: 1,
        }
    }

    #[test]
    fn boundaries_are_inclusive() {
        let t = thresholds(30.0, 80.0);
        assert_eq!(classify(29.9, &t), Severity::None);
        assert_eq!(classify(30.0, &t), Severity::Notable);
        assert_eq!(classify(80.0, &t), Severity::Severe);
    }

    #[test]
    fn drops_use_magnitude() {
        let t = thresholds(30.0, 80.0);
        assert_eq!(classify(-45.0, &t), Severity::Notable);
        assert_eq!(classify(-100.0, &t), Severity::Severe);
    }

    #[test]
    fn critical_wins_when_thresholds_coincide() {
        assert_eq!(classify(50.0, &thresholds(50.0, 50.0)), Severity::Severe);
    }
}
