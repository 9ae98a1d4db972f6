pub mod threshold;
pub mod trend;

pub use trend::{evaluate, percent_change};

use crate::config::ThresholdSettings;
use crate::types::{HistoryEntry, MetricRecord, TrendResult};

/// Applies the thresholds configured for each service kind.
#[derive(Debug, Clone)]
pub struct TrendAnalyzer {
    thresholds: ThresholdSettings,
}

impl TrendAnalyzer {
    pub fn new(thresholds: &ThresholdSettings) -> Self {
        Self {
            thresholds: thresholds.clone(),
        }
    }

    /// History entries to load per service so the baseline count is never
    /// cut short. One extra covers a stored copy of the current reading.
    pub fn history_needed(&self) -> usize {
        self.thresholds.max_baseline_count() + 1
    }

    pub fn evaluate(&self, current: &MetricRecord, history: &[HistoryEntry]) -> TrendResult {
        let thresholds = self.thresholds.for_kind(current.service.kind);
        let result = trend::evaluate(current, history, thresholds);
        tracing::debug!(
            service = %result.service,
            severity = %result.severity,
            percent_change = ?result.percent_change,
            "Evaluated trend"
        );
        result
    }
}
