use crate::config::ThresholdConfig;
use crate::types::{HistoryEntry, MetricRecord, Severity, TrendResult};
use super::threshold::classify;

/// Percentage change from `baseline` to `current`.
///
/// The denominator is floored at 1, so a zero baseline yields a large but
/// finite change instead of a division by zero.
pub fn percent_change(baseline: u64, current: u64) -> f64 {
    let delta = current as f64 - baseline as f64;
    delta / baseline.max(1) as f64 * 100.0
}

/// Entries that may serve as a baseline for `current`: strictly older by
/// window end, and not `current` itself.
fn eligible<'a>(current: &'a MetricRecord, history: &'a [HistoryEntry]) -> impl Iterator<Item = &'a HistoryEntry> {
    history.iter().filter(move |e| {
        e.record.service.same_series(&current.service)
            && e.record.window_end < current.window_end
            && e.record != *current
    })
}

/// Compare `current` against the most recent eligible history entry.
///
/// Baseline choice is by window end, not append order; `seq` only breaks
/// ties between entries covering the same window.
pub fn evaluate(current: &MetricRecord, history: &[HistoryEntry], thresholds: &ThresholdConfig) -> TrendResult {
    let candidates: Vec<&HistoryEntry> = eligible(current, history).collect();

    let baseline = if candidates.is_empty() || candidates.len() < thresholds.minimum_baseline_count {
        None
    } else {
        candidates
            .iter()
            .max_by(|a, b| {
                a.record
                    .window_end
                    .cmp(&b.record.window_end)
                    .then(a.seq.cmp(&b.seq))
            })
            .map(|e| e.record.clone())
    };

    match baseline {
        Some(base) => {
            let change = percent_change(base.request_count, current.request_count);
            TrendResult {
                service: current.service.clone(),
                current: current.clone(),
                baseline: Some(base),
                percent_change: Some(change),
                severity: classify(change, thresholds),
            }
        }
        None => TrendResult {
            service: current.service.clone(),
            current: current.clone(),
            baseline: None,
            percent_change: None,
            severity: Severity::NoBaseline,
        },
    }
}
