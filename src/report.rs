use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::types::{HistoryEntry, ServiceKind, ServiceTarget, Severity, TrendResult};

/// What the pipeline learned about one service this run
#[derive(Debug, Clone)]
pub enum ServiceOutcome {
    Analyzed {
        result: TrendResult,
        /// History loaded for the service, oldest first
        history: Vec<HistoryEntry>,
    },
    Unavailable {
        service: ServiceTarget,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceFailure {
    pub service: ServiceTarget,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChartPoint {
    pub timestamp: DateTime<Utc>,
    pub request_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub service: ServiceTarget,
    pub points: Vec<ChartPoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub results: Vec<TrendResult>,
    pub failures: Vec<ServiceFailure>,
    pub chart_series: Vec<ChartSeries>,
    /// One line per service, in target order
    pub summary: Vec<String>,
}

impl Report {
    pub fn alert_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.severity, Severity::Notable | Severity::Severe))
            .count()
    }

    pub fn no_baseline_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.severity == Severity::NoBaseline)
            .count()
    }

    /// Plain-text message body.
    pub fn render_text(&self) -> String {
        let mut out = format!(
            "📊 Cloudflare request report - {}\n\n",
            self.generated_at.format("%Y-%m-%d %H:%M UTC")
        );
        for line in &self.summary {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(&format!(
            "\n✅ {} ok | ❌ {} unavailable | ⚪ {} without baseline | ⚠️ {} alert(s)",
            self.results.len(),
            self.failures.len(),
            self.no_baseline_count(),
            self.alert_count(),
        ));
        out
    }
}

pub fn compose(outcomes: &[ServiceOutcome], generated_at: DateTime<Utc>) -> Report {
    let mut report = Report {
        generated_at,
        results: Vec::new(),
        failures: Vec::new(),
        chart_series: Vec::new(),
        summary: Vec::with_capacity(outcomes.len()),
    };

    for outcome in outcomes {
        match outcome {
            ServiceOutcome::Analyzed { result, history } => {
                report.summary.push(result_line(result));
                match chart_series(result, history) {
                    Some(series) => report.chart_series.push(series),
                    None => tracing::debug!(service = %result.service, "Not enough points for chart"),
                }
                report.results.push(result.clone());
            }
            ServiceOutcome::Unavailable { service, reason } => {
                report.summary.push(format!(
                    "❌ {} ({}): data unavailable: {}",
                    service.name, service.kind, reason
                ));
                report.failures.push(ServiceFailure {
                    service: service.clone(),
                    reason: reason.clone(),
                });
            }
        }
    }

    report
}

fn result_line(result: &TrendResult) -> String {
    let icon = match result.service.kind {
        ServiceKind::Page => "📄",
        ServiceKind::Worker => "💻",
    };
    let head = format!(
        "{} {} ({}): {} requests",
        icon,
        result.service.name,
        result.service.kind,
        group_thousands(result.current.request_count)
    );

    match (&result.baseline, result.percent_change) {
        (Some(base), Some(change)) => {
            let marker = match result.severity {
                Severity::Severe => " 🚨 SEVERE",
                Severity::Notable => " ⚠️ NOTABLE",
                _ => "",
            };
            format!(
                "{}, {:+.1}% vs {}{}",
                head,
                change,
                group_thousands(base.request_count),
                marker
            )
        }
        _ => format!("{}, no baseline for comparison", head),
    }
}

/// History plus the current reading, ascending by window end. `None` when
/// there are fewer than two points to draw.
pub fn chart_series(result: &TrendResult, history: &[HistoryEntry]) -> Option<ChartSeries> {
    let mut points: Vec<ChartPoint> = history
        .iter()
        .filter(|e| e.record.service.same_series(&result.service) && e.record != result.current)
        .map(|e| ChartPoint {
            timestamp: e.record.window_end,
            request_count: e.record.request_count,
        })
        .collect();
    points.push(ChartPoint {
        timestamp: result.current.window_end,
        request_count: result.current.request_count,
    });
    points.sort_by_key(|p| p.timestamp);

    if points.len() < 2 {
        return None;
    }
    Some(ChartSeries {
        service: result.service.clone(),
        points,
    })
}

/// `1234567` -> `1,234,567`
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// File sent alongside the text report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("no chart series to render")]
    Empty,
}

/// Turns chart series into an attachment. Image rasterisers plug in here.
pub trait ChartRenderer: Send + Sync {
    fn render(&self, report: &Report) -> Result<Attachment, ChartError>;
}

/// Long-format CSV: `timestamp,service,requests`
#[derive(Debug, Clone, Default)]
pub struct CsvChartRenderer;

impl ChartRenderer for CsvChartRenderer {
    fn render(&self, report: &Report) -> Result<Attachment, ChartError> {
        if report.chart_series.is_empty() {
            return Err(ChartError::Empty);
        }
        let mut csv = String::from("timestamp,service,requests\n");
        for series in &report.chart_series {
            let name = csv_field(&series.service.to_string());
            for p in &series.points {
                csv.push_str(&format!(
                    "{},{},{}\n",
                    p.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
                    name,
                    p.request_count
                ));
            }
        }
        Ok(Attachment {
            file_name: format!("requests-{}.csv", report.generated_at.format("%Y%m%d-%H%M")),
            mime_type: "text/csv",
            bytes: csv.into_bytes(),
        })
    }
}

fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(1234567), "1,234,567");
    }

    #[test]
    fn quotes_csv_fields_when_needed() {
        assert_eq!(csv_field("page:blog"), "page:blog");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
