pub mod alerter;
pub mod analyzer;
pub mod collector;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod retry;
pub mod storage;

/// Common types used across modules
pub mod types {
    use chrono::{DateTime, Duration, Utc};
    use serde::{Deserialize, Serialize};

    use crate::error::ExtractionError;

    /// Kind of hosted unit being tracked
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum ServiceKind {
        Page,
        Worker,
    }

    impl ServiceKind {
        pub fn as_str(&self) -> &'static str {
            match self {
                ServiceKind::Page => "page",
                ServiceKind::Worker => "worker",
            }
        }
    }

    impl std::fmt::Display for ServiceKind {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.as_str())
        }
    }

    /// One monitored service
    #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ServiceTarget {
        pub kind: ServiceKind,
        pub name: String,
        pub account_id: String,
    }

    impl ServiceTarget {
        pub fn new(kind: ServiceKind, name: impl Into<String>, account_id: impl Into<String>) -> Self {
            Self {
                kind,
                name: name.into(),
                account_id: account_id.into(),
            }
        }

        /// Same logical series, ignoring the account the reading came from.
        pub fn same_series(&self, other: &ServiceTarget) -> bool {
            self.kind == other.kind && self.name == other.name
        }
    }

    impl std::fmt::Display for ServiceTarget {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}:{}", self.kind, self.name)
        }
    }

    /// Half-open observation window `[start, end)`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct TimeRange {
        pub start: DateTime<Utc>,
        pub end: DateTime<Utc>,
    }

    impl TimeRange {
        /// The `hours` hours ending at `end`.
        pub fn trailing(hours: u32, end: DateTime<Utc>) -> Self {
            Self {
                start: end - Duration::hours(i64::from(hours)),
                end,
            }
        }
    }

    /// A single request-count observation for one service
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct MetricRecord {
        pub service: ServiceTarget,
        pub window_start: DateTime<Utc>,
        pub window_end: DateTime<Utc>,
        pub request_count: u64,
        pub fetched_at: DateTime<Utc>,
    }

    impl MetricRecord {
        pub fn new(
            service: ServiceTarget,
            window: TimeRange,
            request_count: u64,
            fetched_at: DateTime<Utc>,
        ) -> Result<Self, ExtractionError> {
            if window.start >= window.end {
                return Err(ExtractionError::InvalidWindow {
                    target: service.to_string(),
                    start: window.start,
                    end: window.end,
                });
            }
            Ok(Self {
                service,
                window_start: window.start,
                window_end: window.end,
                request_count,
                fetched_at,
            })
        }
    }

    /// A persisted `MetricRecord`. `seq` increases with every append to a series.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct HistoryEntry {
        pub seq: u64,
        #[serde(flatten)]
        pub record: MetricRecord,
    }

    /// Classification of a period-over-period change
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    pub enum Severity {
        None,
        Notable,
        Severe,
        NoBaseline,
    }

    impl std::fmt::Display for Severity {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Severity::None => write!(f, "none"),
                Severity::Notable => write!(f, "notable"),
                Severity::Severe => write!(f, "severe"),
                Severity::NoBaseline => write!(f, "no-baseline"),
            }
        }
    }

    /// Outcome of comparing a reading against its baseline
    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct TrendResult {
        pub service: ServiceTarget,
        pub current: MetricRecord,
        pub baseline: Option<MetricRecord>,
        pub percent_change: Option<f64>,
        pub severity: Severity,
    }

}
