use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use tracing::{error, info, warn};

use crate::alerter::{Ack, Notifier};
use crate::analyzer::TrendAnalyzer;
use crate::collector::ApiClient;
use crate::config::Config;
use crate::error::{CollectError, ConfigError, DeliveryError};
use crate::report::{self, Report, ServiceOutcome};
use crate::storage::HistoryStore;
use crate::types::{MetricRecord, ServiceKind, ServiceTarget, TimeRange};

/// Knobs for one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub account_id: String,
    pub window_hours: u32,
    /// History entries loaded per service, raised to what the thresholds need
    pub history_depth: usize,
    pub fetch_concurrency: usize,
    pub discover: bool,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            account_id: config.cloudflare.account_id.clone(),
            window_hours: config.cloudflare.window_hours,
            history_depth: config.agent.chart_points,
            fetch_concurrency: config.agent.fetch_concurrency,
            discover: config.cloudflare.discover,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Notify and persist
    Full,
    /// Fetch and analyse only
    DryRun,
}

#[derive(Debug)]
pub struct RunSummary {
    pub report: Report,
    pub fetched: usize,
    pub unavailable: usize,
    pub persisted: usize,
    pub persist_failures: Vec<(ServiceTarget, String)>,
    /// `None` in dry-run mode
    pub delivery: Option<Result<Ack, DeliveryError>>,
}

impl RunSummary {
    pub fn delivered(&self) -> bool {
        matches!(self.delivery, Some(Ok(_)))
    }

    /// Some service, the history store or the notifier failed.
    pub fn is_partial(&self) -> bool {
        self.unavailable > 0
            || !self.persist_failures.is_empty()
            || matches!(self.delivery, Some(Err(_)))
    }
}

pub struct Pipeline {
    client: ApiClient,
    store: HistoryStore,
    analyzer: TrendAnalyzer,
    notifier: Notifier,
    targets: Vec<ServiceTarget>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        client: ApiClient,
        store: HistoryStore,
        analyzer: TrendAnalyzer,
        notifier: Notifier,
        targets: Vec<ServiceTarget>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            client,
            store,
            analyzer,
            notifier,
            targets,
            settings,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let client = ApiClient::from_config(&config.cloudflare, &config.retry.fetch)?;
        let store = HistoryStore::open(&config.agent.data_dir)
            .map_err(|e| ConfigError::invalid("agent.data_dir", e.to_string()))?;
        let analyzer = TrendAnalyzer::new(&config.thresholds);
        let notifier = Notifier::from_config(&config.alerting, &config.retry.notify)?;

        Ok(Self::new(
            client,
            store,
            analyzer,
            notifier,
            config.service_targets(),
            PipelineSettings::from_config(config),
        ))
    }

    pub async fn run(&self, mode: RunMode) -> RunSummary {
        self.run_at(Utc::now(), mode).await
    }

    /// Execute fetch -> analyse -> report -> notify -> persist for the
    /// window ending at `now`. Per-service failures are recorded in the
    /// report; nothing here aborts the run.
    pub async fn run_at(&self, now: DateTime<Utc>, mode: RunMode) -> RunSummary {
        let targets = self.resolve_targets().await;
        let window = TimeRange::trailing(self.settings.window_hours, now);
        info!(targets = targets.len(), start = %window.start, end = %window.end, "Fetching statistics");

        // All fetches finish before any analysis; `buffered` keeps target order.
        let fetched: Vec<Result<MetricRecord, CollectError>> = stream::iter(targets.iter())
            .map(|target| self.client.fetch(target, window))
            .buffered(self.settings.fetch_concurrency.max(1))
            .collect()
            .await;

        let depth = self.settings.history_depth.max(self.analyzer.history_needed());
        let mut outcomes = Vec::with_capacity(targets.len());
        let mut captured: Vec<MetricRecord> = Vec::new();

        for (target, result) in targets.iter().zip(fetched) {
            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    warn!(service = %target, error = %e, "Service data unavailable");
                    outcomes.push(ServiceOutcome::Unavailable {
                        service: target.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            match self.store.load_recent(target, depth) {
                Ok(history) => {
                    let result = self.analyzer.evaluate(&record, &history);
                    outcomes.push(ServiceOutcome::Analyzed { result, history });
                }
                Err(e) => {
                    error!(service = %target, error = %e, "Failed to load history");
                    outcomes.push(ServiceOutcome::Unavailable {
                        service: target.clone(),
                        reason: format!("history unreadable ({} requests fetched): {}", record.request_count, e),
                    });
                }
            }
            captured.push(record);
        }

        let report = report::compose(&outcomes, now);
        let fetched_count = captured.len();
        let unavailable = report.failures.len();

        if mode == RunMode::DryRun {
            info!(fetched = fetched_count, unavailable, "Dry run, skipping delivery and history");
            return RunSummary {
                report,
                fetched: fetched_count,
                unavailable,
                persisted: 0,
                persist_failures: Vec::new(),
                delivery: None,
            };
        }

        let delivery = self.notifier.send(&report).await;
        if let Err(ref e) = delivery {
            error!(error = %e, "Report delivery failed, history will still be saved");
        }

        // Delivery outcome never blocks data capture.
        let mut persisted = 0;
        let mut persist_failures = Vec::new();
        for record in &captured {
            match self.store.append(&record.service, record) {
                Ok(_) => persisted += 1,
                Err(e) => {
                    error!(service = %record.service, error = %e, "Failed to append history");
                    persist_failures.push((record.service.clone(), e.to_string()));
                }
            }
        }

        info!(
            fetched = fetched_count,
            unavailable,
            persisted,
            persist_failures = persist_failures.len(),
            delivered = delivery.is_ok(),
            alerts = report.alert_count(),
            "Run complete"
        );

        RunSummary {
            report,
            fetched: fetched_count,
            unavailable,
            persisted,
            persist_failures,
            delivery: Some(delivery),
        }
    }

    /// Configured targets, followed by any discovered ones not already listed.
    async fn resolve_targets(&self) -> Vec<ServiceTarget> {
        let mut targets = self.targets.clone();
        if !self.settings.discover {
            return targets;
        }

        for kind in [ServiceKind::Page, ServiceKind::Worker] {
            match self.client.discover(kind, &self.settings.account_id).await {
                Ok(found) => {
                    for t in found {
                        if !targets.iter().any(|existing| existing.same_series(&t)) {
                            targets.push(t);
                        }
                    }
                }
                Err(e) => warn!(kind = %kind, error = %e, "Service discovery failed, using configured targets"),
            }
        }
        targets
    }
}
