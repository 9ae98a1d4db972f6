use serde::Deserialize;
use std::collections::HashMap;

use crate::error::ConfigError;
use crate::types::{ServiceKind, ServiceTarget};

/// Top-level configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    pub cloudflare: CloudflareConfig,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
    #[serde(default)]
    pub thresholds: ThresholdSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub alerting: AlertingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// History entries loaded per service for baseline and chart
    #[serde(default = "default_chart_points")]
    pub chart_points: usize,
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
            chart_points: default_chart_points(),
            fetch_concurrency: default_fetch_concurrency(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CloudflareConfig {
    pub account_id: String,
    pub api_token: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_window_hours")]
    pub window_hours: u32,
    /// List every Pages project and Workers service on the account
    #[serde(default)]
    pub discover: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TargetConfig {
    pub kind: ServiceKind,
    pub name: String,
    pub account_id: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ThresholdConfig {
    #[serde(default = "default_warn")]
    pub percent_change_warn: f64,
    #[serde(default = "default_critical")]
    pub percent_change_critical: f64,
    #[serde(default = "default_min_baseline")]
    pub minimum_baseline_count: usize,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            percent_change_warn: default_warn(),
            percent_change_critical: default_critical(),
            minimum_baseline_count: default_min_baseline(),
        }
    }
}

/// Global thresholds with optional per-kind overrides
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ThresholdSettings {
    #[serde(flatten)]
    pub default: ThresholdConfig,
    pub page: Option<ThresholdConfig>,
    pub worker: Option<ThresholdConfig>,
}

impl ThresholdSettings {
    pub fn for_kind(&self, kind: ServiceKind) -> &ThresholdConfig {
        let over = match kind {
            ServiceKind::Page => self.page.as_ref(),
            ServiceKind::Worker => self.worker.as_ref(),
        };
        over.unwrap_or(&self.default)
    }

    /// Largest `minimum_baseline_count` across the default and overrides.
    pub fn max_baseline_count(&self) -> usize {
        [Some(&self.default), self.page.as_ref(), self.worker.as_ref()]
            .into_iter()
            .flatten()
            .map(|t| t.minimum_baseline_count)
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            multiplier: default_multiplier(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RetrySettings {
    #[serde(default)]
    pub fetch: RetryConfig,
    #[serde(default)]
    pub notify: RetryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertingConfig {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub slack: Option<SlackConfig>,
    #[serde(default)]
    pub discord: Option<DiscordConfig>,
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            telegram: None,
            slack: None,
            discord: None,
            webhook: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub bot_token: String,
    pub chat_id: String,
    #[serde(default = "default_telegram_api")]
    pub api_base: String,
    /// Attach the chart series as a CSV document
    #[serde(default = "default_true")]
    pub send_chart: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SlackConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub webhook_url: String,
    pub channel: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscordConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub webhook_url: String,
    pub username: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::load_from_str(&content)
    }

    /// Expand, parse and validate config from a string.
    pub fn load_from_str(content: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(content);
        let config: Config = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Configured targets in file order, account defaulting to `cloudflare.account_id`.
    pub fn service_targets(&self) -> Vec<ServiceTarget> {
        self.targets
            .iter()
            .map(|t| {
                let account = t
                    .account_id
                    .clone()
                    .unwrap_or_else(|| self.cloudflare.account_id.clone());
                ServiceTarget::new(t.kind, t.name.clone(), account)
            })
            .collect()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cloudflare.account_id.trim().is_empty() {
            return Err(ConfigError::invalid("cloudflare.account_id", "must be non-empty"));
        }
        if self.cloudflare.api_token.trim().is_empty() {
            return Err(ConfigError::invalid("cloudflare.api_token", "must be non-empty"));
        }
        if self.cloudflare.window_hours == 0 {
            return Err(ConfigError::invalid("cloudflare.window_hours", "must be > 0"));
        }
        if self.cloudflare.request_timeout_secs == 0 {
            return Err(ConfigError::invalid("cloudflare.request_timeout_secs", "must be > 0"));
        }
        if self.targets.is_empty() && !self.cloudflare.discover {
            return Err(ConfigError::invalid(
                "targets",
                "must list at least one service unless cloudflare.discover is set",
            ));
        }
        for (i, t) in self.targets.iter().enumerate() {
            if t.name.trim().is_empty() {
                return Err(ConfigError::invalid(&format!("targets[{}].name", i), "must be non-empty"));
            }
        }
        if self.agent.data_dir.trim().is_empty() {
            return Err(ConfigError::invalid("agent.data_dir", "must be non-empty"));
        }
        if self.agent.fetch_concurrency == 0 {
            return Err(ConfigError::invalid("agent.fetch_concurrency", "must be > 0"));
        }

        validate_thresholds("thresholds", &self.thresholds.default)?;
        if let Some(ref t) = self.thresholds.page {
            validate_thresholds("thresholds.page", t)?;
        }
        if let Some(ref t) = self.thresholds.worker {
            validate_thresholds("thresholds.worker", t)?;
        }
        validate_retry("retry.fetch", &self.retry.fetch)?;
        validate_retry("retry.notify", &self.retry.notify)?;

        self.validate_alerting()
    }

    fn validate_alerting(&self) -> Result<(), ConfigError> {
        let a = &self.alerting;
        let mut enabled = 0;

        if let Some(ref tg) = a.telegram {
            if tg.enabled {
                if tg.bot_token.trim().is_empty() {
                    return Err(ConfigError::invalid("alerting.telegram.bot_token", "must be non-empty"));
                }
                if tg.chat_id.trim().is_empty() {
                    return Err(ConfigError::invalid("alerting.telegram.chat_id", "must be non-empty"));
                }
                enabled += 1;
            }
        }
        if let Some(ref sc) = a.slack {
            if sc.enabled {
                if sc.webhook_url.trim().is_empty() {
                    return Err(ConfigError::invalid("alerting.slack.webhook_url", "must be non-empty"));
                }
                enabled += 1;
            }
        }
        if let Some(ref dc) = a.discord {
            if dc.enabled {
                if dc.webhook_url.trim().is_empty() {
                    return Err(ConfigError::invalid("alerting.discord.webhook_url", "must be non-empty"));
                }
                enabled += 1;
            }
        }
        if let Some(ref wc) = a.webhook {
            if wc.enabled {
                if wc.url.trim().is_empty() {
                    return Err(ConfigError::invalid("alerting.webhook.url", "must be non-empty"));
                }
                enabled += 1;
            }
        }

        if enabled == 0 {
            return Err(ConfigError::invalid("alerting", "must enable at least one messaging endpoint"));
        }
        if a.request_timeout_secs == 0 {
            return Err(ConfigError::invalid("alerting.request_timeout_secs", "must be > 0"));
        }
        Ok(())
    }
}

fn validate_thresholds(section: &str, t: &ThresholdConfig) -> Result<(), ConfigError> {
    if !(t.percent_change_warn >= 0.0) {
        return Err(ConfigError::invalid(
            &format!("{}.percent_change_warn", section),
            format!("must be >= 0, got {}", t.percent_change_warn),
        ));
    }
    if !(t.percent_change_critical >= t.percent_change_warn) {
        return Err(ConfigError::invalid(
            &format!("{}.percent_change_critical", section),
            format!(
                "must be >= percent_change_warn ({}), got {}",
                t.percent_change_warn, t.percent_change_critical
            ),
        ));
    }
    Ok(())
}

fn validate_retry(section: &str, r: &RetryConfig) -> Result<(), ConfigError> {
    if r.max_attempts == 0 {
        return Err(ConfigError::invalid(&format!("{}.max_attempts", section), "must be >= 1"));
    }
    if !(r.multiplier >= 1.0) || !r.multiplier.is_finite() {
        return Err(ConfigError::invalid(
            &format!("{}.multiplier", section),
            format!("must be a finite number >= 1, got {}", r.multiplier),
        ));
    }
    if r.max_delay_ms < r.base_delay_ms {
        return Err(ConfigError::invalid(
            &format!("{}.max_delay_ms", section),
            format!("must be >= base_delay_ms ({})", r.base_delay_ms),
        ));
    }
    Ok(())
}

/// Expand ${ENV_VAR} references in config string
fn expand_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static env var pattern");
    re.replace_all(input, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_default()
    })
    .to_string()
}

// Default value functions
fn default_log_level() -> String { "info".to_string() }
fn default_data_dir() -> String { "data/history".to_string() }
fn default_chart_points() -> usize { 30 }
fn default_fetch_concurrency() -> usize { 4 }
fn default_api_base() -> String { "https://api.cloudflare.com/client/v4".to_string() }
fn default_telegram_api() -> String { "https://api.telegram.org".to_string() }
fn default_request_timeout() -> u64 { 30 }
fn default_window_hours() -> u32 { 24 }
fn default_true() -> bool { true }
fn default_warn() -> f64 { 30.0 }
fn default_critical() -> f64 { 80.0 }
fn default_min_baseline() -> usize { 1 }
fn default_max_attempts() -> u32 { 3 }
fn default_base_delay() -> u64 { 1000 }
fn default_max_delay() -> u64 { 30_000 }
fn default_multiplier() -> f64 { 2.0 }
