pub mod extract;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{CloudflareConfig, RetryConfig};
use crate::error::{CollectError, ConfigError, FetchCause, FetchError};
use crate::retry::RetryPolicy;
use crate::types::{MetricRecord, ServiceKind, ServiceTarget, TimeRange};

/// Status and body of a completed HTTP exchange
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// The request never produced a response (connect, timeout, TLS, ...)
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Outbound HTTP used by the API client.
///
/// Holds no state beyond connection reuse; status codes are returned, not
/// turned into errors, so the caller decides what is retryable.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str, bearer_token: &str) -> Result<HttpResponse, TransportError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cfstats-agent/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, bearer_token: &str) -> Result<HttpResponse, TransportError> {
        let resp = self
            .client
            .get(url)
            .bearer_auth(bearer_token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| TransportError(e.to_string()))?;
        Ok(HttpResponse { status, body })
    }
}

/// Retrying client for the provider's analytics endpoints
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    api_base: String,
    api_token: String,
    retry: RetryPolicy,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        api_base: impl Into<String>,
        api_token: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_token: api_token.into(),
            retry,
        }
    }

    pub fn from_config(config: &CloudflareConfig, retry: &RetryConfig) -> Result<Self, ConfigError> {
        let transport = ReqwestTransport::new(Duration::from_secs(config.request_timeout_secs))
            .map_err(|e| ConfigError::invalid("cloudflare", format!("cannot build HTTP client: {}", e)))?;
        Ok(Self::new(
            Arc::new(transport),
            config.api_base.clone(),
            config.api_token.clone(),
            RetryPolicy::from_config(retry),
        ))
    }

    /// Statistics endpoint for `target` over `window`.
    pub fn stats_url(&self, target: &ServiceTarget, window: &TimeRange) -> Result<Url, FetchCause> {
        let account = &target.account_id;
        let (path, query) = match target.kind {
            ServiceKind::Page => (
                format!("accounts/{}/analytics/pages/projects/{}/requests", account, target.name),
                vec![
                    ("since", window.start.to_rfc3339_opts(SecondsFormat::Secs, true)),
                    ("until", window.end.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ],
            ),
            ServiceKind::Worker => (
                format!("accounts/{}/workers/analytics/requests", account),
                vec![
                    ("service", target.name.clone()),
                    ("from", window.start.timestamp().to_string()),
                    ("to", window.end.timestamp().to_string()),
                ],
            ),
        };
        let mut url = self.endpoint(&path)?;
        url.query_pairs_mut().extend_pairs(query);
        Ok(url)
    }

    fn endpoint(&self, path: &str) -> Result<Url, FetchCause> {
        Url::parse(&format!("{}/{}", self.api_base, path))
            .map_err(|e| FetchCause::InvalidRequest(e.to_string()))
    }

    /// GET `url`, retrying transient failures. Returns the 2xx body.
    async fn get_with_retry(&self, label: &str, url: &Url) -> Result<String, FetchError> {
        let result = self
            .retry
            .run(label, |attempt| async move {
                debug!(target_service = label, attempt, %url, "Requesting statistics");
                let resp = self
                    .transport
                    .get(url.as_str(), &self.api_token)
                    .await
                    .map_err(|e| FetchCause::Transport(e.0))?;
                match FetchCause::from_status(resp.status, &resp.body) {
                    Some(cause) => Err(cause),
                    None => Ok(resp.body),
                }
            })
            .await;

        result.map_err(|exhausted| FetchError {
            target: label.to_string(),
            attempts: exhausted.attempts,
            cause: exhausted.error,
        })
    }

    /// Fetch and normalize the request count for one target.
    pub async fn fetch(&self, target: &ServiceTarget, window: TimeRange) -> Result<MetricRecord, CollectError> {
        let label = target.to_string();
        let url = self.stats_url(target, &window).map_err(|cause| FetchError {
            target: label.clone(),
            attempts: 0,
            cause,
        })?;
        let body = self.get_with_retry(&label, &url).await?;
        let record = extract::normalize(&body, target, window, Utc::now())?;
        debug!(service = %target, requests = record.request_count, "Fetched request count");
        Ok(record)
    }

    /// List every service of `kind` on `account_id`.
    pub async fn discover(&self, kind: ServiceKind, account_id: &str) -> Result<Vec<ServiceTarget>, CollectError> {
        let scope = ServiceTarget::new(kind, "*", account_id);
        let label = scope.to_string();
        let path = match kind {
            ServiceKind::Page => format!("accounts/{}/pages/projects", account_id),
            ServiceKind::Worker => format!("accounts/{}/workers/services", account_id),
        };
        let url = self.endpoint(&path).map_err(|cause| FetchError {
            target: label.clone(),
            attempts: 0,
            cause,
        })?;
        let body = self.get_with_retry(&label, &url).await?;
        let names = extract::service_names(&body, &scope)?;
        info!(kind = %kind, count = names.len(), "Discovered services");
        Ok(names
            .into_iter()
            .map(|name| ServiceTarget::new(kind, name, account_id))
            .collect())
    }
}
