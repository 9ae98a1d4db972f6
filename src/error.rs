use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Reason a provider API call failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchCause {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rate limited (HTTP 429)")]
    RateLimited,
    #[error("server error (HTTP {0})")]
    Server(u16),
    #[error("authentication rejected (HTTP {0})")]
    Unauthorized(u16),
    #[error("not found (HTTP 404)")]
    NotFound,
    #[error("request rejected (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("malformed request: {0}")]
    InvalidRequest(String),
}

impl FetchCause {
    /// Map a non-2xx HTTP status to a cause. Returns `None` for success codes.
    pub fn from_status(status: u16, body: &str) -> Option<Self> {
        match status {
            200..=299 => None,
            429 => Some(FetchCause::RateLimited),
            401 | 403 => Some(FetchCause::Unauthorized(status)),
            404 => Some(FetchCause::NotFound),
            500..=599 => Some(FetchCause::Server(status)),
            _ => Some(FetchCause::Rejected {
                status,
                body: truncate(body, 200),
            }),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchCause::Transport(_) | FetchCause::RateLimited | FetchCause::Server(_)
        )
    }
}

#[derive(Debug, Clone, Error)]
#[error("fetch for {target} failed after {attempts} attempt(s): {cause}")]
pub struct FetchError {
    pub target: String,
    pub attempts: u32,
    pub cause: FetchCause,
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        self.cause.is_retryable()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("{target}: response is not valid JSON: {reason}")]
    Malformed { target: String, reason: String },
    #[error("{target}: provider reported failure (field `success`): {message}")]
    ProviderFailure { target: String, message: String },
    #[error("{target}: missing field `{field}`")]
    MissingField { target: String, field: String },
    #[error("{target}: field `{field}` is not a non-negative integer (got {found})")]
    InvalidField {
        target: String,
        field: String,
        found: String,
    },
    #[error("{target}: window start {start} is not before end {end}")]
    InvalidWindow {
        target: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Anything that can go wrong turning a target into a `MetricRecord`
#[derive(Debug, Clone, Error)]
pub enum CollectError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Extract(#[from] ExtractionError),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("history I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode history entry for {target}: {source}")]
    Encode {
        target: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path} was modified during append (expected {expected} bytes, found {found})")]
    ConcurrentModification {
        path: PathBuf,
        expected: u64,
        found: u64,
    },
}

impl PersistenceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PersistenceError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Reason a single message send failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("endpoint rate limited")]
    RateLimited,
    #[error("endpoint error (HTTP {status}): {body}")]
    Status { status: u16, body: String },
}

impl SendError {
    pub fn from_status(status: u16, body: &str) -> Option<Self> {
        match status {
            200..=299 => None,
            429 => Some(SendError::RateLimited),
            _ => Some(SendError::Status {
                status,
                body: truncate(body, 200),
            }),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            SendError::Transport(_) | SendError::RateLimited => true,
            SendError::Status { status, .. } => *status >= 500,
        }
    }
}

impl From<reqwest::Error> for SendError {
    fn from(e: reqwest::Error) -> Self {
        SendError::Transport(e.to_string())
    }
}

#[derive(Debug, Clone, Error)]
#[error("delivery via {channel} failed after {attempts} attempt(s): {cause}")]
pub struct DeliveryError {
    pub channel: String,
    pub attempts: u32,
    pub cause: SendError,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {field} {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
