// Shared fakes and fixtures
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use cfstats_agent::alerter::MessageChannel;
use cfstats_agent::collector::{HttpResponse, HttpTransport, TransportError};
use cfstats_agent::config::ThresholdConfig;
use cfstats_agent::error::SendError;
use cfstats_agent::report::Attachment;
use cfstats_agent::types::{HistoryEntry, MetricRecord, ServiceKind, ServiceTarget, TimeRange};

pub const ACCOUNT: &str = "acc-123";

pub fn target(kind: ServiceKind, name: &str) -> ServiceTarget {
    ServiceTarget::new(kind, name, ACCOUNT)
}

/// 2026-10-`day` at `hour`:00 UTC
pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, day, hour, 0, 0).unwrap()
}

/// A 24h reading ending at `end`
pub fn record(service: &ServiceTarget, end: DateTime<Utc>, count: u64) -> MetricRecord {
    MetricRecord::new(service.clone(), TimeRange::trailing(24, end), count, end).unwrap()
}

pub fn entry(seq: u64, record: MetricRecord) -> HistoryEntry {
    HistoryEntry { seq, record }
}

pub fn thresholds(warn: f64, critical: f64, min_baseline: usize) -> ThresholdConfig {
    ThresholdConfig {
        percent_change_warn: warn,
        percent_change_critical: critical,
        minimum_baseline_count: min_baseline,
    }
}

pub fn page_body(requests: u64) -> String {
    format!(r#"{{"success":true,"errors":[],"result":{{"all":{{"requests":{}}}}}}}"#, requests)
}

pub fn worker_body(requests: u64) -> String {
    format!(r#"{{"success":true,"errors":[],"result":{{"sum":{{"requests":{}}}}}}}"#, requests)
}

pub fn respond(status: u16, body: &str) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse {
        status,
        body: body.to_string(),
    })
}

pub fn network_error(msg: &str) -> Result<HttpResponse, TransportError> {
    Err(TransportError(msg.to_string()))
}

struct Route {
    pattern: String,
    replies: VecDeque<Result<HttpResponse, TransportError>>,
}

/// Replies to requests whose URL contains a route's pattern, in order.
/// The last reply of a route repeats once the others are used up.
#[derive(Default)]
pub struct FakeTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, pattern: &str, replies: Vec<Result<HttpResponse, TransportError>>) -> Self {
        self.routes.lock().unwrap().push(Route {
            pattern: pattern.to_string(),
            replies: replies.into(),
        });
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count_matching(&self, pattern: &str) -> usize {
        self.requests().iter().filter(|u| u.contains(pattern)).count()
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn get(&self, url: &str, bearer_token: &str) -> Result<HttpResponse, TransportError> {
        assert!(!bearer_token.is_empty(), "requests must carry a token");
        self.requests.lock().unwrap().push(url.to_string());

        let mut routes = self.routes.lock().unwrap();
        let route = routes
            .iter_mut()
            .find(|r| url.contains(&r.pattern))
            .unwrap_or_else(|| panic!("no route for {}", url));
        if route.replies.len() > 1 {
            route.replies.pop_front().unwrap()
        } else {
            route.replies.front().cloned().expect("route has no replies")
        }
    }
}

/// What a `FakeChannel` saw
#[derive(Default)]
pub struct ChannelLog {
    pub attempts: AtomicU32,
    pub sent: Mutex<Vec<String>>,
    pub attachments: Mutex<Vec<Attachment>>,
}

impl ChannelLog {
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

/// Channel that fails its first `failures` sends with `error`
pub struct FakeChannel {
    name: String,
    limit: usize,
    failures: AtomicU32,
    error: SendError,
    attachments: bool,
    utf16: bool,
    log: Arc<ChannelLog>,
}

impl FakeChannel {
    pub fn new(name: &str, limit: usize) -> (Self, Arc<ChannelLog>) {
        let log = Arc::new(ChannelLog::default());
        (
            Self {
                name: name.to_string(),
                limit,
                failures: AtomicU32::new(0),
                error: SendError::Transport("connection reset".into()),
                attachments: false,
                utf16: false,
                log: log.clone(),
            },
            log,
        )
    }

    pub fn failing(mut self, failures: u32, error: SendError) -> Self {
        self.failures = AtomicU32::new(failures);
        self.error = error;
        self
    }

    pub fn with_attachments(mut self) -> Self {
        self.attachments = true;
        self
    }

    /// Count message length in UTF-16 code units
    pub fn counting_utf16(mut self) -> Self {
        self.utf16 = true;
        self
    }
}

#[async_trait]
impl MessageChannel for FakeChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_message_len(&self) -> usize {
        self.limit
    }

    fn message_len(&self, text: &str) -> usize {
        if self.utf16 {
            text.encode_utf16().count()
        } else {
            text.chars().count()
        }
    }

    async fn send_text(&self, text: &str) -> Result<(), SendError> {
        self.log.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(self.error.clone());
        }
        self.log.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn supports_attachments(&self) -> bool {
        self.attachments
    }

    async fn send_attachment(&self, attachment: &Attachment) -> Result<(), SendError> {
        self.log.attachments.lock().unwrap().push(attachment.clone());
        Ok(())
    }
}
