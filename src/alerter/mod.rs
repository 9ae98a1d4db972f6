pub mod discord;
pub mod slack;
pub mod telegram;
pub mod webhook;

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::{AlertingConfig, RetryConfig};
use crate::error::{ConfigError, DeliveryError, SendError};
use crate::report::{Attachment, ChartRenderer, CsvChartRenderer, Report};
use crate::retry::RetryPolicy;

/// A messaging endpoint the report can be delivered to
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Channel name
    fn name(&self) -> &str;

    /// Longest message body the endpoint accepts, in `message_len` units
    fn max_message_len(&self) -> usize;

    /// Length of `text` as the endpoint counts it
    fn message_len(&self, text: &str) -> usize {
        text.chars().count()
    }

    /// Send one message body
    async fn send_text(&self, text: &str) -> Result<(), SendError>;

    fn supports_attachments(&self) -> bool {
        false
    }

    async fn send_attachment(&self, _attachment: &Attachment) -> Result<(), SendError> {
        Ok(())
    }
}

/// What was delivered by `Notifier::send`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ack {
    pub channels: Vec<String>,
    pub messages: usize,
    pub attachments: usize,
}

/// Delivers reports to every configured channel with retry
pub struct Notifier {
    channels: Vec<Box<dyn MessageChannel>>,
    retry: RetryPolicy,
    renderer: Option<Box<dyn ChartRenderer>>,
}

impl Notifier {
    pub fn new(channels: Vec<Box<dyn MessageChannel>>, retry: RetryPolicy) -> Self {
        Self {
            channels,
            retry,
            renderer: None,
        }
    }

    pub fn with_renderer(mut self, renderer: Box<dyn ChartRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn from_config(config: &AlertingConfig, retry: &RetryConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ConfigError::invalid("alerting", format!("cannot build HTTP client: {}", e)))?;

        let mut channels: Vec<Box<dyn MessageChannel>> = Vec::new();

        if let Some(ref tc) = config.telegram {
            if tc.enabled {
                channels.push(Box::new(telegram::TelegramChannel::new(tc, client.clone())));
            }
        }

        if let Some(ref sc) = config.slack {
            if sc.enabled {
                channels.push(Box::new(slack::SlackChannel::new(sc, client.clone())));
            }
        }

        if let Some(ref dc) = config.discord {
            if dc.enabled {
                channels.push(Box::new(discord::DiscordChannel::new(dc, client.clone())));
            }
        }

        if let Some(ref wc) = config.webhook {
            if wc.enabled {
                channels.push(Box::new(webhook::WebhookChannel::new(wc, client.clone())));
            }
        }

        info!(channels = channels.len(), "Initialized message channels");

        let wants_chart = channels.iter().any(|c| c.supports_attachments());
        let notifier = Self::new(channels, RetryPolicy::from_config(retry));
        Ok(if wants_chart {
            notifier.with_renderer(Box::new(CsvChartRenderer))
        } else {
            notifier
        })
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Deliver `report` to every channel.
    ///
    /// Channels are attempted independently; the first failure is returned
    /// after all of them have been tried. A failed chart attachment is logged
    /// and does not fail delivery.
    pub async fn send(&self, report: &Report) -> Result<Ack, DeliveryError> {
        let text = report.render_text();
        let attachment = self.render_chart(report);

        let mut ack = Ack::default();
        let mut first_error: Option<DeliveryError> = None;

        for channel in &self.channels {
            let name = channel.name();
            let chunks = split_message_with(&text, channel.max_message_len(), |s| channel.message_len(s));
            if chunks.len() > 1 {
                debug!(channel = name, parts = chunks.len(), "Report split to fit message limit");
            }

            let mut delivered = true;
            for chunk in &chunks {
                let sent = self
                    .retry
                    .run(name, |_| channel.send_text(chunk))
                    .await;
                match sent {
                    Ok(()) => ack.messages += 1,
                    Err(exhausted) => {
                        let err = DeliveryError {
                            channel: name.to_string(),
                            attempts: exhausted.attempts,
                            cause: exhausted.error,
                        };
                        error!(channel = name, error = %err, "Failed to deliver report");
                        first_error.get_or_insert(err);
                        delivered = false;
                        break;
                    }
                }
            }
            if !delivered {
                continue;
            }
            ack.channels.push(name.to_string());

            if let (Some(file), true) = (attachment.as_ref(), channel.supports_attachments()) {
                match self.retry.run(name, |_| channel.send_attachment(file)).await {
                    Ok(()) => ack.attachments += 1,
                    Err(exhausted) => {
                        warn!(channel = name, error = %exhausted.error, "Failed to send chart attachment");
                    }
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => {
                info!(channels = ?ack.channels, messages = ack.messages, "Report delivered");
                Ok(ack)
            }
        }
    }

    fn render_chart(&self, report: &Report) -> Option<Attachment> {
        let renderer = self.renderer.as_ref()?;
        match renderer.render(report) {
            Ok(file) => Some(file),
            Err(e) => {
                debug!(error = %e, "No chart attached this run");
                None
            }
        }
    }
}

/// Split `text` into chunks of at most `limit` characters, breaking on
/// newlines where possible and hard-cutting lines longer than `limit`.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    split_message_with(text, limit, |s| s.chars().count())
}

/// `split_message` with the length measured by `measure`.
pub fn split_message_with<F>(text: &str, limit: usize, measure: F) -> Vec<String>
where
    F: Fn(&str) -> usize,
{
    let limit = limit.max(1);
    if measure(text) <= limit {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    // A chunk holding only a blank line is still started.
    let mut started = false;

    for line in text.split('\n') {
        let line_len = measure(line);
        let sep = usize::from(started);

        if current_len + sep + line_len <= limit {
            if started {
                current.push('\n');
            }
            current.push_str(line);
            current_len += sep + line_len;
            started = true;
            continue;
        }

        if started {
            flush(&mut chunks, &mut current);
            current_len = 0;
        }

        if line_len <= limit {
            current.push_str(line);
            current_len = line_len;
        } else {
            let mut buf = [0u8; 4];
            for c in line.chars() {
                let width = measure(c.encode_utf8(&mut buf));
                if current_len + width > limit && !current.is_empty() {
                    flush(&mut chunks, &mut current);
                    current_len = 0;
                }
                current.push(c);
                current_len += width;
            }
        }
        started = true;
    }

    if started {
        flush(&mut chunks, &mut current);
    }
    chunks
}

fn flush(chunks: &mut Vec<String>, current: &mut String) {
    // Endpoints reject empty messages.
    if !current.is_empty() {
        chunks.push(std::mem::take(current));
    }
}

/// Map an HTTP response to `Ok` or a `SendError`.
pub(crate) async fn check_response(resp: reqwest::Response) -> Result<(), SendError> {
    let status = resp.status().as_u16();
    if resp.status().is_success() {
        return Ok(());
    }
    let body = resp.text().await.unwrap_or_default();
    Err(SendError::from_status(status, &body).unwrap_or(SendError::Status { status, body }))
}
