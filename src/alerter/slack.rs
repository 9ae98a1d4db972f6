use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::SlackConfig;
use crate::error::SendError;
use super::{check_response, MessageChannel};

const SLACK_MAX_MESSAGE: usize = 40_000;

/// Slack incoming-webhook channel
pub struct SlackChannel {
    webhook_url: String,
    channel: Option<String>,
    client: reqwest::Client,
}

impl SlackChannel {
    pub fn new(config: &SlackConfig, client: reqwest::Client) -> Self {
        Self {
            webhook_url: config.webhook_url.clone(),
            channel: config.channel.clone(),
            client,
        }
    }

    pub fn payload(&self, text: &str) -> Value {
        let mut payload = json!({ "text": text });
        if let Some(ref ch) = self.channel {
            payload["channel"] = json!(ch);
        }
        payload
    }
}

#[async_trait]
impl MessageChannel for SlackChannel {
    fn name(&self) -> &str { "slack" }

    fn max_message_len(&self) -> usize { SLACK_MAX_MESSAGE }

    async fn send_text(&self, text: &str) -> Result<(), SendError> {
        let resp = self.client.post(&self.webhook_url)
            .json(&self.payload(text))
            .send()
            .await?;
        check_response(resp).await
    }
}
