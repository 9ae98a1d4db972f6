use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::config::WebhookConfig;
use crate::error::SendError;
use super::{check_response, MessageChannel};

const WEBHOOK_MAX_MESSAGE: usize = 64 * 1024;

/// Generic JSON webhook channel
pub struct WebhookChannel {
    url: String,
    headers: HashMap<String, String>,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(config: &WebhookConfig, client: reqwest::Client) -> Self {
        Self {
            url: config.url.clone(),
            headers: config.headers.clone(),
            client,
        }
    }

    pub fn payload(text: &str) -> Value {
        json!({
            "source": "cfstats-agent",
            "text": text,
        })
    }
}

#[async_trait]
impl MessageChannel for WebhookChannel {
    fn name(&self) -> &str { "webhook" }

    fn max_message_len(&self) -> usize { WEBHOOK_MAX_MESSAGE }

    async fn send_text(&self, text: &str) -> Result<(), SendError> {
        let mut req = self.client.post(&self.url).json(&Self::payload(text));
        for (k, v) in &self.headers {
            req = req.header(k, v);
        }

        let resp = req.send().await?;
        check_response(resp).await
    }
}
