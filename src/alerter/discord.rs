use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::DiscordConfig;
use crate::error::SendError;
use super::{check_response, MessageChannel};

/// Discord rejects `content` longer than this
const DISCORD_MAX_MESSAGE: usize = 2000;

/// Discord webhook channel
pub struct DiscordChannel {
    webhook_url: String,
    username: String,
    client: reqwest::Client,
}

impl DiscordChannel {
    pub fn new(config: &DiscordConfig, client: reqwest::Client) -> Self {
        Self {
            webhook_url: config.webhook_url.clone(),
            username: config.username.clone().unwrap_or_else(|| "Cloudflare Stats".into()),
            client,
        }
    }

    pub fn payload(&self, text: &str) -> Value {
        json!({
            "username": self.username,
            "content": text,
        })
    }
}

#[async_trait]
impl MessageChannel for DiscordChannel {
    fn name(&self) -> &str { "discord" }

    fn max_message_len(&self) -> usize { DISCORD_MAX_MESSAGE }

    async fn send_text(&self, text: &str) -> Result<(), SendError> {
        let resp = self.client.post(&self.webhook_url)
            .json(&self.payload(text))
            .send()
            .await?;
        check_response(resp).await
    }
}
