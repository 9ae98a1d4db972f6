use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};

use crate::config::TelegramConfig;
use crate::error::SendError;
use crate::report::Attachment;
use super::{check_response, MessageChannel};

/// Telegram Bot API `sendMessage` limit, in UTF-16 code units
const TELEGRAM_MAX_MESSAGE: usize = 4096;

/// Telegram bot alert channel
pub struct TelegramChannel {
    api_base: String,
    bot_token: String,
    chat_id: String,
    send_chart: bool,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig, client: reqwest::Client) -> Self {
        Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
            send_chart: config.send_chart,
            client,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    pub fn message_payload(&self, text: &str) -> Value {
        json!({
            "chat_id": self.chat_id,
            "text": text,
            "disable_web_page_preview": true,
        })
    }
}

#[async_trait]
impl MessageChannel for TelegramChannel {
    fn name(&self) -> &str { "telegram" }

    fn max_message_len(&self) -> usize { TELEGRAM_MAX_MESSAGE }

    // Emoji outside the BMP count twice.
    fn message_len(&self, text: &str) -> usize {
        text.encode_utf16().count()
    }

    async fn send_text(&self, text: &str) -> Result<(), SendError> {
        let resp = self.client.post(self.method_url("sendMessage"))
            .json(&self.message_payload(text))
            .send()
            .await?;
        check_response(resp).await
    }

    fn supports_attachments(&self) -> bool { self.send_chart }

    async fn send_attachment(&self, attachment: &Attachment) -> Result<(), SendError> {
        let part = Part::bytes(attachment.bytes.clone())
            .file_name(attachment.file_name.clone())
            .mime_str(attachment.mime_type)?;
        let form = Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", "Request volume history")
            .part("document", part);

        let resp = self.client.post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await?;
        check_response(resp).await
    }
}
