use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::{NotificationSender, SenderError};
use crate::notifications::models::ChannelConfig;

/// Characters the Telegram MarkdownV2 parser treats as markup.
const MARKDOWN_V2_RESERVED: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

/// Delivers alert text to a chat via the Telegram Bot API. Monitor names and
/// URLs routinely contain MarkdownV2 markup characters (dots, dashes,
/// underscores), so the whole alert is escaped before sending.
pub struct TelegramSender {
    client: Client,
}

impl Default for TelegramSender {
    fn default() -> Self {
        Self::new()
    }
}

impl TelegramSender {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

fn escape_markdown_v2(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        if MARKDOWN_V2_RESERVED.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl NotificationSender for TelegramSender {
    async fn send(
        &self,
        config: &ChannelConfig,
        message: &str,
        _context: &HashMap<String, String>, // The alert text is already final.
    ) -> Result<(), SenderError> {
        let ChannelConfig::Telegram { bot_token, chat_id } = config else {
            return Err(SenderError::InvalidConfiguration(
                "Telegram sender received a non-telegram channel config".to_string(),
            ));
        };

        let response = self
            .client
            .post(format!(
                "https://api.telegram.org/bot{bot_token}/sendMessage"
            ))
            .json(&json!({
                "chat_id": chat_id,
                "text": escape_markdown_v2(message),
                "parse_mode": "MarkdownV2",
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SenderError::SendFailed(format!(
                "Telegram API rejected the message: {status} {body}"
            )));
        }
        Ok(())
    }
}
