use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Decoded configuration of a notification channel, stored as tagged JSON in
/// `notification_channels.config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ChannelConfig {
    Telegram {
        bot_token: String,
        chat_id: String,
    },
    Webhook {
        url: String,
        method: String, // "GET" or "POST"
        headers: Option<HashMap<String, String>>,
        body_template: Option<String>, // JSON template for POST requests
    },
}
