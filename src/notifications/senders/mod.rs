use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

use super::models::ChannelConfig;

pub mod telegram;
pub mod webhook;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Failed to send notification: {0}")]
    SendFailed(String),
    #[error("Invalid configuration for sender: {0}")]
    InvalidConfiguration(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Templating error: {0}")]
    TemplatingError(String),
}

/// Transport for one channel type. The dispatcher owns one implementation
/// per `channel_type` string; everything above this trait is agnostic to how
/// a notification physically leaves the system.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Sends a notification.
    ///
    /// * `config` - the decoded configuration for this channel.
    /// * `message` - the rendered alert text.
    /// * `context` - monitor snapshot fields (`monitor_name`, `monitor_url`,
    ///   `event`, `response_time_ms`) for senders that support templating.
    async fn send(
        &self,
        config: &ChannelConfig,
        message: &str,
        context: &HashMap<String, String>,
    ) -> Result<(), SenderError>;
}
