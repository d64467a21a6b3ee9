use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use super::models::ChannelConfig;
use super::senders::{telegram::TelegramSender, webhook::WebhookSender, NotificationSender, SenderError};
use crate::db::enums::{AlertLogStatus, CheckOutcome};
use crate::db::models::{AlertLog, AlertRule, Monitor, NewAlertLog};
use crate::db::store::{DataStore, StoreError};

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Channel config error: {0}")]
    ConfigDecode(#[from] serde_json::Error),
    #[error("Unsupported channel type: {0}")]
    UnsupportedChannel(String),
    #[error("Sender error: {0}")]
    Sender(#[from] SenderError),
}

/// Fans a firing decision out to the configured channel. Every dispatch
/// writes an `alert_logs` row first (`pending`), then flips it to `sent` or
/// `failed` depending on the transport outcome. Transport failures are
/// recorded, not propagated: a broken webhook must not block a working
/// Telegram channel or future evaluation cycles.
pub struct NotificationDispatcher {
    store: Arc<dyn DataStore>,
    senders: HashMap<String, Arc<dyn NotificationSender>>,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        let mut senders: HashMap<String, Arc<dyn NotificationSender>> = HashMap::new();
        senders.insert("webhook".to_string(), Arc::new(WebhookSender::new()));
        senders.insert("telegram".to_string(), Arc::new(TelegramSender::new()));
        Self { store, senders }
    }

    /// Replaces the sender for a channel type. Tests use this to swap in
    /// recording senders; embedders use it to add transports.
    pub fn with_sender(mut self, channel_type: &str, sender: Arc<dyn NotificationSender>) -> Self {
        self.senders.insert(channel_type.to_string(), sender);
        self
    }

    /// Dispatches one event through one rule's channel. Returns the alert
    /// log row in its final state. Errors only when even the log row cannot
    /// be written; everything after that point is recorded in the row.
    /// `fired_at` is the evaluation time and becomes the row's `created_at`,
    /// which is what the cooldown clock reads back.
    pub async fn dispatch(
        &self,
        monitor: &Monitor,
        rule: &AlertRule,
        event: CheckOutcome,
        fired_at: DateTime<Utc>,
    ) -> Result<AlertLog, NotificationError> {
        let message = compose_message(monitor, event);
        let mut log = self
            .store
            .write_alert_log(NewAlertLog {
                monitor_id: monitor.id,
                notification_channel_id: rule.notification_channel_id,
                alert_type: event.as_str().to_string(),
                status: AlertLogStatus::Pending.as_str().to_string(),
                message: message.clone(),
                created_at: fired_at,
            })
            .await?;

        let outcome = self.deliver(monitor, rule, event, &message).await;
        let final_status = match outcome {
            Ok(()) => {
                info!(
                    monitor_id = monitor.id,
                    channel_id = rule.notification_channel_id,
                    event = event.as_str(),
                    "Notification delivered."
                );
                AlertLogStatus::Sent
            }
            Err(e) => {
                warn!(
                    monitor_id = monitor.id,
                    channel_id = rule.notification_channel_id,
                    event = event.as_str(),
                    error = %e,
                    "Notification delivery failed."
                );
                AlertLogStatus::Failed
            }
        };

        self.store
            .update_alert_log_status(log.id, final_status)
            .await?;
        log.status = final_status.as_str().to_string();
        Ok(log)
    }

    /// Dispatches a batch of firings concurrently and independently.
    /// Returns how many alert log rows were written.
    pub async fn dispatch_all(
        &self,
        monitor: &Monitor,
        firings: &[(AlertRule, CheckOutcome)],
        fired_at: DateTime<Utc>,
    ) -> usize {
        let results = futures::future::join_all(
            firings
                .iter()
                .map(|(rule, event)| self.dispatch(monitor, rule, *event, fired_at)),
        )
        .await;

        let mut dispatched = 0;
        for result in results {
            match result {
                Ok(_) => dispatched += 1,
                Err(e) => warn!(monitor_id = monitor.id, error = %e, "Dispatch failed."),
            }
        }
        dispatched
    }

    async fn deliver(
        &self,
        monitor: &Monitor,
        rule: &AlertRule,
        event: CheckOutcome,
        message: &str,
    ) -> Result<(), NotificationError> {
        let channel = self.store.get_channel(rule.notification_channel_id).await?;
        let config: ChannelConfig = serde_json::from_value(channel.config.clone())?;
        let sender = self
            .senders
            .get(&channel.channel_type)
            .ok_or_else(|| NotificationError::UnsupportedChannel(channel.channel_type.clone()))?;

        let mut context = HashMap::new();
        context.insert("monitor_name".to_string(), monitor.name.clone());
        context.insert("monitor_url".to_string(), monitor.url.clone());
        context.insert("event".to_string(), event.as_str().to_string());
        context.insert(
            "response_time_ms".to_string(),
            monitor
                .response_time
                .map(|ms| ms.to_string())
                .unwrap_or_default(),
        );

        sender.send(&config, message, &context).await?;
        Ok(())
    }
}

fn compose_message(monitor: &Monitor, event: CheckOutcome) -> String {
    match event {
        CheckOutcome::Down => format!(
            "Monitor '{}' is DOWN: {} ({} consecutive failed checks)",
            monitor.name, monitor.url, monitor.consecutive_failure_count
        ),
        CheckOutcome::Timeout => format!(
            "Monitor '{}' TIMED OUT after {}s: {} ({} consecutive failed checks)",
            monitor.name, monitor.timeout_seconds, monitor.url, monitor.consecutive_failure_count
        ),
        CheckOutcome::Up => match monitor.response_time {
            Some(ms) => format!(
                "Monitor '{}' has RECOVERED: {} (response time {} ms)",
                monitor.name, monitor.url, ms
            ),
            None => format!("Monitor '{}' has RECOVERED: {}", monitor.name, monitor.url),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::InMemoryDataStore;
    use crate::db::models::NotificationChannel;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingSender {
        sent: Mutex<Vec<String>>,
    }

    impl RecordingSender {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl NotificationSender for RecordingSender {
        async fn send(
            &self,
            _config: &ChannelConfig,
            message: &str,
            _context: &HashMap<String, String>,
        ) -> Result<(), SenderError> {
            self.sent.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    struct FailingSender;

    #[async_trait]
    impl NotificationSender for FailingSender {
        async fn send(
            &self,
            _config: &ChannelConfig,
            _message: &str,
            _context: &HashMap<String, String>,
        ) -> Result<(), SenderError> {
            Err(SenderError::SendFailed("connection refused".to_string()))
        }
    }

    fn monitor() -> Monitor {
        Monitor {
            id: 1,
            user_id: 1,
            url: "https://example.com".to_string(),
            name: "example".to_string(),
            interval_minutes: 5,
            is_active: true,
            status: "down".to_string(),
            response_time: Some(512),
            last_checked_at: Some(Utc::now()),
            next_check_at: Utc::now(),
            consecutive_failure_count: 3,
            timeout_seconds: 10,
            expected_status: None,
        }
    }

    fn rule(channel_id: i32) -> AlertRule {
        AlertRule {
            id: channel_id,
            monitor_id: 1,
            notification_channel_id: channel_id,
            alert_on_down: true,
            alert_on_up: true,
            alert_on_timeout: true,
            consecutive_failures_threshold: 1,
            cooldown_minutes: 0,
            is_active: true,
        }
    }

    fn webhook_channel(id: i32) -> NotificationChannel {
        NotificationChannel {
            id,
            user_id: 1,
            name: format!("channel-{id}"),
            channel_type: "webhook".to_string(),
            config: serde_json::json!({
                "type": "webhook",
                "url": "https://hooks.example.com/notify",
                "method": "POST",
                "headers": null,
                "bodyTemplate": null,
            }),
        }
    }

    fn telegram_channel(id: i32) -> NotificationChannel {
        NotificationChannel {
            id,
            user_id: 1,
            name: format!("channel-{id}"),
            channel_type: "telegram".to_string(),
            config: serde_json::json!({
                "type": "telegram",
                "botToken": "token",
                "chatId": "42",
            }),
        }
    }

    #[tokio::test]
    async fn successful_dispatch_marks_log_sent() {
        let store = Arc::new(InMemoryDataStore::new());
        store.insert_channel(webhook_channel(1));

        let sender = Arc::new(RecordingSender::new());
        let dispatcher =
            NotificationDispatcher::new(store.clone()).with_sender("webhook", sender.clone());

        let log = dispatcher
            .dispatch(&monitor(), &rule(1), CheckOutcome::Down, Utc::now())
            .await
            .unwrap();

        assert_eq!(log.status, "sent");
        assert_eq!(log.alert_type, "down");
        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("3 consecutive failed checks"));
    }

    #[tokio::test]
    async fn transport_failure_marks_log_failed() {
        let store = Arc::new(InMemoryDataStore::new());
        store.insert_channel(webhook_channel(1));

        let dispatcher = NotificationDispatcher::new(store.clone())
            .with_sender("webhook", Arc::new(FailingSender));

        let log = dispatcher
            .dispatch(&monitor(), &rule(1), CheckOutcome::Down, Utc::now())
            .await
            .unwrap();

        assert_eq!(log.status, "failed");
        assert_eq!(store.alert_logs().len(), 1);
    }

    #[tokio::test]
    async fn one_failing_channel_does_not_block_the_other() {
        let store = Arc::new(InMemoryDataStore::new());
        store.insert_channel(webhook_channel(1));
        store.insert_channel(telegram_channel(2));

        let recording = Arc::new(RecordingSender::new());
        let dispatcher = NotificationDispatcher::new(store.clone())
            .with_sender("webhook", Arc::new(FailingSender))
            .with_sender("telegram", recording.clone());

        let firings = vec![(rule(1), CheckOutcome::Down), (rule(2), CheckOutcome::Down)];
        let dispatched = dispatcher.dispatch_all(&monitor(), &firings, Utc::now()).await;

        assert_eq!(dispatched, 2);
        assert_eq!(recording.sent.lock().unwrap().len(), 1);

        let logs = store.alert_logs();
        let statuses: Vec<&str> = logs.iter().map(|l| l.status.as_str()).collect();
        assert!(statuses.contains(&"failed"));
        assert!(statuses.contains(&"sent"));
    }

    #[tokio::test]
    async fn missing_channel_marks_log_failed() {
        let store = Arc::new(InMemoryDataStore::new());
        let dispatcher = NotificationDispatcher::new(store.clone());

        let log = dispatcher
            .dispatch(&monitor(), &rule(9), CheckOutcome::Up, Utc::now())
            .await
            .unwrap();
        assert_eq!(log.status, "failed");
    }
}
