use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A user-configured HTTP endpoint checked on a fixed interval.
/// Corresponds to the `monitors` table.
///
/// `next_check_at` is only advanced by the scheduler's conditional claim;
/// `status`, `response_time`, `last_checked_at` and
/// `consecutive_failure_count` are only written by the worker pool after a
/// completed check. The two field sets are disjoint, so the scheduler and
/// workers never race on the same columns.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Monitor {
    pub id: i32,
    pub user_id: i32,
    pub url: String,
    pub name: String,
    pub interval_minutes: i32,
    pub is_active: bool,
    pub status: String, // "up", "down", "pending", "timeout", "unknown"
    pub response_time: Option<i32>, // milliseconds, from the last completed check
    pub last_checked_at: Option<DateTime<Utc>>,
    pub next_check_at: DateTime<Utc>,
    /// Running streak of non-up outcomes, reset to 0 by any `up` result.
    /// Persisted here so alert evaluation survives restarts and message
    /// reordering without re-deriving it from history.
    pub consecutive_failure_count: i32,
    pub timeout_seconds: i32,
    /// When set, only this exact response code counts as up.
    pub expected_status: Option<i32>,
}

/// Append-only record of one completed check attempt.
/// Corresponds to the `monitoring_history` table. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MonitoringHistory {
    pub id: i32,
    pub monitor_id: i32,
    pub checked_at: DateTime<Utc>,
    pub status: String,
    pub response_time: Option<i32>,
}

/// Per-channel alerting configuration for a monitor.
/// Corresponds to the `alert_rules` table; unique per
/// (monitor_id, notification_channel_id). Mutated by the surrounding
/// application, consumed read-only here.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AlertRule {
    pub id: i32,
    pub monitor_id: i32,
    pub notification_channel_id: i32,
    pub alert_on_down: bool,
    pub alert_on_up: bool,
    pub alert_on_timeout: bool,
    pub consecutive_failures_threshold: i32,
    pub cooldown_minutes: i32,
    pub is_active: bool,
}

/// Immutable record of one attempted notification.
/// Corresponds to the `alert_logs` table. The most recent row per
/// (monitor, channel, alert_type) doubles as the cooldown clock.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AlertLog {
    pub id: i32,
    pub monitor_id: i32,
    pub notification_channel_id: i32,
    pub alert_type: String, // "down", "up", "timeout"
    pub status: String,     // "pending", "queued", "sent", "failed"
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Fields of an alert log entry before the row exists.
#[derive(Debug, Clone)]
pub struct NewAlertLog {
    pub monitor_id: i32,
    pub notification_channel_id: i32,
    pub alert_type: String,
    pub status: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// A user-configured delivery target for notifications.
/// Corresponds to the `notification_channels` table. `config` is the raw
/// JSON for the channel type (see `notifications::models::ChannelConfig`);
/// encryption at rest, if any, is the surrounding application's concern.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NotificationChannel {
    pub id: i32,
    pub user_id: i32,
    pub name: String,
    pub channel_type: String, // "webhook" or "telegram"
    pub config: serde_json::Value,
}

/// Outcome of persisting one check result: the monitor row after the update
/// plus the status it held before, which the alert engine needs to detect
/// recovery transitions.
#[derive(Debug, Clone)]
pub struct CheckTransition {
    pub previous_status: String,
    pub monitor: Monitor,
    /// The delivery was a redelivery of an already-recorded scheduled check;
    /// nothing was written and `monitor` is the untouched current row.
    pub duplicate: bool,
}
