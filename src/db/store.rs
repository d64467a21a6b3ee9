use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::enums::{AlertLogStatus, CheckOutcome};
use super::models::{AlertLog, AlertRule, CheckTransition, Monitor, NewAlertLog, NotificationChannel};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Monitor not found: {0}")]
    MonitorNotFound(i32),
    #[error("Notification channel not found: {0}")]
    ChannelNotFound(i32),
    #[error("Alert log not found: {0}")]
    AlertLogNotFound(i32),
}

/// Narrow gateway to the persistent store. The scheduler, worker pool and
/// alert engine only ever touch the database through this contract, so any
/// backend that honors the conditional-update semantics can stand in
/// (Postgres in production, in-memory for tests and single-node use).
#[async_trait]
pub trait DataStore: Send + Sync {
    /// All active monitors whose `next_check_at` has elapsed.
    async fn get_due_monitors(&self, now: DateTime<Utc>) -> Result<Vec<Monitor>, StoreError>;

    /// Atomically advances `next_check_at`, conditioned on the value the
    /// caller previously read. Returns `false` when the row changed in the
    /// meantime, i.e. another scheduler run already claimed this cycle.
    async fn claim_next_check(
        &self,
        monitor_id: i32,
        expected_next_check_at: DateTime<Utc>,
        new_next_check_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Appends one history row and updates the monitor's status fields in a
    /// single logical update. The consecutive-failure counter is maintained
    /// here as a read-modify-write on the row itself: reset on `up`,
    /// incremented on `down`/`timeout`. Serialized per monitor so reordered
    /// or duplicated deliveries cannot produce a lost update.
    ///
    /// `scheduled_at` is the check's slot from the queue message. A delivery
    /// whose slot is not newer than `last_checked_at` is a redelivery of a
    /// check that was already recorded: it writes nothing and comes back
    /// marked duplicate, so at-least-once delivery cannot advance the
    /// failure streak faster than real checks.
    async fn write_check_result(
        &self,
        monitor_id: i32,
        outcome: CheckOutcome,
        response_time_ms: Option<i32>,
        scheduled_at: DateTime<Utc>,
        checked_at: DateTime<Utc>,
    ) -> Result<CheckTransition, StoreError>;

    /// Active alert rules configured for a monitor.
    async fn get_active_rules(&self, monitor_id: i32) -> Result<Vec<AlertRule>, StoreError>;

    /// When a notification for this (monitor, channel, event type) last
    /// fired, from the alert log. `None` if it never did.
    async fn get_last_fired(
        &self,
        monitor_id: i32,
        channel_id: i32,
        alert_type: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    async fn write_alert_log(&self, entry: NewAlertLog) -> Result<AlertLog, StoreError>;

    async fn update_alert_log_status(
        &self,
        log_id: i32,
        status: AlertLogStatus,
    ) -> Result<(), StoreError>;

    async fn get_channel(&self, channel_id: i32) -> Result<NotificationChannel, StoreError>;
}
