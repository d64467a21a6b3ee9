use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::db::enums::AlertLogStatus;
use crate::db::models::{AlertLog, AlertRule, NewAlertLog, NotificationChannel};
use crate::db::store::StoreError;

pub async fn get_active_rules(
    pool: &PgPool,
    monitor_id: i32,
) -> Result<Vec<AlertRule>, StoreError> {
    let rules = sqlx::query_as::<_, AlertRule>(
        "SELECT id, monitor_id, notification_channel_id, alert_on_down, alert_on_up, \
                alert_on_timeout, consecutive_failures_threshold, cooldown_minutes, is_active \
         FROM alert_rules \
         WHERE monitor_id = $1 AND is_active = TRUE",
    )
    .bind(monitor_id)
    .fetch_all(pool)
    .await?;
    Ok(rules)
}

/// The cooldown clock: the newest alert log row for this
/// (monitor, channel, event type), whatever its delivery status. A failed
/// transport attempt still counts as a firing; retries are an external
/// concern and must not bypass the cooldown.
pub async fn get_last_fired(
    pool: &PgPool,
    monitor_id: i32,
    channel_id: i32,
    alert_type: &str,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    let last: Option<DateTime<Utc>> = sqlx::query_scalar(
        "SELECT MAX(created_at) FROM alert_logs \
         WHERE monitor_id = $1 AND notification_channel_id = $2 AND alert_type = $3",
    )
    .bind(monitor_id)
    .bind(channel_id)
    .bind(alert_type)
    .fetch_one(pool)
    .await?;
    Ok(last)
}

pub async fn write_alert_log(pool: &PgPool, entry: NewAlertLog) -> Result<AlertLog, StoreError> {
    let log = sqlx::query_as::<_, AlertLog>(
        "INSERT INTO alert_logs (monitor_id, notification_channel_id, alert_type, status, message, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING id, monitor_id, notification_channel_id, alert_type, status, message, created_at",
    )
    .bind(entry.monitor_id)
    .bind(entry.notification_channel_id)
    .bind(entry.alert_type)
    .bind(entry.status)
    .bind(entry.message)
    .bind(entry.created_at)
    .fetch_one(pool)
    .await?;
    Ok(log)
}

pub async fn update_alert_log_status(
    pool: &PgPool,
    log_id: i32,
    status: AlertLogStatus,
) -> Result<(), StoreError> {
    let result = sqlx::query("UPDATE alert_logs SET status = $2 WHERE id = $1")
        .bind(log_id)
        .bind(status.as_str())
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::AlertLogNotFound(log_id));
    }
    Ok(())
}

pub async fn get_channel(
    pool: &PgPool,
    channel_id: i32,
) -> Result<NotificationChannel, StoreError> {
    sqlx::query_as::<_, NotificationChannel>(
        "SELECT id, user_id, name, channel_type, config \
         FROM notification_channels WHERE id = $1",
    )
    .bind(channel_id)
    .fetch_optional(pool)
    .await?
    .ok_or(StoreError::ChannelNotFound(channel_id))
}
