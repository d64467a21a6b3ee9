use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::db::enums::CheckOutcome;
use crate::db::models::{CheckTransition, Monitor};
use crate::db::store::StoreError;

const MONITOR_COLUMNS: &str = "id, user_id, url, name, interval_minutes, is_active, status, \
     response_time, last_checked_at, next_check_at, consecutive_failure_count, \
     timeout_seconds, expected_status";

pub async fn get_due_monitors(
    pool: &PgPool,
    now: DateTime<Utc>,
) -> Result<Vec<Monitor>, StoreError> {
    let monitors = sqlx::query_as::<_, Monitor>(&format!(
        "SELECT {MONITOR_COLUMNS} FROM monitors \
         WHERE is_active = TRUE AND next_check_at <= $1 \
         ORDER BY next_check_at ASC"
    ))
    .bind(now)
    .fetch_all(pool)
    .await?;
    Ok(monitors)
}

/// Optimistic claim of a monitor's next check slot. The `next_check_at`
/// equality condition makes overlapping scheduler runs lose cleanly instead
/// of double-enqueuing.
pub async fn claim_next_check(
    pool: &PgPool,
    monitor_id: i32,
    expected_next_check_at: DateTime<Utc>,
    new_next_check_at: DateTime<Utc>,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "UPDATE monitors SET next_check_at = $3 \
         WHERE id = $1 AND next_check_at = $2 AND is_active = TRUE",
    )
    .bind(monitor_id)
    .bind(expected_next_check_at)
    .bind(new_next_check_at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Persists one completed check: a history row plus the monitor-row update,
/// in one transaction. `FOR UPDATE` on the monitor row serializes the
/// read-modify-write of the failure counter per monitor. A redelivery of an
/// already-recorded scheduled check (slot not newer than `last_checked_at`)
/// writes nothing, so the counter only moves once per real check.
pub async fn write_check_result(
    pool: &PgPool,
    monitor_id: i32,
    outcome: CheckOutcome,
    response_time_ms: Option<i32>,
    scheduled_at: DateTime<Utc>,
    checked_at: DateTime<Utc>,
) -> Result<CheckTransition, StoreError> {
    let mut tx = pool.begin().await?;

    let current = sqlx::query_as::<_, Monitor>(&format!(
        "SELECT {MONITOR_COLUMNS} FROM monitors WHERE id = $1 FOR UPDATE"
    ))
    .bind(monitor_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(StoreError::MonitorNotFound(monitor_id))?;

    if current.last_checked_at.is_some_and(|t| t >= scheduled_at) {
        tx.rollback().await?;
        return Ok(CheckTransition {
            previous_status: current.status.clone(),
            monitor: current,
            duplicate: true,
        });
    }
    let previous_status = current.status;

    let monitor = sqlx::query_as::<_, Monitor>(&format!(
        "UPDATE monitors SET \
             status = $2, \
             response_time = $3, \
             last_checked_at = $4, \
             consecutive_failure_count = CASE \
                 WHEN $2 = 'up' THEN 0 \
                 ELSE consecutive_failure_count + 1 \
             END \
         WHERE id = $1 \
         RETURNING {MONITOR_COLUMNS}"
    ))
    .bind(monitor_id)
    .bind(outcome.as_str())
    .bind(response_time_ms)
    .bind(checked_at)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO monitoring_history (monitor_id, checked_at, status, response_time) \
         VALUES ($1, $2, $3, $4)",
    )
    .bind(monitor_id)
    .bind(checked_at)
    .bind(outcome.as_str())
    .bind(response_time_ms)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(CheckTransition {
        previous_status,
        monitor,
        duplicate: false,
    })
}
