pub mod alert_service;
pub mod monitor_service;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::enums::{AlertLogStatus, CheckOutcome};
use super::models::{AlertLog, AlertRule, CheckTransition, Monitor, NewAlertLog, NotificationChannel};
use super::store::{DataStore, StoreError};

/// PostgreSQL-backed implementation of the data store gateway.
#[derive(Clone)]
pub struct PgDataStore {
    pool: Arc<PgPool>,
}

impl PgDataStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DataStore for PgDataStore {
    async fn get_due_monitors(&self, now: DateTime<Utc>) -> Result<Vec<Monitor>, StoreError> {
        monitor_service::get_due_monitors(&self.pool, now).await
    }

    async fn claim_next_check(
        &self,
        monitor_id: i32,
        expected_next_check_at: DateTime<Utc>,
        new_next_check_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        monitor_service::claim_next_check(
            &self.pool,
            monitor_id,
            expected_next_check_at,
            new_next_check_at,
        )
        .await
    }

    async fn write_check_result(
        &self,
        monitor_id: i32,
        outcome: CheckOutcome,
        response_time_ms: Option<i32>,
        scheduled_at: DateTime<Utc>,
        checked_at: DateTime<Utc>,
    ) -> Result<CheckTransition, StoreError> {
        monitor_service::write_check_result(
            &self.pool,
            monitor_id,
            outcome,
            response_time_ms,
            scheduled_at,
            checked_at,
        )
        .await
    }

    async fn get_active_rules(&self, monitor_id: i32) -> Result<Vec<AlertRule>, StoreError> {
        alert_service::get_active_rules(&self.pool, monitor_id).await
    }

    async fn get_last_fired(
        &self,
        monitor_id: i32,
        channel_id: i32,
        alert_type: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        alert_service::get_last_fired(&self.pool, monitor_id, channel_id, alert_type).await
    }

    async fn write_alert_log(&self, entry: NewAlertLog) -> Result<AlertLog, StoreError> {
        alert_service::write_alert_log(&self.pool, entry).await
    }

    async fn update_alert_log_status(
        &self,
        log_id: i32,
        status: AlertLogStatus,
    ) -> Result<(), StoreError> {
        alert_service::update_alert_log_status(&self.pool, log_id, status).await
    }

    async fn get_channel(&self, channel_id: i32) -> Result<NotificationChannel, StoreError> {
        alert_service::get_channel(&self.pool, channel_id).await
    }
}
