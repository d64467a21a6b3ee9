//! In-memory implementation of the data store gateway. Used by the test
//! suite and by single-process deployments that have no Postgres; it honors
//! the same conditional-update contracts as the SQL implementation.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::enums::{AlertLogStatus, CheckOutcome};
use super::models::{
    AlertLog, AlertRule, CheckTransition, Monitor, MonitoringHistory, NewAlertLog,
    NotificationChannel,
};
use super::store::{DataStore, StoreError};

#[derive(Default)]
struct MemoryState {
    monitors: HashMap<i32, Monitor>,
    history: Vec<MonitoringHistory>,
    rules: Vec<AlertRule>,
    channels: HashMap<i32, NotificationChannel>,
    alert_logs: Vec<AlertLog>,
    next_history_id: i32,
    next_log_id: i32,
}

#[derive(Default)]
pub struct InMemoryDataStore {
    state: Mutex<MemoryState>,
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_monitor(&self, monitor: Monitor) {
        let mut state = self.state.lock().unwrap();
        state.monitors.insert(monitor.id, monitor);
    }

    pub fn insert_rule(&self, rule: AlertRule) {
        let mut state = self.state.lock().unwrap();
        state.rules.push(rule);
    }

    pub fn insert_channel(&self, channel: NotificationChannel) {
        let mut state = self.state.lock().unwrap();
        state.channels.insert(channel.id, channel);
    }

    pub fn monitor(&self, monitor_id: i32) -> Option<Monitor> {
        self.state.lock().unwrap().monitors.get(&monitor_id).cloned()
    }

    pub fn history(&self) -> Vec<MonitoringHistory> {
        self.state.lock().unwrap().history.clone()
    }

    pub fn alert_logs(&self) -> Vec<AlertLog> {
        self.state.lock().unwrap().alert_logs.clone()
    }
}

#[async_trait]
impl DataStore for InMemoryDataStore {
    async fn get_due_monitors(&self, now: DateTime<Utc>) -> Result<Vec<Monitor>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut due: Vec<Monitor> = state
            .monitors
            .values()
            .filter(|m| m.is_active && m.next_check_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|m| m.next_check_at);
        Ok(due)
    }

    async fn claim_next_check(
        &self,
        monitor_id: i32,
        expected_next_check_at: DateTime<Utc>,
        new_next_check_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        match state.monitors.get_mut(&monitor_id) {
            Some(monitor)
                if monitor.is_active && monitor.next_check_at == expected_next_check_at =>
            {
                monitor.next_check_at = new_next_check_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn write_check_result(
        &self,
        monitor_id: i32,
        outcome: CheckOutcome,
        response_time_ms: Option<i32>,
        scheduled_at: DateTime<Utc>,
        checked_at: DateTime<Utc>,
    ) -> Result<CheckTransition, StoreError> {
        let mut state = self.state.lock().unwrap();

        let monitor = state
            .monitors
            .get_mut(&monitor_id)
            .ok_or(StoreError::MonitorNotFound(monitor_id))?;

        // Redelivery of a check whose slot was already recorded: write
        // nothing, report the row as it stands.
        if monitor.last_checked_at.is_some_and(|t| t >= scheduled_at) {
            let snapshot = monitor.clone();
            return Ok(CheckTransition {
                previous_status: snapshot.status.clone(),
                monitor: snapshot,
                duplicate: true,
            });
        }

        let previous_status = monitor.status.clone();
        monitor.status = outcome.as_str().to_string();
        monitor.response_time = response_time_ms;
        monitor.last_checked_at = Some(checked_at);
        monitor.consecutive_failure_count = if outcome.is_failure() {
            monitor.consecutive_failure_count + 1
        } else {
            0
        };
        let snapshot = monitor.clone();

        state.next_history_id += 1;
        let history_id = state.next_history_id;
        state.history.push(MonitoringHistory {
            id: history_id,
            monitor_id,
            checked_at,
            status: outcome.as_str().to_string(),
            response_time: response_time_ms,
        });

        Ok(CheckTransition {
            previous_status,
            monitor: snapshot,
            duplicate: false,
        })
    }

    async fn get_active_rules(&self, monitor_id: i32) -> Result<Vec<AlertRule>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .rules
            .iter()
            .filter(|r| r.monitor_id == monitor_id && r.is_active)
            .cloned()
            .collect())
    }

    async fn get_last_fired(
        &self,
        monitor_id: i32,
        channel_id: i32,
        alert_type: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .alert_logs
            .iter()
            .filter(|l| {
                l.monitor_id == monitor_id
                    && l.notification_channel_id == channel_id
                    && l.alert_type == alert_type
            })
            .map(|l| l.created_at)
            .max())
    }

    async fn write_alert_log(&self, entry: NewAlertLog) -> Result<AlertLog, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.next_log_id += 1;
        let log = AlertLog {
            id: state.next_log_id,
            monitor_id: entry.monitor_id,
            notification_channel_id: entry.notification_channel_id,
            alert_type: entry.alert_type,
            status: entry.status,
            message: entry.message,
            created_at: entry.created_at,
        };
        state.alert_logs.push(log.clone());
        Ok(log)
    }

    async fn update_alert_log_status(
        &self,
        log_id: i32,
        status: AlertLogStatus,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let log = state
            .alert_logs
            .iter_mut()
            .find(|l| l.id == log_id)
            .ok_or(StoreError::AlertLogNotFound(log_id))?;
        log.status = status.as_str().to_string();
        Ok(())
    }

    async fn get_channel(&self, channel_id: i32) -> Result<NotificationChannel, StoreError> {
        let state = self.state.lock().unwrap();
        state
            .channels
            .get(&channel_id)
            .cloned()
            .ok_or(StoreError::ChannelNotFound(channel_id))
    }
}
