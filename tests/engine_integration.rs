//! End-to-end flow through the public pieces: a due monitor is claimed and
//! enqueued by the scheduler, probed and persisted by the worker pool, and
//! run through alert evaluation, all against the in-memory store and queue.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};

use uptick::alerting::AlertRuleEngine;
use uptick::db::enums::CheckOutcome;
use uptick::db::memory::InMemoryDataStore;
use uptick::db::models::{AlertRule, Monitor, NotificationChannel};
use uptick::db::DataStore;
use uptick::notifications::models::ChannelConfig;
use uptick::notifications::senders::{NotificationSender, SenderError};
use uptick::notifications::NotificationDispatcher;
use uptick::queue::memory::InMemoryCheckQueue;
use uptick::queue::{CheckPayload, CheckQueue};
use uptick::scheduler::{Scheduler, SchedulerConfig};
use uptick::worker::prober::{CheckProber, CheckReport};
use uptick::worker::{WorkerPool, WorkerPoolConfig};

struct StaticProber(CheckOutcome);

#[async_trait]
impl CheckProber for StaticProber {
    async fn probe(&self, _payload: &CheckPayload) -> CheckReport {
        CheckReport {
            outcome: self.0,
            response_time_ms: Some(120),
        }
    }
}

#[derive(Default)]
struct RecordingSender {
    messages: Mutex<Vec<String>>,
}

#[async_trait]
impl NotificationSender for RecordingSender {
    async fn send(
        &self,
        _config: &ChannelConfig,
        message: &str,
        _context: &HashMap<String, String>,
    ) -> Result<(), SenderError> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

fn due_monitor(id: i32) -> Monitor {
    Monitor {
        id,
        user_id: 1,
        url: "https://example.com/health".to_string(),
        name: "example-health".to_string(),
        interval_minutes: 5,
        is_active: true,
        status: "pending".to_string(),
        response_time: None,
        last_checked_at: None,
        next_check_at: Utc::now() - ChronoDuration::seconds(1),
        consecutive_failure_count: 0,
        timeout_seconds: 10,
        expected_status: None,
    }
}

fn webhook_channel(id: i32) -> NotificationChannel {
    NotificationChannel {
        id,
        user_id: 1,
        name: "ops".to_string(),
        channel_type: "webhook".to_string(),
        config: serde_json::json!({
            "type": "webhook",
            "url": "https://hooks.example.com/uptick",
            "method": "POST",
            "headers": null,
            "bodyTemplate": null,
        }),
    }
}

fn down_rule(monitor_id: i32, channel_id: i32) -> AlertRule {
    AlertRule {
        id: 1,
        monitor_id,
        notification_channel_id: channel_id,
        alert_on_down: true,
        alert_on_up: true,
        alert_on_timeout: true,
        consecutive_failures_threshold: 1,
        cooldown_minutes: 60,
        is_active: true,
    }
}

struct Rig {
    store: Arc<InMemoryDataStore>,
    queue: Arc<InMemoryCheckQueue>,
    scheduler: Scheduler,
    pool: WorkerPool,
    sender: Arc<RecordingSender>,
}

fn rig(outcome: CheckOutcome) -> Rig {
    let store = Arc::new(InMemoryDataStore::new());
    let queue = Arc::new(InMemoryCheckQueue::new());
    let sender = Arc::new(RecordingSender::default());

    let dispatcher = Arc::new(
        NotificationDispatcher::new(store.clone() as Arc<dyn DataStore>)
            .with_sender("webhook", sender.clone()),
    );
    let engine = Arc::new(AlertRuleEngine::new(
        store.clone() as Arc<dyn DataStore>,
        dispatcher,
    ));

    let scheduler = Scheduler::new(store.clone(), queue.clone(), SchedulerConfig::default());
    let pool = WorkerPool::new(
        store.clone(),
        queue.clone(),
        Arc::new(StaticProber(outcome)),
        engine,
        WorkerPoolConfig {
            concurrency: 2,
            batch_size: 10,
            visibility_timeout: Duration::from_secs(30),
            idle_backoff: Duration::from_millis(10),
        },
    );

    Rig {
        store,
        queue,
        scheduler,
        pool,
        sender,
    }
}

#[tokio::test]
async fn healthy_check_flows_from_schedule_to_history_without_alerting() {
    let r = rig(CheckOutcome::Up);
    let before = Utc::now();
    r.store.insert_monitor(due_monitor(1));
    r.store.insert_channel(webhook_channel(1));
    r.store.insert_rule(down_rule(1, 1));

    let stats = r.scheduler.schedule_monitor_checks().await.unwrap();
    assert_eq!(stats.enqueued, 1);
    assert_eq!(r.queue.depth().await.unwrap(), 1);

    r.pool.start().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    r.pool.stop().await;

    let monitor = r.store.monitor(1).unwrap();
    assert_eq!(monitor.status, "up");
    assert_eq!(monitor.response_time, Some(120));
    assert!(monitor.last_checked_at.is_some());
    assert!(monitor.next_check_at >= before + ChronoDuration::minutes(4));

    let history = r.store.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, "up");

    // No transition out of a failure state, so nothing fires.
    assert!(r.store.alert_logs().is_empty());
    assert!(r.sender.messages.lock().unwrap().is_empty());
    assert_eq!(r.queue.depth().await.unwrap(), 0);
}

#[tokio::test]
async fn failed_check_fires_a_down_alert_through_the_full_path() {
    let r = rig(CheckOutcome::Down);
    r.store.insert_monitor(due_monitor(1));
    r.store.insert_channel(webhook_channel(1));
    r.store.insert_rule(down_rule(1, 1));

    assert_eq!(
        r.scheduler.schedule_monitor_checks().await.unwrap().enqueued,
        1
    );

    r.pool.start().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    r.pool.stop().await;

    let monitor = r.store.monitor(1).unwrap();
    assert_eq!(monitor.status, "down");
    assert_eq!(monitor.consecutive_failure_count, 1);

    let logs = r.store.alert_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].alert_type, "down");
    assert_eq!(logs[0].status, "sent");

    let messages = r.sender.messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("example-health"));
}

#[tokio::test]
async fn second_scheduling_pass_does_not_reclaim_before_the_interval() {
    let r = rig(CheckOutcome::Up);
    r.store.insert_monitor(due_monitor(1));

    let first = r.scheduler.schedule_monitor_checks().await.unwrap();
    let second = r.scheduler.schedule_monitor_checks().await.unwrap();

    assert_eq!(first.enqueued, 1);
    assert_eq!(second.scanned, 0);
    assert_eq!(second.enqueued, 0);
    assert_eq!(r.queue.depth().await.unwrap(), 1);
}

#[tokio::test]
async fn stop_drains_in_flight_work_before_returning() {
    let r = rig(CheckOutcome::Up);
    r.store.insert_monitor(due_monitor(1));
    r.store.insert_monitor({
        let mut m = due_monitor(2);
        m.url = "https://example.org/health".to_string();
        m
    });

    r.scheduler.schedule_monitor_checks().await.unwrap();
    r.pool.start().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    r.pool.stop().await;

    // After stop returns, nothing is still in flight and both results landed.
    let status = r.pool.status();
    assert_eq!(status.in_flight, 0);
    assert!(!status.is_running);
    assert_eq!(r.store.history().len(), 2);
    assert_eq!(r.queue.depth().await.unwrap(), 0);
}
