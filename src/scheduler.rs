use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::models::Monitor;
use crate::db::store::{DataStore, StoreError};
use crate::queue::{
    CheckConfig, CheckMessage, CheckPayload, CheckQueue, MonitorData, MESSAGE_TYPE_MONITOR_CHECK,
};

/// Aggregate result of one scheduling pass. Per-monitor failures are counted
/// here instead of aborting the batch.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SchedulingStats {
    pub scanned: u64,
    pub enqueued: u64,
    pub skipped: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerHealth {
    pub healthy: bool,
    pub queue_depth: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Retry budget stamped into each check message.
    pub max_retries: u32,
    pub user_agent: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            user_agent: concat!("uptick-engine/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Scans due monitors and enqueues one check message per claimed monitor.
/// Stateless between runs; safe to invoke concurrently with itself because
/// correctness rests on the store's conditional claim, not on mutual
/// exclusion of invocations.
pub struct Scheduler {
    store: Arc<dyn DataStore>,
    queue: Arc<dyn CheckQueue>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn DataStore>,
        queue: Arc<dyn CheckQueue>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            queue,
            config,
        }
    }

    /// One scheduling pass. Errs only when the due-monitor scan itself
    /// fails; everything after that is tallied in the stats.
    pub async fn schedule_monitor_checks(&self) -> Result<SchedulingStats, StoreError> {
        let now = Utc::now();
        let due = self.store.get_due_monitors(now).await?;

        let mut stats = SchedulingStats {
            scanned: due.len() as u64,
            ..Default::default()
        };

        for monitor in due {
            let new_next_check_at = now + Duration::minutes(monitor.interval_minutes as i64);
            let claimed = match self
                .store
                .claim_next_check(monitor.id, monitor.next_check_at, new_next_check_at)
                .await
            {
                Ok(claimed) => claimed,
                Err(e) => {
                    warn!(monitor_id = monitor.id, error = %e, "Failed to claim monitor.");
                    stats.errors += 1;
                    continue;
                }
            };
            if !claimed {
                // Another run already claimed this cycle. Expected, not an error.
                debug!(monitor_id = monitor.id, "Monitor already claimed; skipping.");
                stats.skipped += 1;
                continue;
            }

            let message = self.build_check_message(&monitor, now);
            match self.queue.enqueue(&message).await {
                Ok(()) => stats.enqueued += 1,
                Err(e) => {
                    // The claim stands: this cycle is simply missed and the
                    // monitor comes due again after its interval.
                    warn!(
                        monitor_id = monitor.id,
                        error = %e,
                        "Enqueue failed after claim; check cycle skipped."
                    );
                    stats.errors += 1;
                }
            }
        }

        info!(
            scanned = stats.scanned,
            enqueued = stats.enqueued,
            skipped = stats.skipped,
            errors = stats.errors,
            "Scheduling pass complete."
        );
        Ok(stats)
    }

    /// Read-only liveness probe: reports whether the queue is reachable.
    pub async fn health_check(&self) -> SchedulerHealth {
        match self.queue.depth().await {
            Ok(depth) => SchedulerHealth {
                healthy: true,
                queue_depth: Some(depth),
            },
            Err(e) => {
                warn!(error = %e, "Queue unreachable during health check.");
                SchedulerHealth {
                    healthy: false,
                    queue_depth: None,
                }
            }
        }
    }

    fn build_check_message(&self, monitor: &Monitor, now: DateTime<Utc>) -> CheckMessage {
        CheckMessage {
            message_id: Uuid::new_v4(),
            message_type: MESSAGE_TYPE_MONITOR_CHECK.to_string(),
            timestamp: now,
            retry_count: 0,
            max_retries: self.config.max_retries,
            payload: CheckPayload {
                monitor_id: monitor.id,
                user_id: monitor.user_id,
                monitor_data: MonitorData {
                    url: monitor.url.clone(),
                    expected_status: monitor.expected_status.map(|s| s as u16),
                    interval_minutes: monitor.interval_minutes,
                    timeout_seconds: monitor.timeout_seconds,
                },
                check_config: CheckConfig {
                    priority: "normal".to_string(),
                    scheduled_at: now,
                    expected_duration: monitor.timeout_seconds as i64 * 1000,
                    user_agent: self.config.user_agent.clone(),
                },
            },
        }
    }
}

/// In-process flavor of the external cron trigger: runs scheduling passes on
/// a fixed cadence until the shutdown signal flips.
pub async fn run_scheduler_loop(
    scheduler: Arc<Scheduler>,
    period: StdDuration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    info!(period_secs = period.as_secs(), "Scheduler loop started.");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = scheduler.schedule_monitor_checks().await {
                    error!(error = %e, "Scheduling pass failed.");
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("Scheduler loop stopping.");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::InMemoryDataStore;
    use crate::queue::memory::InMemoryCheckQueue;
    use crate::queue::QueueError;
    use async_trait::async_trait;

    fn monitor(id: i32, next_check_at: DateTime<Utc>, active: bool) -> Monitor {
        Monitor {
            id,
            user_id: 1,
            url: format!("https://example.com/{id}"),
            name: format!("monitor-{id}"),
            interval_minutes: 5,
            is_active: active,
            status: "pending".to_string(),
            response_time: None,
            last_checked_at: None,
            next_check_at,
            consecutive_failure_count: 0,
            timeout_seconds: 10,
            expected_status: None,
        }
    }

    fn scheduler(
        store: Arc<InMemoryDataStore>,
        queue: Arc<InMemoryCheckQueue>,
    ) -> Scheduler {
        Scheduler::new(store, queue, SchedulerConfig::default())
    }

    #[tokio::test]
    async fn enqueues_one_message_per_due_monitor() {
        let store = Arc::new(InMemoryDataStore::new());
        let queue = Arc::new(InMemoryCheckQueue::new());
        let now = Utc::now();

        store.insert_monitor(monitor(1, now - Duration::seconds(1), true));
        store.insert_monitor(monitor(2, now + Duration::minutes(3), true)); // not due
        store.insert_monitor(monitor(3, now - Duration::minutes(1), false)); // disabled

        let stats = scheduler(store.clone(), queue.clone())
            .schedule_monitor_checks()
            .await
            .unwrap();

        assert_eq!(stats.scanned, 1);
        assert_eq!(stats.enqueued, 1);
        assert_eq!(stats.errors, 0);
        assert_eq!(queue.depth().await.unwrap(), 1);

        // next_check_at advanced by the interval.
        let m = store.monitor(1).unwrap();
        assert!(m.next_check_at > now + Duration::minutes(4));
    }

    #[tokio::test]
    async fn concurrent_runs_enqueue_at_most_once_per_monitor() {
        let store = Arc::new(InMemoryDataStore::new());
        let queue = Arc::new(InMemoryCheckQueue::new());
        let now = Utc::now();
        store.insert_monitor(monitor(1, now - Duration::seconds(1), true));

        let a = Arc::new(scheduler(store.clone(), queue.clone()));
        let b = Arc::new(scheduler(store.clone(), queue.clone()));

        let (ra, rb) = tokio::join!(a.schedule_monitor_checks(), b.schedule_monitor_checks());
        let (sa, sb) = (ra.unwrap(), rb.unwrap());

        assert_eq!(sa.enqueued + sb.enqueued, 1);
        assert_eq!(queue.depth().await.unwrap(), 1);
    }

    struct UnreachableQueue;

    #[async_trait]
    impl CheckQueue for UnreachableQueue {
        async fn enqueue(&self, _message: &CheckMessage) -> Result<(), QueueError> {
            Err(QueueError::Unreachable("broker down".to_string()))
        }
        async fn receive(
            &self,
            _max_messages: usize,
            _visibility: StdDuration,
        ) -> Result<Vec<crate::queue::Delivery>, QueueError> {
            Err(QueueError::Unreachable("broker down".to_string()))
        }
        async fn acknowledge(&self, _delivery: &crate::queue::Delivery) -> Result<(), QueueError> {
            Err(QueueError::Unreachable("broker down".to_string()))
        }
        async fn dead_letter(
            &self,
            _delivery: &crate::queue::Delivery,
            _reason: &str,
        ) -> Result<(), QueueError> {
            Err(QueueError::Unreachable("broker down".to_string()))
        }
        async fn depth(&self) -> Result<usize, QueueError> {
            Err(QueueError::Unreachable("broker down".to_string()))
        }
    }

    #[tokio::test]
    async fn enqueue_failure_keeps_claim_and_counts_error() {
        let store = Arc::new(InMemoryDataStore::new());
        let now = Utc::now();
        store.insert_monitor(monitor(1, now - Duration::seconds(1), true));

        let s = Scheduler::new(
            store.clone(),
            Arc::new(UnreachableQueue),
            SchedulerConfig::default(),
        );
        let stats = s.schedule_monitor_checks().await.unwrap();

        assert_eq!(stats.errors, 1);
        assert_eq!(stats.enqueued, 0);
        // The claim is not rolled back; the monitor waits for its next slot.
        assert!(store.monitor(1).unwrap().next_check_at > now);
    }

    #[tokio::test]
    async fn health_check_reports_queue_reachability() {
        let store = Arc::new(InMemoryDataStore::new());
        let healthy = scheduler(store.clone(), Arc::new(InMemoryCheckQueue::new()))
            .health_check()
            .await;
        assert!(healthy.healthy);
        assert_eq!(healthy.queue_depth, Some(0));

        let unhealthy = Scheduler::new(store, Arc::new(UnreachableQueue), SchedulerConfig::default())
            .health_check()
            .await;
        assert!(!unhealthy.healthy);
        assert_eq!(unhealthy.queue_depth, None);
    }
}
