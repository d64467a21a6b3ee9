pub mod prober;

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::alerting::AlertRuleEngine;
use crate::db::store::{DataStore, StoreError};
use crate::queue::{CheckQueue, Delivery, MESSAGE_TYPE_MONITOR_CHECK};
use self::prober::CheckProber;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Unsupported message type: {0}")]
    UnsupportedMessageType(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Upper bound on concurrent probes.
    pub concurrency: usize,
    /// Messages pulled per receive call.
    pub batch_size: usize,
    /// How long a received message stays invisible before redelivery.
    pub visibility_timeout: Duration,
    /// Pause after an empty receive or a queue error.
    pub idle_backoff: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            batch_size: 10,
            visibility_timeout: Duration::from_secs(60),
            idle_backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub is_running: bool,
    pub in_flight: usize,
    pub processed: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerHealth {
    pub healthy: bool,
    pub stats: WorkerStatus,
}

struct WorkerContext {
    store: Arc<dyn DataStore>,
    queue: Arc<dyn CheckQueue>,
    prober: Arc<dyn CheckProber>,
    engine: Arc<AlertRuleEngine>,
    is_running: AtomicBool,
    in_flight: AtomicUsize,
    processed: AtomicU64,
    errors: AtomicU64,
}

/// Bounded pool of queue consumers with an explicit lifecycle
/// (`new` / `start` / `stop` / `status`), owned by whichever process embeds
/// it. A supervisor task pulls deliveries and hands each one to its own
/// spawned task, gated by a semaphore, so one slow probe never starves the
/// rest. `stop` drains: no new receives, in-flight checks run to completion.
pub struct WorkerPool {
    ctx: Arc<WorkerContext>,
    config: WorkerPoolConfig,
    shutdown_tx: watch::Sender<bool>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(
        store: Arc<dyn DataStore>,
        queue: Arc<dyn CheckQueue>,
        prober: Arc<dyn CheckProber>,
        engine: Arc<AlertRuleEngine>,
        config: WorkerPoolConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            ctx: Arc::new(WorkerContext {
                store,
                queue,
                prober,
                engine,
                is_running: AtomicBool::new(false),
                in_flight: AtomicUsize::new(0),
                processed: AtomicU64::new(0),
                errors: AtomicU64::new(0),
            }),
            config,
            shutdown_tx,
            supervisor: Mutex::new(None),
        }
    }

    pub async fn start(&self) {
        let mut supervisor = self.supervisor.lock().await;
        if supervisor.is_some() {
            warn!("Worker pool already running; start ignored.");
            return;
        }
        let _ = self.shutdown_tx.send(false);
        self.ctx.is_running.store(true, Ordering::SeqCst);
        let handle = tokio::spawn(run_supervisor(
            self.ctx.clone(),
            self.config.clone(),
            self.shutdown_tx.subscribe(),
        ));
        *supervisor = Some(handle);
    }

    /// Signals the supervisor to stop pulling and waits for in-flight
    /// checks to finish.
    pub async fn stop(&self) {
        let handle = {
            let mut supervisor = self.supervisor.lock().await;
            supervisor.take()
        };
        let Some(handle) = handle else {
            return;
        };
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = handle.await {
            error!(error = %e, "Worker supervisor task panicked.");
        }
    }

    pub fn status(&self) -> WorkerStatus {
        WorkerStatus {
            is_running: self.ctx.is_running.load(Ordering::SeqCst),
            in_flight: self.ctx.in_flight.load(Ordering::SeqCst),
            processed: self.ctx.processed.load(Ordering::SeqCst),
            errors: self.ctx.errors.load(Ordering::SeqCst),
        }
    }

    pub fn health_check(&self) -> WorkerHealth {
        let stats = self.status();
        WorkerHealth {
            healthy: stats.is_running,
            stats,
        }
    }
}

async fn run_supervisor(
    ctx: Arc<WorkerContext>,
    config: WorkerPoolConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let semaphore = Arc::new(Semaphore::new(config.concurrency));
    info!(concurrency = config.concurrency, "Worker pool started.");

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
            received = ctx.queue.receive(config.batch_size, config.visibility_timeout) => {
                match received {
                    Ok(deliveries) if deliveries.is_empty() => {
                        tokio::time::sleep(config.idle_backoff).await;
                    }
                    Ok(deliveries) => {
                        for delivery in deliveries {
                            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                                return;
                            };
                            let ctx = ctx.clone();
                            tokio::spawn(async move {
                                let _permit = permit;
                                process_delivery(ctx, delivery).await;
                            });
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Queue receive failed; backing off.");
                        tokio::time::sleep(config.idle_backoff).await;
                    }
                }
            }
        }
    }

    // Graceful drain: every permit back means every spawned check finished.
    let _ = semaphore.acquire_many(config.concurrency as u32).await;
    ctx.is_running.store(false, Ordering::SeqCst);
    info!("Worker pool drained and stopped.");
}

async fn process_delivery(ctx: Arc<WorkerContext>, delivery: Delivery) {
    ctx.in_flight.fetch_add(1, Ordering::SeqCst);

    match handle_check(&ctx, &delivery).await {
        Ok(fired) => {
            if fired > 0 {
                info!(
                    monitor_id = delivery.message.payload.monitor_id,
                    fired, "Check dispatched notifications."
                );
            }
            if let Err(e) = ctx.queue.acknowledge(&delivery).await {
                // The result is persisted; a redelivery is idempotent.
                warn!(
                    message_id = %delivery.message.message_id,
                    error = %e,
                    "Acknowledge failed after successful processing."
                );
            }
            ctx.processed.fetch_add(1, Ordering::SeqCst);
        }
        Err(e) => {
            ctx.errors.fetch_add(1, Ordering::SeqCst);
            if delivery.receive_count > delivery.message.max_retries {
                error!(
                    message_id = %delivery.message.message_id,
                    monitor_id = delivery.message.payload.monitor_id,
                    receive_count = delivery.receive_count,
                    error = %e,
                    "Retries exhausted; dead-lettering check message."
                );
                if let Err(dlq_err) = ctx.queue.dead_letter(&delivery, &e.to_string()).await {
                    error!(
                        message_id = %delivery.message.message_id,
                        error = %dlq_err,
                        "Failed to dead-letter message."
                    );
                }
            } else {
                // Leave unacknowledged; the visibility timeout redelivers.
                warn!(
                    message_id = %delivery.message.message_id,
                    monitor_id = delivery.message.payload.monitor_id,
                    receive_count = delivery.receive_count,
                    error = %e,
                    "Check processing failed; leaving message for redelivery."
                );
            }
        }
    }

    ctx.in_flight.fetch_sub(1, Ordering::SeqCst);
}

/// One delivery end to end: probe, persist, evaluate alerts. A down or
/// timed-out probe is a valid result and flows through the same path; only
/// infrastructure failures surface as errors here.
async fn handle_check(ctx: &WorkerContext, delivery: &Delivery) -> Result<usize, WorkerError> {
    let message = &delivery.message;
    if message.message_type != MESSAGE_TYPE_MONITOR_CHECK {
        return Err(WorkerError::UnsupportedMessageType(
            message.message_type.clone(),
        ));
    }

    let report = ctx.prober.probe(&message.payload).await;
    let now = Utc::now();
    let transition = ctx
        .store
        .write_check_result(
            message.payload.monitor_id,
            report.outcome,
            report.response_time_ms,
            message.payload.check_config.scheduled_at,
            now,
        )
        .await?;

    Ok(ctx.engine.evaluate(&transition, report.outcome, now).await)
}
