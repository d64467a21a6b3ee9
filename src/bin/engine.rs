use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use uptick::alerting::AlertRuleEngine;
use uptick::config::EngineConfig;
use uptick::db::services::PgDataStore;
use uptick::db::DataStore;
use uptick::notifications::NotificationDispatcher;
use uptick::queue::memory::InMemoryCheckQueue;
use uptick::queue::CheckQueue;
use uptick::scheduler::{run_scheduler_loop, Scheduler, SchedulerConfig};
use uptick::worker::prober::HttpProber;
use uptick::worker::{WorkerPool, WorkerPoolConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx::query=warn"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    init_logging();
    info!("Starting uptick engine, version: {}", env!("CARGO_PKG_VERSION"));

    let config = match EngineConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load engine configuration: {}", e);
            return Err(e.into());
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    info!("Connected to database.");

    let store: Arc<dyn DataStore> = Arc::new(PgDataStore::new(Arc::new(pool)));
    let queue: Arc<dyn CheckQueue> = Arc::new(InMemoryCheckQueue::new());

    let dispatcher = Arc::new(NotificationDispatcher::new(store.clone()));
    let engine = Arc::new(AlertRuleEngine::new(store.clone(), dispatcher));

    let worker_pool = Arc::new(WorkerPool::new(
        store.clone(),
        queue.clone(),
        Arc::new(HttpProber::new()),
        engine,
        WorkerPoolConfig {
            concurrency: config.worker_concurrency,
            batch_size: config.batch_size,
            visibility_timeout: config.visibility_timeout(),
            idle_backoff: Duration::from_millis(500),
        },
    ));
    worker_pool.start().await;

    let scheduler = Arc::new(Scheduler::new(
        store,
        queue,
        SchedulerConfig {
            max_retries: config.max_retries,
            user_agent: config.user_agent.clone(),
        },
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_handle = tokio::spawn(run_scheduler_loop(
        scheduler,
        config.scheduler_interval(),
        shutdown_rx,
    ));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received; draining.");

    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler_handle.await {
        error!(error = %e, "Scheduler loop task panicked.");
    }
    worker_pool.stop().await;

    info!("Engine stopped.");
    Ok(())
}
