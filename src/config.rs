use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct EngineConfig {
    pub database_url: String,

    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_visibility_timeout_seconds")]
    pub visibility_timeout_seconds: u64,

    #[serde(default = "default_scheduler_interval_seconds")]
    pub scheduler_interval_seconds: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialEngineConfig {
    database_url: Option<String>,
    worker_concurrency: Option<usize>,
    batch_size: Option<usize>,
    visibility_timeout_seconds: Option<u64>,
    scheduler_interval_seconds: Option<u64>,
    max_retries: Option<u32>,
    user_agent: Option<String>,
}

fn default_worker_concurrency() -> usize {
    4
}

fn default_batch_size() -> usize {
    10
}

fn default_visibility_timeout_seconds() -> u64 {
    60
}

fn default_scheduler_interval_seconds() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_user_agent() -> String {
    concat!("uptick-engine/", env!("CARGO_PKG_VERSION")).to_string()
}

impl EngineConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self, String> {
        dotenv::dotenv().ok();

        // 1. Load from file (optional)
        let file_config: PartialEngineConfig = if let Some(path_str) = config_path {
            let path = Path::new(path_str);
            if path.exists() {
                let contents = fs::read_to_string(path)
                    .map_err(|e| format!("Failed to read config file at {path:?}: {e}"))?;
                toml::from_str(&contents)
                    .map_err(|e| format!("Failed to parse TOML from config file at {path:?}: {e}"))?
            } else {
                PartialEngineConfig::default()
            }
        } else {
            PartialEngineConfig::default()
        };

        // 2. Merge: environment overrides file
        let final_config = EngineConfig {
            database_url: env_string("DATABASE_URL")
                .or(file_config.database_url)
                .ok_or("DATABASE_URL is required")?,
            worker_concurrency: env_parsed("WORKER_CONCURRENCY")?
                .or(file_config.worker_concurrency)
                .unwrap_or_else(default_worker_concurrency),
            batch_size: env_parsed("BATCH_SIZE")?
                .or(file_config.batch_size)
                .unwrap_or_else(default_batch_size),
            visibility_timeout_seconds: env_parsed("VISIBILITY_TIMEOUT_SECONDS")?
                .or(file_config.visibility_timeout_seconds)
                .unwrap_or_else(default_visibility_timeout_seconds),
            scheduler_interval_seconds: env_parsed("SCHEDULER_INTERVAL_SECONDS")?
                .or(file_config.scheduler_interval_seconds)
                .unwrap_or_else(default_scheduler_interval_seconds),
            max_retries: env_parsed("MAX_RETRIES")?
                .or(file_config.max_retries)
                .unwrap_or_else(default_max_retries),
            user_agent: env_string("CHECK_USER_AGENT")
                .or(file_config.user_agent)
                .unwrap_or_else(default_user_agent),
        };

        Ok(final_config)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_seconds)
    }

    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler_interval_seconds)
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Result<Option<T>, String>
where
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid value for {key}: {e}")),
    }
}
