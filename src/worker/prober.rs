use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use tracing::debug;

use crate::db::enums::CheckOutcome;
use crate::queue::CheckPayload;

/// Result of one probe. A failed probe is a result, never an error: the
/// worker persists it like any other outcome.
#[derive(Debug, Clone, Copy)]
pub struct CheckReport {
    pub outcome: CheckOutcome,
    pub response_time_ms: Option<i32>,
}

/// Executes the bounded-timeout probe for one check message.
#[async_trait]
pub trait CheckProber: Send + Sync {
    async fn probe(&self, payload: &CheckPayload) -> CheckReport;
}

/// HTTP GET prober. The per-request timeout comes from the message, so one
/// slow endpoint never holds a worker longer than its own budget.
pub struct HttpProber {
    client: Client,
}

impl Default for HttpProber {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpProber {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

#[async_trait]
impl CheckProber for HttpProber {
    async fn probe(&self, payload: &CheckPayload) -> CheckReport {
        let data = &payload.monitor_data;
        let timeout = Duration::from_secs(data.timeout_seconds.max(1) as u64);

        let start = Instant::now();
        let result = self
            .client
            .get(&data.url)
            .timeout(timeout)
            .header(header::USER_AGENT, &payload.check_config.user_agent)
            .send()
            .await;
        let elapsed_ms = start.elapsed().as_millis() as i32;

        match result {
            Ok(response) => {
                let outcome = classify_status(response.status(), data.expected_status);
                debug!(
                    monitor_id = payload.monitor_id,
                    status = response.status().as_u16(),
                    outcome = outcome.as_str(),
                    elapsed_ms,
                    "Probe completed."
                );
                CheckReport {
                    outcome,
                    response_time_ms: Some(elapsed_ms),
                }
            }
            Err(e) if e.is_timeout() => CheckReport {
                outcome: CheckOutcome::Timeout,
                response_time_ms: None,
            },
            Err(e) => {
                debug!(
                    monitor_id = payload.monitor_id,
                    error = %e,
                    "Probe connection failed."
                );
                CheckReport {
                    outcome: CheckOutcome::Down,
                    response_time_ms: None,
                }
            }
        }
    }
}

/// 2xx and 3xx count as up, unless the monitor pins an exact expected code.
fn classify_status(status: StatusCode, expected: Option<u16>) -> CheckOutcome {
    let up = match expected {
        Some(code) => status.as_u16() == code,
        None => status.is_success() || status.is_redirection(),
    };
    if up {
        CheckOutcome::Up
    } else {
        CheckOutcome::Down
    }
}
