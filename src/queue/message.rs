use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The only message type this engine produces or consumes.
pub const MESSAGE_TYPE_MONITOR_CHECK: &str = "MONITOR_CHECK";

/// Queue payload for one scheduled check. Serialized as camelCase JSON so
/// the wire format matches what external queue consumers and dead-letter
/// tooling expect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckMessage {
    pub message_id: Uuid,
    pub message_type: String,
    pub timestamp: DateTime<Utc>,
    /// Completed delivery attempts so far. Stamped 0 by the scheduler and
    /// advanced by the queue on each redelivery.
    pub retry_count: u32,
    pub max_retries: u32,
    pub payload: CheckPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckPayload {
    pub monitor_id: i32,
    pub user_id: i32,
    pub monitor_data: MonitorData,
    pub check_config: CheckConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorData {
    pub url: String,
    pub expected_status: Option<u16>,
    pub interval_minutes: i32,
    pub timeout_seconds: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckConfig {
    pub priority: String,
    pub scheduled_at: DateTime<Utc>,
    /// Rough duration estimate in milliseconds, for queue-side budgeting.
    pub expected_duration: i64,
    pub user_agent: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_is_camel_case() {
        let message = CheckMessage {
            message_id: Uuid::nil(),
            message_type: MESSAGE_TYPE_MONITOR_CHECK.to_string(),
            timestamp: Utc::now(),
            retry_count: 0,
            max_retries: 3,
            payload: CheckPayload {
                monitor_id: 42,
                user_id: 7,
                monitor_data: MonitorData {
                    url: "https://example.com/health".to_string(),
                    expected_status: Some(200),
                    interval_minutes: 5,
                    timeout_seconds: 10,
                },
                check_config: CheckConfig {
                    priority: "normal".to_string(),
                    scheduled_at: Utc::now(),
                    expected_duration: 10_000,
                    user_agent: "uptick-engine/0.1".to_string(),
                },
            },
        };

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["messageType"], MESSAGE_TYPE_MONITOR_CHECK);
        assert_eq!(json["payload"]["monitorId"], 42);
        assert_eq!(json["payload"]["monitorData"]["timeoutSeconds"], 10);
        assert_eq!(json["payload"]["checkConfig"]["priority"], "normal");

        let back: CheckMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back.payload.monitor_id, 42);
    }
}
