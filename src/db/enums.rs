use serde::{Deserialize, Serialize};
use std::fmt;

/// Health of a monitor as persisted on the `monitors` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    Up,
    Down,
    Pending,
    Timeout,
    Unknown,
}

impl MonitorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorStatus::Up => "up",
            MonitorStatus::Down => "down",
            MonitorStatus::Pending => "pending",
            MonitorStatus::Timeout => "timeout",
            MonitorStatus::Unknown => "unknown",
        }
    }

    /// Parses a persisted status string. Anything unrecognized maps to
    /// `Unknown` rather than failing, since old rows may carry values written
    /// by earlier versions.
    pub fn parse(s: &str) -> Self {
        match s {
            "up" => MonitorStatus::Up,
            "down" => MonitorStatus::Down,
            "pending" => MonitorStatus::Pending,
            "timeout" => MonitorStatus::Timeout,
            _ => MonitorStatus::Unknown,
        }
    }

    /// `down` and `timeout` both count toward the consecutive-failure streak.
    pub fn is_failure(&self) -> bool {
        matches!(self, MonitorStatus::Down | MonitorStatus::Timeout)
    }
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a single HTTP probe. Also used as the alert event type
/// (`alert_logs.alert_type`): a recovery notification is an `up` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckOutcome {
    Up,
    Down,
    Timeout,
}

impl CheckOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckOutcome::Up => "up",
            CheckOutcome::Down => "down",
            CheckOutcome::Timeout => "timeout",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, CheckOutcome::Down | CheckOutcome::Timeout)
    }
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Delivery state of an `alert_logs` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLogStatus {
    Pending,
    Queued,
    Sent,
    Failed,
}

impl AlertLogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLogStatus::Pending => "pending",
            AlertLogStatus::Queued => "queued",
            AlertLogStatus::Sent => "sent",
            AlertLogStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for AlertLogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
