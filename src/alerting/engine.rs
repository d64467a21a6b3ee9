use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::db::enums::{CheckOutcome, MonitorStatus};
use crate::db::models::{AlertRule, CheckTransition};
use crate::db::store::DataStore;
use crate::notifications::NotificationDispatcher;

/// Decides, per check outcome, which alert rules fire. The per-monitor
/// degradation state lives in two persisted places rather than in memory:
/// the consecutive-failure counter on the monitor row (maintained inside
/// `write_check_result`) and the cooldown clock in the alert log. That keeps
/// evaluation correct when the queue reorders or duplicates deliveries and
/// when the process restarts mid-outage.
pub struct AlertRuleEngine {
    store: Arc<dyn DataStore>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl AlertRuleEngine {
    pub fn new(store: Arc<dyn DataStore>, dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self { store, dispatcher }
    }

    /// Evaluates one persisted check result and dispatches whatever fires.
    /// Returns the number of notifications dispatched. Store read failures
    /// are logged and skip this evaluation; the next check recomputes from
    /// persisted state, so nothing is permanently lost.
    pub async fn evaluate(
        &self,
        transition: &CheckTransition,
        outcome: CheckOutcome,
        now: DateTime<Utc>,
    ) -> usize {
        let monitor = &transition.monitor;

        // A redelivered check recorded nothing; it must not fire anything.
        if transition.duplicate {
            debug!(monitor_id = monitor.id, "Duplicate delivery; nothing to evaluate.");
            return 0;
        }

        let rules = match self.store.get_active_rules(monitor.id).await {
            Ok(rules) => rules,
            Err(e) => {
                warn!(
                    monitor_id = monitor.id,
                    error = %e,
                    "Failed to load alert rules; skipping evaluation for this check."
                );
                return 0;
            }
        };
        if rules.is_empty() {
            return 0;
        }

        let mut firings: Vec<(AlertRule, CheckOutcome)> = Vec::new();
        match outcome {
            CheckOutcome::Up => {
                // Recovery fires only on a transition out of an unhealthy
                // state. A first check on a pending monitor stays silent.
                let previous = MonitorStatus::parse(&transition.previous_status);
                if !previous.is_failure() {
                    return 0;
                }
                for rule in rules {
                    if !rule.alert_on_up {
                        continue;
                    }
                    if self.cooled_down(monitor.id, &rule, CheckOutcome::Up, now).await {
                        firings.push((rule, CheckOutcome::Up));
                    }
                }
            }
            CheckOutcome::Down | CheckOutcome::Timeout => {
                let count = monitor.consecutive_failure_count;
                for rule in rules {
                    let trigger_matches = match outcome {
                        CheckOutcome::Down => rule.alert_on_down,
                        CheckOutcome::Timeout => rule.alert_on_timeout,
                        CheckOutcome::Up => false,
                    };
                    if !trigger_matches || count < rule.consecutive_failures_threshold {
                        continue;
                    }
                    // Edge-triggered with cooldown re-arm: fires at the
                    // threshold crossing, then again once per elapsed
                    // cooldown while the outage persists. The crossing
                    // itself is also gated by the cooldown so back-to-back
                    // degradation episodes cannot storm.
                    if self.cooled_down(monitor.id, &rule, outcome, now).await {
                        firings.push((rule, outcome));
                    } else {
                        debug!(
                            monitor_id = monitor.id,
                            rule_id = rule.id,
                            "Alert suppressed by cooldown."
                        );
                    }
                }
            }
        }

        if firings.is_empty() {
            return 0;
        }
        self.dispatcher.dispatch_all(monitor, &firings, now).await
    }

    /// Whether the rule's cooldown window has elapsed for this event type.
    /// A read failure suppresses the firing rather than risking a duplicate;
    /// the outage, if real, re-fires on a later check.
    async fn cooled_down(
        &self,
        monitor_id: i32,
        rule: &AlertRule,
        event: CheckOutcome,
        now: DateTime<Utc>,
    ) -> bool {
        match self
            .store
            .get_last_fired(monitor_id, rule.notification_channel_id, event.as_str())
            .await
        {
            Ok(None) => true,
            Ok(Some(last_fired)) => {
                now - last_fired >= Duration::minutes(rule.cooldown_minutes as i64)
            }
            Err(e) => {
                warn!(
                    monitor_id,
                    rule_id = rule.id,
                    error = %e,
                    "Failed to read last-fired timestamp; suppressing this firing."
                );
                false
            }
        }
    }
}
