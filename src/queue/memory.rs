//! In-process check queue with real visibility-timeout semantics: received
//! messages become invisible for the requested window and are redelivered,
//! receive count incremented, if nobody acknowledges them in time.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use uuid::Uuid;

use super::{CheckMessage, CheckQueue, Delivery, QueueError};

#[derive(Debug, Clone)]
struct QueueEntry {
    message: CheckMessage,
    receive_count: u32,
}

/// A message that exhausted its retry budget, kept for inspection.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub message: CheckMessage,
    pub receive_count: u32,
    pub reason: String,
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<QueueEntry>,
    in_flight: HashMap<Uuid, (QueueEntry, Instant)>,
    dead: Vec<DeadLetter>,
}

#[derive(Default)]
pub struct InMemoryCheckQueue {
    state: Mutex<QueueState>,
}

impl InMemoryCheckQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state.lock().unwrap().dead.clone()
    }

    /// Moves expired in-flight entries back to the front of the ready queue.
    fn reap_expired(state: &mut QueueState, now: Instant) {
        let expired: Vec<Uuid> = state
            .in_flight
            .iter()
            .filter(|(_, (_, deadline))| *deadline <= now)
            .map(|(receipt, _)| *receipt)
            .collect();
        for receipt in expired {
            if let Some((entry, _)) = state.in_flight.remove(&receipt) {
                state.ready.push_front(entry);
            }
        }
    }
}

#[async_trait]
impl CheckQueue for InMemoryCheckQueue {
    async fn enqueue(&self, message: &CheckMessage) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap();
        state.ready.push_back(QueueEntry {
            message: message.clone(),
            receive_count: 0,
        });
        Ok(())
    }

    async fn receive(
        &self,
        max_messages: usize,
        visibility: Duration,
    ) -> Result<Vec<Delivery>, QueueError> {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap();
        Self::reap_expired(&mut state, now);

        let mut deliveries = Vec::new();
        while deliveries.len() < max_messages {
            let Some(mut entry) = state.ready.pop_front() else {
                break;
            };
            entry.receive_count += 1;
            // Keep the wire-level retry counter in step with redeliveries.
            entry.message.retry_count = entry.receive_count - 1;
            let receipt = Uuid::new_v4();
            deliveries.push(Delivery {
                receipt,
                receive_count: entry.receive_count,
                message: entry.message.clone(),
            });
            state.in_flight.insert(receipt, (entry, now + visibility));
        }
        Ok(deliveries)
    }

    async fn acknowledge(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap();
        state.in_flight.remove(&delivery.receipt);
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap();
        if let Some((entry, _)) = state.in_flight.remove(&delivery.receipt) {
            state.dead.push(DeadLetter {
                message: entry.message,
                receive_count: entry.receive_count,
                reason: reason.to_string(),
            });
        }
        Ok(())
    }

    async fn depth(&self) -> Result<usize, QueueError> {
        Ok(self.state.lock().unwrap().ready.len())
    }
}
