//! Consumed-ticket tracking.
//!
//! Tickets are single-use. The guard remembers the id of every accepted
//! ticket until that ticket would have expired anyway, so memory is bounded
//! by the number of tickets accepted within one TTL window, and hard-capped
//! by `capacity`. When the cap is reached with only live entries the guard
//! refuses new tickets rather than forgetting a live one.

use crate::error::{Result, TicketError};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::warn;

#[derive(Debug)]
pub struct ReplayGuard {
    /// ticket id -> instant (unix secs) after which the entry may be forgotten
    consumed: Mutex<HashMap<String, i64>>,
    capacity: usize,
}

impl ReplayGuard {
    pub fn new(capacity: usize) -> Self {
        Self {
            consumed: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Record `ticket_id` as used. Fails if it was already used.
    pub fn consume(&self, ticket_id: &str, forget_after: i64, now: i64) -> Result<()> {
        let mut consumed = self.consumed.lock();

        if let Some(&until) = consumed.get(ticket_id) {
            if now < until {
                return Err(TicketError::Replayed);
            }
        }

        if consumed.len() >= self.capacity {
            consumed.retain(|_, until| now < *until);
            if consumed.len() >= self.capacity {
                warn!(
                    category = "tickets",
                    capacity = self.capacity,
                    "Replay guard full, refusing ticket"
                );
                return Err(TicketError::Internal("replay guard is full".into()));
            }
        }

        consumed.insert(ticket_id.to_string(), forget_after);
        Ok(())
    }

    /// Whether `ticket_id` was consumed and is still remembered.
    pub fn is_consumed(&self, ticket_id: &str, now: i64) -> bool {
        self.consumed
            .lock()
            .get(ticket_id)
            .is_some_and(|&until| now < until)
    }

    /// Drop entries whose tickets can no longer validate. Returns how many were removed.
    pub fn purge_expired(&self, now: i64) -> usize {
        let mut consumed = self.consumed.lock();
        let before = consumed.len();
        consumed.retain(|_, until| now < *until);
        before - consumed.len()
    }

    pub fn len(&self) -> usize {
        self.consumed.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
