//! Correlation-id registry for in-flight action requests.
//!
//! Flow:
//! 1. `request_action` calls [`PendingRequests::register`] to get a fresh id
//!    and a oneshot receiver
//! 2. The request is posted to the host carrying that id
//! 3. The response listener calls [`PendingRequests::complete`]
//! 4. The caller awaits the receiver or gives up and calls
//!    [`PendingRequests::expire`] / [`PendingRequests::cancel`]

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// What a pending call eventually resolves to: the host's result or its error message.
pub type ActionOutcome = Result<Value, String>;

struct PendingCall {
    sender: oneshot::Sender<ActionOutcome>,
    action: String,
    created_at: Instant,
}

/// Counters for the registry.
#[derive(Debug, Default)]
pub struct PendingStats {
    pub total_registered: AtomicU64,
    pub total_completed: AtomicU64,
    pub total_timeouts: AtomicU64,
    pub total_cancelled: AtomicU64,
    /// Responses that matched no pending call.
    pub total_unmatched: AtomicU64,
}

/// Point-in-time copy of [`PendingStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PendingSnapshot {
    pub pending: usize,
    pub registered: u64,
    pub completed: u64,
    pub timeouts: u64,
    pub cancelled: u64,
    pub unmatched: u64,
}

/// In-flight requests keyed by correlation id.
///
/// Ids are unique among live entries; an entry is removed exactly once, by
/// whichever of complete / expire / cancel gets to it first.
#[derive(Default)]
pub struct PendingRequests {
    pending: DashMap<String, PendingCall>,
    stats: PendingStats,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a correlation id and register a waiter for it.
    pub fn register(&self, action: &str) -> (String, oneshot::Receiver<ActionOutcome>) {
        let (sender, receiver) = oneshot::channel();
        loop {
            let id = uuid::Uuid::new_v4().to_string();
            match self.pending.entry(id.clone()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    slot.insert(PendingCall {
                        sender,
                        action: action.to_string(),
                        created_at: Instant::now(),
                    });
                    self.stats.total_registered.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        category = "sdk",
                        correlation_id = %id,
                        action = action,
                        pending = self.pending.len(),
                        "Registered pending action"
                    );
                    return (id, receiver);
                }
            }
        }
    }

    /// Settle the call registered under `correlation_id`.
    ///
    /// Returns `false` when no such call is pending (unknown id, already
    /// settled, or timed out).
    pub fn complete(&self, correlation_id: &str, outcome: ActionOutcome) -> bool {
        match self.pending.remove(correlation_id) {
            Some((_, call)) => {
                self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    category = "sdk",
                    correlation_id = correlation_id,
                    action = %call.action,
                    elapsed_ms = call.created_at.elapsed().as_millis() as u64,
                    ok = outcome.is_ok(),
                    "Completing pending action"
                );
                // The waiter may have been dropped in the meantime.
                let _ = call.sender.send(outcome);
                true
            }
            None => {
                self.stats.total_unmatched.fetch_add(1, Ordering::Relaxed);
                debug!(
                    category = "sdk",
                    correlation_id = correlation_id,
                    "Response for unknown or expired correlation id"
                );
                false
            }
        }
    }

    /// Drop the call after its deadline passed.
    pub fn expire(&self, correlation_id: &str) -> bool {
        match self.pending.remove(correlation_id) {
            Some((_, call)) => {
                self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(
                    category = "sdk",
                    correlation_id = correlation_id,
                    action = %call.action,
                    elapsed_ms = call.created_at.elapsed().as_millis() as u64,
                    "Action timed out"
                );
                true
            }
            None => false,
        }
    }

    /// Drop the call because its caller went away.
    pub fn cancel(&self, correlation_id: &str) -> bool {
        if self.pending.remove(correlation_id).is_some() {
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
            debug!(category = "sdk", correlation_id = correlation_id, "Cancelled pending action");
            true
        } else {
            false
        }
    }

    pub fn is_pending(&self, correlation_id: &str) -> bool {
        self.pending.contains_key(correlation_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn stats(&self) -> PendingSnapshot {
        PendingSnapshot {
            pending: self.pending.len(),
            registered: self.stats.total_registered.load(Ordering::Relaxed),
            completed: self.stats.total_completed.load(Ordering::Relaxed),
            timeouts: self.stats.total_timeouts.load(Ordering::Relaxed),
            cancelled: self.stats.total_cancelled.load(Ordering::Relaxed),
            unmatched: self.stats.total_unmatched.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_and_complete() {
        let pending = PendingRequests::new();
        let (id, rx) = pending.register("navigate");
        assert!(pending.is_pending(&id));

        assert!(pending.complete(&id, Ok(json!({"ok": true}))));
        assert_eq!(rx.await.unwrap(), Ok(json!({"ok": true})));
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_complete_only_once() {
        let pending = PendingRequests::new();
        let (id, _rx) = pending.register("navigate");

        assert!(pending.complete(&id, Err("denied".into())));
        assert!(!pending.complete(&id, Ok(Value::Null)));
        assert!(!pending.expire(&id));

        let stats = pending.stats();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.unmatched, 1);
    }

    #[test]
    fn test_unknown_id() {
        let pending = PendingRequests::new();
        assert!(!pending.complete("nope", Ok(Value::Null)));
        assert!(!pending.cancel("nope"));
    }

    #[test]
    fn test_ids_are_distinct() {
        let pending = PendingRequests::new();
        let (a, _ra) = pending.register("x");
        let (b, _rb) = pending.register("x");
        assert_ne!(a, b);
        assert_eq!(pending.len(), 2);

        assert!(pending.expire(&a));
        assert!(pending.cancel(&b));
        let stats = pending.stats();
        assert_eq!((stats.timeouts, stats.cancelled, stats.pending), (1, 1, 0));
    }
}
