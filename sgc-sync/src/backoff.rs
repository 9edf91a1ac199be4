//! Retry backoff for transient delivery failures.

use sgc_types::{SyncItemId, SyncQueueItem};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// `min(2^attempts * base, cap)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base: Duration,
    cap: Duration,
}

impl RetryPolicy {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    pub fn delay(&self, attempts: u32) -> Duration {
        let factor = 2u32.checked_pow(attempts).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

/// In-memory next-eligible times per queued item.
///
/// Nothing here is persisted. An item seen with `attempts > 0` and no entry
/// (after a restart) gets a fresh window computed from its attempts.
#[derive(Debug)]
pub struct RetrySchedule {
    policy: RetryPolicy,
    next_eligible: HashMap<SyncItemId, Instant>,
}

impl RetrySchedule {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            next_eligible: HashMap::new(),
        }
    }

    /// Whether the item may be attempted at `now`.
    pub fn is_due(&mut self, item: &SyncQueueItem, now: Instant) -> bool {
        if item.attempts() == 0 {
            return true;
        }
        let policy = self.policy;
        let at = *self
            .next_eligible
            .entry(item.id)
            .or_insert_with(|| now + policy.delay(item.attempts()));
        now >= at
    }

    /// Starts the backoff window after a failed attempt.
    pub fn record_failure(&mut self, id: SyncItemId, attempts: u32, now: Instant) -> Instant {
        let at = now + self.policy.delay(attempts);
        self.next_eligible.insert(id, at);
        at
    }

    /// Makes an item due immediately (user retry).
    pub fn release(&mut self, id: SyncItemId, now: Instant) {
        self.next_eligible.insert(id, now);
    }

    /// Drops the entry of a confirmed item.
    pub fn forget(&mut self, id: &SyncItemId) {
        self.next_eligible.remove(id);
    }

    pub fn next_eligible(&self, id: &SyncItemId) -> Option<Instant> {
        self.next_eligible.get(id).copied()
    }
}
