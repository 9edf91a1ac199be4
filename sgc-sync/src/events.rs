//! Lifecycle events and status snapshots for the UI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events emitted by the orchestrator. Every `Start` is followed by exactly
/// one of `Complete`, `Incomplete` or `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncEvent {
    Start,
    Progress { done: usize, total: usize },
    /// The tenant's queue is empty.
    Complete { synced: usize },
    /// Items are still pending (offline, backoff) and none is in error.
    Incomplete { synced: usize, remaining: usize },
    /// Items remain in error, or the run aborted on a local-storage failure.
    #[serde(rename_all = "camelCase")]
    Error {
        failed_count: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl SyncEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncEvent::Complete { .. } | SyncEvent::Incomplete { .. } | SyncEvent::Error { .. }
        )
    }
}

/// Outcome of one drain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// Items confirmed by the server in this run.
    pub synced: usize,
    /// Items that failed in this run (transient or rejected).
    pub failed: usize,
    /// Items still queued after the run, any status.
    pub remaining: usize,
    /// Items in `error` after the run.
    pub errors: usize,
    /// Set when a local-storage failure aborted the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.aborted.is_none() && self.remaining == 0
    }
}

/// Snapshot shown next to the sync button.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub is_syncing: bool,
    pub is_online: bool,
    pub pending: usize,
    pub errors: usize,
    pub last_sync_at: Option<DateTime<Utc>>,
}
