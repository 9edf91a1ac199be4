//! Outbox items and their status machine.

use crate::ids::{EntityId, OrganizationId, SyncItemId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// What kind of capture an outbox item delivers. Selects the gateway endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncItemKind {
    Visita,
    Foto,
    Audio,
}

impl SyncItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncItemKind::Visita => "visita",
            SyncItemKind::Foto => "foto",
            SyncItemKind::Audio => "audio",
        }
    }

    /// Attachments carry binary data and are not mirrored in the entity store.
    pub fn is_attachment(&self) -> bool {
        matches!(self, SyncItemKind::Foto | SyncItemKind::Audio)
    }
}

impl fmt::Display for SyncItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an item stopped being retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncFailure {
    /// Every allowed attempt failed with a transient error.
    Exhausted { reason: String },
    /// The gateway refused the payload (4xx). Retrying cannot succeed.
    Rejected { status: u16, reason: String },
}

impl SyncFailure {
    pub fn reason(&self) -> &str {
        match self {
            SyncFailure::Exhausted { reason } | SyncFailure::Rejected { reason, .. } => reason,
        }
    }
}

/// Delivery status of an outbox item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncItemStatus {
    Pending,
    Syncing,
    Error(SyncFailure),
}

impl SyncItemStatus {
    pub fn is_error(&self) -> bool {
        matches!(self, SyncItemStatus::Error(_))
    }
}

/// A queued mutation waiting for server confirmation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueItem {
    pub id: SyncItemId,
    #[serde(rename = "tipo")]
    pub kind: SyncItemKind,
    pub organization_id: OrganizationId,
    pub payload: serde_json::Value,
    pub entity_id: EntityId,
    /// Entity version the mutation was built against.
    pub base_version: u64,
    #[serde(rename = "intentos")]
    attempts: u32,
    #[serde(rename = "maxIntentos")]
    max_attempts: u32,
    status: SyncItemStatus,
    pub created_at: DateTime<Utc>,
}

impl SyncQueueItem {
    pub fn new(
        kind: SyncItemKind,
        organization_id: OrganizationId,
        entity_id: EntityId,
        base_version: u64,
        payload: serde_json::Value,
        max_attempts: u32,
    ) -> Self {
        Self {
            id: SyncItemId::new(),
            kind,
            organization_id,
            payload,
            entity_id,
            base_version,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            status: SyncItemStatus::Pending,
            created_at: Utc::now(),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn status(&self) -> &SyncItemStatus {
        &self.status
    }

    pub fn is_pending(&self) -> bool {
        self.status == SyncItemStatus::Pending
    }

    pub fn is_error(&self) -> bool {
        self.status.is_error()
    }

    /// Clears counters and status for a freshly enqueued item.
    pub fn reset_for_enqueue(&mut self) {
        self.attempts = 0;
        self.status = SyncItemStatus::Pending;
    }

    pub fn mark_syncing(&mut self) {
        self.status = SyncItemStatus::Syncing;
    }

    /// Records a transient failure. The item flips to `Error` once the last
    /// allowed attempt has been spent; `attempts` never exceeds `max_attempts`.
    pub fn record_failure(&mut self, reason: impl Into<String>) {
        self.attempts = (self.attempts + 1).min(self.max_attempts);
        if self.attempts >= self.max_attempts {
            self.status = SyncItemStatus::Error(SyncFailure::Exhausted {
                reason: reason.into(),
            });
        } else {
            self.status = SyncItemStatus::Pending;
        }
    }

    /// Records a permanent rejection. No further automatic attempts.
    pub fn record_rejection(&mut self, status: u16, reason: impl Into<String>) {
        self.attempts = (self.attempts + 1).min(self.max_attempts);
        self.status = SyncItemStatus::Error(SyncFailure::Rejected {
            status,
            reason: reason.into(),
        });
    }

    /// Moves an interrupted attempt back to `Pending`.
    pub fn recover(&mut self) {
        if self.status == SyncItemStatus::Syncing {
            self.status = SyncItemStatus::Pending;
        }
    }

    /// User-triggered retry. `attempts` is preserved on purpose.
    pub fn reset_error(&mut self) {
        if self.status.is_error() {
            self.status = SyncItemStatus::Pending;
        }
    }

    /// Stable key the gateway uses to deduplicate repeated deliveries.
    ///
    /// Derived only from the tenant and the item id, so every retry of the
    /// same item (including after a crash) carries the same key.
    pub fn idempotency_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.organization_id.as_str().as_bytes());
        hasher.update(b":");
        hasher.update(self.id.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}
