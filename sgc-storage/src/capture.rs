//! Combined write paths: the UI's capture (entity write plus outbox enqueue)
//! and the sync engine's confirmation (server state plus outbox cleanup),
//! each committed as one batch.
//!
//! Both paths read before they write, and they run on different threads.
//! They serialize on one store-wide lock, so a capture never lands between
//! the reads a confirmation is computed from and its batch.

use crate::entity_store::EntityStore;
use crate::error::{StorageError, StorageResult};
use crate::outbox::{OutboxQueue, delete_op, prepare_enqueue, put_op};
use crate::port::StoragePort;
use chrono::{DateTime, Utc};
use sgc_types::{
    AttachmentPayload, Entity, EntityId, OrganizationId, SyncItemId, SyncItemKind, SyncQueueItem,
    merge_patch,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Server-confirmed state to absorb into the entity store.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerState {
    pub entity_id: EntityId,
    pub version: u64,
    pub synced_at: DateTime<Utc>,
    /// Replaces the stored payload when present.
    pub data: Option<serde_json::Value>,
}

/// Entity store and outbox over one storage port.
///
/// Captures are committed with a single `write_batch`, so a crash can never
/// leave an entity mutation without its queued item, or the reverse.
#[derive(Clone)]
pub struct LocalStore {
    port: Arc<dyn StoragePort>,
    entities: EntityStore,
    outbox: OutboxQueue,
    writes: Arc<Mutex<()>>,
}

impl LocalStore {
    pub fn new(port: Arc<dyn StoragePort>) -> Self {
        Self {
            entities: EntityStore::new(port.clone()),
            outbox: OutboxQueue::new(port.clone()),
            port,
            writes: Arc::new(Mutex::new(())),
        }
    }

    /// Takes the store-wide write lock. Reads made through the returned
    /// guard stay current until it commits or is dropped.
    ///
    /// Blocks while a capture or another confirmation is in progress. Must
    /// not be called again on the same thread while the guard is alive.
    pub fn lock_writes(&self) -> WriteLock<'_> {
        WriteLock {
            store: self,
            _guard: self.writes.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }

    pub fn outbox(&self) -> &OutboxQueue {
        &self.outbox
    }

    /// Applies `patch` to `entity` and queues it as a `visita` mutation.
    ///
    /// `entity` is the copy the caller read (version 0 for a new one). For a
    /// new entity the queued payload is the full record; otherwise it is the
    /// patch, so replays only touch the fields this capture changed.
    pub fn capture(
        &self,
        entity: &Entity,
        patch: serde_json::Value,
        max_attempts: u32,
    ) -> StorageResult<(Entity, SyncQueueItem)> {
        let _guard = self.writes.lock().unwrap_or_else(PoisonError::into_inner);
        let mut edited = entity.clone();
        merge_patch(&mut edited.data, &patch);

        let (stored, entity_op) = self.entities.prepare_put(&edited)?;
        let base_version = stored.version - 1;
        let payload = if base_version == 0 {
            stored.data.clone()
        } else {
            patch
        };

        let item = SyncQueueItem::new(
            SyncItemKind::Visita,
            stored.organization_id.clone(),
            stored.id,
            base_version,
            payload,
            max_attempts,
        );
        let (item, item_op) = prepare_enqueue(item)?;

        self.port.write_batch(&[entity_op, item_op])?;
        debug!(
            "captured {} {} v{} (item {})",
            stored.kind, stored.id, stored.version, item.id
        );
        Ok((stored, item))
    }

    /// Queues a photo or audio attachment. Attachments have no entity row.
    pub fn capture_attachment(
        &self,
        organization_id: &OrganizationId,
        kind: SyncItemKind,
        attachment: &AttachmentPayload,
        max_attempts: u32,
    ) -> StorageResult<SyncQueueItem> {
        if !kind.is_attachment() {
            return Err(StorageError::InvalidInput(format!(
                "{kind} is not an attachment kind"
            )));
        }
        let payload = serde_json::to_value(attachment)?;
        let item = SyncQueueItem::new(
            kind,
            organization_id.clone(),
            EntityId::new(),
            0,
            payload,
            max_attempts,
        );
        let _guard = self.writes.lock().unwrap_or_else(PoisonError::into_inner);
        self.outbox.enqueue(item)
    }

    /// [`OutboxQueue::reset_errors`] under the write lock.
    pub fn reset_errors(&self, organization_id: &OrganizationId) -> StorageResult<usize> {
        let _guard = self.writes.lock().unwrap_or_else(PoisonError::into_inner);
        self.outbox.reset_errors(organization_id)
    }

    /// Commits a server confirmation in one batch: the absorbed entity state
    /// (absent for untracked attachments), the rewritten later items of the
    /// same entity, and the removal of the confirmed item.
    ///
    /// Callers that computed `state` or `rebased` from earlier reads should
    /// go through [`LocalStore::lock_writes`] instead.
    pub fn confirm(
        &self,
        confirmed: &SyncItemId,
        state: Option<ServerState>,
        rebased: &[SyncQueueItem],
    ) -> StorageResult<Option<Entity>> {
        self.lock_writes().confirm(confirmed, state, rebased)
    }
}

/// Exclusive hold on a [`LocalStore`]'s write paths.
pub struct WriteLock<'a> {
    store: &'a LocalStore,
    _guard: MutexGuard<'a, ()>,
}

impl WriteLock<'_> {
    pub fn entities(&self) -> &EntityStore {
        &self.store.entities
    }

    pub fn outbox(&self) -> &OutboxQueue {
        &self.store.outbox
    }

    /// Commits a server confirmation and releases the lock.
    pub fn confirm(
        self,
        confirmed: &SyncItemId,
        state: Option<ServerState>,
        rebased: &[SyncQueueItem],
    ) -> StorageResult<Option<Entity>> {
        let mut ops = Vec::with_capacity(rebased.len() + 2);
        let absorbed = match state {
            Some(state) => {
                let (entity, op) = self.store.entities.prepare_server_version(
                    &state.entity_id,
                    state.version,
                    state.synced_at,
                    state.data,
                )?;
                ops.push(op);
                Some(entity)
            }
            None => None,
        };
        for item in rebased {
            ops.push(put_op(item)?);
        }
        ops.push(delete_op(confirmed));

        self.store.port.write_batch(&ops)?;
        if let Some(entity) = &absorbed {
            debug!(
                "item {confirmed} confirmed, entity {} now v{} ({} rebased)",
                entity.id,
                entity.version,
                rebased.len()
            );
        }
        Ok(absorbed)
    }
}
