//! Durable outbox of mutations awaiting server confirmation.
//!
//! Items are scoped by organization: every listing goes through the
//! organization index, so one tenant's queue never shows another's items.
//! Status transitions live on [`SyncQueueItem`]; this type only persists
//! them, one row write per transition.

use crate::error::{StorageError, StorageResult};
use crate::port::{StoragePort, Table, WriteOp};
use serde::{Deserialize, Serialize};
use sgc_types::{EntityId, OrganizationId, SyncItemId, SyncItemStatus, SyncQueueItem};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Aggregate counts shown to the user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxCounts {
    pub pending: usize,
    pub syncing: usize,
    pub error: usize,
}

impl OutboxCounts {
    pub fn total(&self) -> usize {
        self.pending + self.syncing + self.error
    }
}

#[derive(Clone)]
pub struct OutboxQueue {
    port: Arc<dyn StoragePort>,
}

impl OutboxQueue {
    pub fn new(port: Arc<dyn StoragePort>) -> Self {
        Self { port }
    }

    /// Appends an item as `Pending` with zero attempts.
    pub fn enqueue(&self, item: SyncQueueItem) -> StorageResult<SyncQueueItem> {
        let (item, op) = prepare_enqueue(item)?;
        self.port.write_batch(&[op])?;
        debug!("enqueued {} item {} for entity {}", item.kind, item.id, item.entity_id);
        Ok(item)
    }

    pub fn get(&self, id: &SyncItemId) -> StorageResult<Option<SyncQueueItem>> {
        match self.port.get(Table::Outbox, &id.to_string())? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Every item of the organization, oldest first.
    pub fn list_all(&self, organization_id: &OrganizationId) -> StorageResult<Vec<SyncQueueItem>> {
        let mut items = self
            .port
            .list_by_index(Table::Outbox, organization_id.as_str())?
            .iter()
            .map(|raw| serde_json::from_str::<SyncQueueItem>(raw).map_err(StorageError::from))
            .collect::<StorageResult<Vec<_>>>()?;
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    /// Items still owed to the server (`Pending` or `Error`), FIFO by `created_at`.
    pub fn list_pending(
        &self,
        organization_id: &OrganizationId,
    ) -> StorageResult<Vec<SyncQueueItem>> {
        let mut items = self.list_all(organization_id)?;
        items.retain(|item| item.is_pending() || item.is_error());
        Ok(items)
    }

    /// Items queued for one entity, FIFO, whatever their status.
    pub fn pending_for_entity(
        &self,
        organization_id: &OrganizationId,
        entity_id: &EntityId,
    ) -> StorageResult<Vec<SyncQueueItem>> {
        let mut items = self.list_all(organization_id)?;
        items.retain(|item| item.entity_id == *entity_id);
        Ok(items)
    }

    pub fn mark_syncing(&self, id: &SyncItemId) -> StorageResult<SyncQueueItem> {
        self.update(id, |item| item.mark_syncing())
    }

    /// Removes a confirmed item.
    pub fn mark_done(&self, id: &SyncItemId) -> StorageResult<()> {
        self.port.write_batch(&[delete_op(id)])
    }

    /// Records a transient failure; see [`SyncQueueItem::record_failure`].
    pub fn mark_failed(&self, id: &SyncItemId, reason: &str) -> StorageResult<SyncQueueItem> {
        let item = self.update(id, |item| item.record_failure(reason))?;
        if item.is_error() {
            warn!(
                "item {id} exhausted {} attempts, giving up: {reason}",
                item.attempts()
            );
        }
        Ok(item)
    }

    /// Records a permanent 4xx rejection.
    pub fn mark_rejected(
        &self,
        id: &SyncItemId,
        status: u16,
        reason: &str,
    ) -> StorageResult<SyncQueueItem> {
        self.update(id, |item| item.record_rejection(status, reason))
    }

    /// Rewrites the base version of an item the reconciler rebased.
    pub fn rebase(&self, id: &SyncItemId, base_version: u64) -> StorageResult<SyncQueueItem> {
        self.update(id, |item| item.base_version = base_version)
    }

    /// Turns interrupted `Syncing` items back into `Pending`. Returns how many.
    ///
    /// Nothing can tell whether an interrupted attempt reached the server;
    /// the idempotency key makes the resend safe.
    pub fn recover_in_flight(&self, organization_id: &OrganizationId) -> StorageResult<usize> {
        let ops = self
            .list_all(organization_id)?
            .into_iter()
            .filter(|item| *item.status() == SyncItemStatus::Syncing)
            .map(|mut item| {
                item.recover();
                put_op(&item)
            })
            .collect::<StorageResult<Vec<_>>>()?;

        if !ops.is_empty() {
            self.port.write_batch(&ops)?;
            info!("recovered {} interrupted items for {organization_id}", ops.len());
        }
        Ok(ops.len())
    }

    /// User-triggered retry: `Error` items go back to `Pending`, attempts kept.
    pub fn reset_errors(&self, organization_id: &OrganizationId) -> StorageResult<usize> {
        let ops = self
            .list_all(organization_id)?
            .into_iter()
            .filter(|item| item.is_error())
            .map(|mut item| {
                item.reset_error();
                put_op(&item)
            })
            .collect::<StorageResult<Vec<_>>>()?;

        if !ops.is_empty() {
            self.port.write_batch(&ops)?;
            info!("reset {} failed items for {organization_id}", ops.len());
        }
        Ok(ops.len())
    }

    pub fn counts(&self, organization_id: &OrganizationId) -> StorageResult<OutboxCounts> {
        let mut counts = OutboxCounts::default();
        for item in self.list_all(organization_id)? {
            match item.status() {
                SyncItemStatus::Pending => counts.pending += 1,
                SyncItemStatus::Syncing => counts.syncing += 1,
                SyncItemStatus::Error(_) => counts.error += 1,
            }
        }
        Ok(counts)
    }

    fn update(
        &self,
        id: &SyncItemId,
        f: impl FnOnce(&mut SyncQueueItem),
    ) -> StorageResult<SyncQueueItem> {
        let mut item = self
            .get(id)?
            .ok_or_else(|| StorageError::NotFound(format!("outbox item {id}")))?;
        f(&mut item);
        self.port.write_batch(&[put_op(&item)?])?;
        Ok(item)
    }
}

pub(crate) fn prepare_enqueue(mut item: SyncQueueItem) -> StorageResult<(SyncQueueItem, WriteOp)> {
    item.reset_for_enqueue();
    let op = put_op(&item)?;
    Ok((item, op))
}

pub(crate) fn put_op(item: &SyncQueueItem) -> StorageResult<WriteOp> {
    Ok(WriteOp::Put {
        table: Table::Outbox,
        key: item.id.to_string(),
        partition: item.organization_id.as_str().to_string(),
        value: serde_json::to_string(item)?,
    })
}

pub(crate) fn delete_op(id: &SyncItemId) -> WriteOp {
    WriteOp::Delete {
        table: Table::Outbox,
        key: id.to_string(),
    }
}
