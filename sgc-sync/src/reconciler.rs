//! Absorbs server acknowledgements into the local entity store.
//!
//! The server wins for everything it has confirmed; local mutations still
//! queued for the same entity win over it. After an acknowledgement the
//! stored payload is the server payload with every later queued patch
//! replayed on top, in queue order, and each later item is rebased so that
//! its own acknowledgement follows directly.

use crate::error::{SyncError, SyncResult};
use crate::gateway::GatewayAck;
use serde::Serialize;
use sgc_storage::{LocalStore, ServerState};
use sgc_types::{SyncQueueItem, apply_all};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum ReconcileOutcome {
    /// Server state absorbed as-is; nothing else was queued for the entity.
    Applied { version: u64 },
    /// Later queued mutations were replayed onto the server state.
    Merged { version: u64, replayed: usize },
    /// No entity row (attachments): only the delivery is confirmed.
    Untracked,
}

#[derive(Clone)]
pub struct Reconciler {
    store: LocalStore,
}

impl Reconciler {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// Applies `ack` for `item` and removes the item from the outbox, in one
    /// storage batch. On error nothing is written and the item stays queued.
    ///
    /// Holds the store's write lock from the first read to the commit, so
    /// captures made meanwhile wait and then build on the confirmed state.
    pub fn reconcile(&self, item: &SyncQueueItem, ack: &GatewayAck) -> SyncResult<ReconcileOutcome> {
        let tx = self.store.lock_writes();
        let Some(local) = tx.entities().get(&item.entity_id)? else {
            tx.confirm(&item.id, None, &[])?;
            debug!("{} item {} delivered", item.kind, item.id);
            return Ok(ReconcileOutcome::Untracked);
        };

        if ack.version <= item.base_version {
            return Err(SyncError::Reconcile {
                entity_id: item.entity_id,
                base_version: item.base_version,
                server_version: ack.version,
            });
        }

        let later: Vec<SyncQueueItem> = tx
            .outbox()
            .pending_for_entity(&item.organization_id, &item.entity_id)?
            .into_iter()
            .filter(|queued| queued.id != item.id)
            .collect();

        let version = (ack.version + later.len() as u64).max(local.version);
        let data = match (&ack.payload, later.is_empty()) {
            (Some(server), _) => Some(apply_all(server, later.iter().map(|q| &q.payload))),
            (None, false) => Some(apply_all(&local.data, later.iter().map(|q| &q.payload))),
            (None, true) => None,
        };

        let rebased: Vec<SyncQueueItem> = later
            .iter()
            .enumerate()
            .filter_map(|(i, queued)| {
                let base_version = ack.version + i as u64;
                (queued.base_version != base_version).then(|| {
                    let mut queued = queued.clone();
                    queued.base_version = base_version;
                    queued
                })
            })
            .collect();

        let direct = ack.version == item.base_version + 1;
        tx.confirm(
            &item.id,
            Some(ServerState {
                entity_id: item.entity_id,
                version,
                synced_at: ack.synced_at,
                data,
            }),
            &rebased,
        )?;

        if later.is_empty() {
            if !direct {
                info!(
                    "entity {} jumped from v{} to server v{}",
                    item.entity_id, item.base_version, ack.version
                );
            }
            Ok(ReconcileOutcome::Applied { version })
        } else {
            debug!(
                "entity {}: replayed {} queued mutations onto server v{}",
                item.entity_id,
                later.len(),
                ack.version
            );
            Ok(ReconcileOutcome::Merged {
                version,
                replayed: later.len(),
            })
        }
    }
}
