//! Versioned entity store.
//!
//! Every local mutation goes through [`EntityStore::put`], which assigns the
//! next version and refuses to overwrite a newer stored copy. Server-confirmed
//! state enters only through [`EntityStore::apply_server_version`].

use crate::error::{StorageError, StorageResult};
use crate::port::{StoragePort, Table, WriteOp};
use chrono::{DateTime, Utc};
use sgc_types::{Entity, EntityId, OrganizationId};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct EntityStore {
    port: Arc<dyn StoragePort>,
}

impl EntityStore {
    pub fn new(port: Arc<dyn StoragePort>) -> Self {
        Self { port }
    }

    /// Persists a local mutation and returns the stored copy.
    ///
    /// `entity.version` must be the version the caller read (0 for a new
    /// entity). The stored copy gets the next version number. A caller
    /// holding an older copy than the one stored gets `StaleWrite`.
    pub fn put(&self, entity: &Entity) -> StorageResult<Entity> {
        let (stored, op) = self.prepare_put(entity)?;
        self.port.write_batch(&[op])?;
        Ok(stored)
    }

    /// Computes the stored copy and the write for a local mutation without
    /// applying it, so callers can commit it together with other writes.
    pub(crate) fn prepare_put(&self, entity: &Entity) -> StorageResult<(Entity, WriteOp)> {
        let current = self.get(&entity.id)?;
        let mut next = entity.clone();

        match current {
            Some(current) => {
                if current.organization_id != entity.organization_id {
                    return Err(StorageError::TenantMismatch(entity.id.to_string()));
                }
                if entity.version < current.version {
                    return Err(StorageError::StaleWrite {
                        entity_id: entity.id,
                        stored: current.version,
                        attempted: entity.version,
                    });
                }
                next.version = entity.version.max(current.version) + 1;
                next.last_sync_at = current.last_sync_at;
            }
            None => {
                next.version = entity.version + 1;
            }
        }

        let op = put_op(&next)?;
        Ok((next, op))
    }

    pub fn get(&self, id: &EntityId) -> StorageResult<Option<Entity>> {
        match self.port.get(Table::Entities, &id.to_string())? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Lists one organization's entities in creation order.
    pub fn list(&self, organization_id: &OrganizationId) -> StorageResult<Vec<Entity>> {
        self.port
            .list_by_index(Table::Entities, organization_id.as_str())?
            .iter()
            .map(|raw| serde_json::from_str(raw).map_err(StorageError::from))
            .collect()
    }

    /// Absorbs server-confirmed state. Reserved for the reconciler.
    ///
    /// Bypasses the increment path but still never lowers the stored version.
    /// `data`, when given, replaces the stored payload.
    pub fn apply_server_version(
        &self,
        id: &EntityId,
        version: u64,
        synced_at: DateTime<Utc>,
        data: Option<serde_json::Value>,
    ) -> StorageResult<Entity> {
        let (entity, op) = self.prepare_server_version(id, version, synced_at, data)?;
        self.port.write_batch(&[op])?;
        debug!("entity {id} absorbed server version {version}");
        Ok(entity)
    }

    pub(crate) fn prepare_server_version(
        &self,
        id: &EntityId,
        version: u64,
        synced_at: DateTime<Utc>,
        data: Option<serde_json::Value>,
    ) -> StorageResult<(Entity, WriteOp)> {
        let mut entity = self
            .get(id)?
            .ok_or_else(|| StorageError::NotFound(format!("entity {id}")))?;

        if version < entity.version {
            return Err(StorageError::StaleWrite {
                entity_id: *id,
                stored: entity.version,
                attempted: version,
            });
        }

        entity.version = version;
        entity.last_sync_at = Some(synced_at);
        if let Some(data) = data {
            entity.data = data;
        }

        let op = put_op(&entity)?;
        Ok((entity, op))
    }
}

fn put_op(entity: &Entity) -> StorageResult<WriteOp> {
    Ok(WriteOp::Put {
        table: Table::Entities,
        key: entity.id.to_string(),
        partition: entity.organization_id.as_str().to_string(),
        value: serde_json::to_string(entity)?,
    })
}
