//! Locally stored domain entities.

use crate::ids::{EntityId, OrganizationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Entity kinds the field-sales app mirrors locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    #[serde(rename = "cliente")]
    Client,
    #[serde(rename = "visita")]
    Visit,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Client => "cliente",
            EntityKind::Visit => "visita",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A versioned business record owned by one organization.
///
/// `version` is 0 for an entity that has never been persisted; the entity
/// store assigns 1 on first write and bumps it on every local mutation.
/// `last_sync_at` stays `None` until the server has confirmed a write.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: EntityId,
    #[serde(rename = "tipo")]
    pub kind: EntityKind,
    pub organization_id: OrganizationId,
    pub version: u64,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub data: serde_json::Value,
}

impl Entity {
    /// Creates an unsaved entity with a fresh id.
    pub fn new(kind: EntityKind, organization_id: OrganizationId, data: serde_json::Value) -> Self {
        Self {
            id: EntityId::new(),
            kind,
            organization_id,
            version: 0,
            last_sync_at: None,
            data,
        }
    }

    /// True once the server has accepted at least one write of this entity.
    pub fn has_synced(&self) -> bool {
        self.last_sync_at.is_some()
    }

    /// Reads a string field by JSON pointer (e.g. `/nombre`).
    pub fn get_str(&self, pointer: &str) -> Option<&str> {
        self.data.pointer(pointer).and_then(|v| v.as_str())
    }
}
