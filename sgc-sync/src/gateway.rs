//! Remote gateway seam.

use crate::error::GatewayError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sgc_types::{EntityId, OrganizationId, SyncItemKind, SyncQueueItem, VendorId};

/// One delivery attempt of a queued item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRequest {
    pub organization_id: OrganizationId,
    #[serde(rename = "vendedorId")]
    pub vendor_id: VendorId,
    #[serde(rename = "tipo")]
    pub kind: SyncItemKind,
    pub payload: serde_json::Value,
    pub idempotency_key: String,
    pub entity_id: EntityId,
    pub base_version: u64,
}

impl GatewayRequest {
    pub fn for_item(item: &SyncQueueItem, vendor_id: &VendorId) -> Self {
        Self {
            organization_id: item.organization_id.clone(),
            vendor_id: vendor_id.clone(),
            kind: item.kind,
            payload: item.payload.clone(),
            idempotency_key: item.idempotency_key(),
            entity_id: item.entity_id,
            base_version: item.base_version,
        }
    }
}

/// Server acknowledgement of an accepted item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayAck {
    pub entity_id: EntityId,
    pub version: u64,
    pub synced_at: DateTime<Utc>,
    /// The server's view of the entity after applying the item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// Backend surface accepting mutations scoped by organization and vendor.
///
/// Implementations must deduplicate by `idempotency_key`: a repeated key
/// returns the original acknowledgement without applying the item again.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    async fn submit(&self, request: GatewayRequest) -> Result<GatewayAck, GatewayError>;
}
