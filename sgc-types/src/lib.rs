//! Core types for the SGC field-sales sync engine.
//!
//! Shared by the storage layer, the sync orchestrator, and the HTTP gateway:
//! - Identifier newtypes (entities, outbox items, tenants, vendors)
//! - Versioned entities mirrored on the device
//! - Outbox items with their `Pending | Syncing | Error` status machine
//! - JSON merge patch used to apply and replay visit mutations
//! - Attachment payloads for photos and audio notes

mod attachment;
mod entity;
mod error;
mod ids;
mod patch;
mod queue;

pub use attachment::AttachmentPayload;
pub use entity::{Entity, EntityKind};
pub use error::{TypesError, TypesResult};
pub use ids::{EntityId, OrganizationId, SyncItemId, VendorId};
pub use patch::{apply_all, merge_patch};
pub use queue::{SyncFailure, SyncItemKind, SyncItemStatus, SyncQueueItem};
