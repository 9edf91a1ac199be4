//! Storage error types.

use sgc_types::EntityId;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by the storage port, the entity store and the outbox.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    /// A write tried to replace a newer stored version with an older one.
    #[error("stale write for entity {entity_id}: stored version {stored}, attempted {attempted}")]
    StaleWrite {
        entity_id: EntityId,
        stored: u64,
        attempted: u64,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("record belongs to another organization: {0}")]
    TenantMismatch(String),

    /// The backend cannot be used at all (poisoned lock, quota, closed db).
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}
