//! Sync error types.

use sgc_storage::StorageError;
use sgc_types::EntityId;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// How the orchestrator treats a failed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Unreachable, timeout, 408/429/5xx. Retried with backoff.
    Transient,
    /// Any other 4xx. Needs manual correction.
    Rejected,
}

/// Errors reported by a [`RemoteGateway`](crate::RemoteGateway).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("network unreachable: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("server error {status}: {body}")]
    Server { status: u16, body: String },

    #[error("rejected with {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Protocol(String),
}

impl GatewayError {
    /// Maps a non-success HTTP status to a gateway error.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            408 | 429 | 500..=599 => GatewayError::Server { status, body },
            400..=499 => GatewayError::Rejected { status, body },
            _ => GatewayError::Protocol(format!("status {status}: {body}")),
        }
    }

    pub fn class(&self) -> FailureClass {
        match self {
            GatewayError::Rejected { .. } => FailureClass::Rejected,
            GatewayError::Network(_)
            | GatewayError::Timeout
            | GatewayError::Server { .. }
            | GatewayError::Protocol(_) => FailureClass::Transient,
        }
    }

    /// HTTP status, when the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Server { status, .. } | GatewayError::Rejected { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

/// Errors that can occur while draining the outbox.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("local storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// The server acknowledged a version that does not follow the item's base.
    #[error(
        "server acknowledged version {server_version} for entity {entity_id} built on version {base_version}"
    )]
    Reconcile {
        entity_id: EntityId,
        base_version: u64,
        server_version: u64,
    },

    #[error("background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(e: tokio::task::JoinError) -> Self {
        SyncError::Task(e.to_string())
    }
}
