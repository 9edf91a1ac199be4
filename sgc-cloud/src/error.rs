//! Cloud gateway error types.

use thiserror::Error;

/// Result type for gateway setup.
pub type CloudResult<T> = Result<T, CloudError>;

/// Errors raised while building or configuring the HTTP gateway. Delivery
/// failures are reported as [`sgc_sync::GatewayError`] instead.
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}
