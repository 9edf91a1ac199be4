//! Errors raised while building or decoding core types.

use thiserror::Error;

pub type TypesResult<T> = Result<T, TypesError>;

#[derive(Debug, Error)]
pub enum TypesError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("content hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
