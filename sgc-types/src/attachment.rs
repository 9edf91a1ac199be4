//! Photo and audio attachments captured during a visit.

use crate::error::{TypesError, TypesResult};
use crate::ids::EntityId;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Payload of a `foto`/`audio` outbox item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentPayload {
    /// Visit the attachment belongs to.
    pub visita_id: EntityId,
    pub mime_type: String,
    pub size_bytes: u64,
    /// SHA-256 of the raw bytes, hex encoded.
    pub content_hash: String,
    pub data_base64: String,
}

impl AttachmentPayload {
    pub fn from_bytes(visita_id: EntityId, mime_type: impl Into<String>, data: &[u8]) -> Self {
        Self {
            visita_id,
            mime_type: mime_type.into(),
            size_bytes: data.len() as u64,
            content_hash: hex::encode(Sha256::digest(data)),
            data_base64: STANDARD.encode(data),
        }
    }

    /// Decodes the attachment and checks it against the recorded hash.
    pub fn decode(&self) -> TypesResult<Vec<u8>> {
        let data = STANDARD
            .decode(&self.data_base64)
            .map_err(|e| TypesError::InvalidPayload(format!("attachment base64: {e}")))?;
        let actual = hex::encode(Sha256::digest(&data));
        if actual != self.content_hash {
            return Err(TypesError::HashMismatch {
                expected: self.content_hash.clone(),
                actual,
            });
        }
        Ok(data)
    }

    pub fn to_value(&self) -> TypesResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_value(value: &serde_json::Value) -> TypesResult<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }
}
