//! The CBOR-encoded record envelope.

use betterbase_core::SyncError;
use serde::{Deserialize, Serialize};

/// `{c: collection, v: version, crdt: bytes, h?: edit-chain-json}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobEnvelope {
    /// Collection name.
    pub c: String,
    /// Schema version.
    pub v: u64,
    /// Opaque CRDT payload bytes.
    #[serde(with = "serde_bytes")]
    pub crdt: Vec<u8>,
    /// Optional signed edit-chain entry, JSON-encoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub h: Option<String>,
}

/// CBOR-encode an envelope.
pub fn encode_envelope(envelope: &BlobEnvelope) -> Result<Vec<u8>, SyncError> {
    serde_cbor::to_vec(envelope).map_err(|e| SyncError::serialization(format!("CBOR encode: {e}")))
}

/// CBOR-decode an envelope.
pub fn decode_envelope(bytes: &[u8]) -> Result<BlobEnvelope, SyncError> {
    serde_cbor::from_slice(bytes).map_err(|e| SyncError::decrypt(format!("CBOR decode: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let envelope = BlobEnvelope {
            c: "tasks".to_string(),
            v: 1,
            crdt: vec![1, 2, 3],
            h: None,
        };
        let bytes = encode_envelope(&envelope).unwrap();
        let decoded = decode_envelope(&bytes).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn preserves_edit_chain() {
        let envelope = BlobEnvelope {
            c: "notes".to_string(),
            v: 2,
            crdt: vec![9],
            h: Some("chain".to_string()),
        };
        let bytes = encode_envelope(&envelope).unwrap();
        let decoded = decode_envelope(&bytes).unwrap();
        assert_eq!(decoded.h.as_deref(), Some("chain"));
    }
}
