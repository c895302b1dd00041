//! CBOR envelope carried inside a channel's AEAD ciphertext: the sender,
//! the replay sequence, and the caller's payload.

use betterbase_core::{Result, SyncError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelEnvelope {
    pub sender_did: String,
    pub seq: u64,
    #[serde(with = "serde_bytes_compat")]
    pub payload: Vec<u8>,
}

/// `serde_cbor` handles `Vec<u8>` as a CBOR array of integers by default;
/// encode it as a byte string instead so payloads don't balloon.
mod serde_bytes_compat {
    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serde_bytes::serialize(bytes, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        serde_bytes::deserialize(deserializer)
    }
}

pub fn encode(envelope: &ChannelEnvelope) -> Result<Vec<u8>> {
    serde_cbor::to_vec(envelope).map_err(|e| SyncError::serialization(format!("channel envelope encode: {e}")))
}

pub fn decode(bytes: &[u8]) -> Result<ChannelEnvelope> {
    serde_cbor::from_slice(bytes).map_err(|e| SyncError::serialization(format!("channel envelope decode: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let envelope = ChannelEnvelope { sender_did: "did:key:abc".to_string(), seq: 3, payload: vec![1, 2, 3] };
        let bytes = encode(&envelope).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.sender_did, envelope.sender_did);
        assert_eq!(decoded.seq, envelope.seq);
        assert_eq!(decoded.payload, envelope.payload);
    }
}
