//! Unpadded URL-safe base64, used for JWT segments and signature fields.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use betterbase_core::SyncError;

/// Encode bytes as unpadded URL-safe base64.
pub fn encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decode unpadded URL-safe base64.
pub fn decode(data: &str) -> Result<Vec<u8>, SyncError> {
    URL_SAFE_NO_PAD
        .decode(data)
        .map_err(|e| SyncError::serialization(format!("base64url decode: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let data = b"hello world";
        let encoded = encode(data);
        assert!(!encoded.contains('='));
        assert_eq!(decode(&encoded).unwrap(), data);
    }
}
