//! AEAD wrapping of membership log payloads under the space key.

use betterbase_core::SyncError;
use betterbase_crypto::aead::{self, Aad};

/// Encrypt a membership payload for `(space_id, chain_seq)`.
pub fn encrypt(payload: &str, key: &[u8; 32], space_id: &str, chain_seq: u64) -> Result<Vec<u8>, SyncError> {
    aead::encrypt(payload.as_bytes(), key, &Aad::Membership { space_id, chain_seq })
}

/// Decrypt a membership payload, rejecting ciphertext bound to a different
/// space or chain position.
pub fn decrypt(ciphertext: &[u8], key: &[u8; 32], space_id: &str, chain_seq: u64) -> Result<String, SyncError> {
    let plaintext = aead::decrypt(ciphertext, key, &Aad::Membership { space_id, chain_seq })?;
    String::from_utf8(plaintext).map_err(|e| SyncError::invalid_membership(format!("UTF-8 decode: {e}")))
}
