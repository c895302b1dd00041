//! AEAD encryption with additional authenticated data.
//!
//! Wire format (`v4`, the fourth and current envelope revision the source
//! protocol went through): `[0x04 ‖ 12-byte nonce ‖ ciphertext+tag]`. The AAD
//! is never embedded in the ciphertext; it is recomputed by the caller and
//! must match exactly or the GCM tag check fails closed.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use betterbase_core::SyncError;
use rand_core::RngCore;

/// Version byte prefixed to every ciphertext produced by [`encrypt`].
const ENVELOPE_VERSION: u8 = 4;
const NONCE_LEN: usize = 12;

/// Binds ciphertext to the context it was produced for so it cannot be
/// relocated between records, spaces, or channels.
pub enum Aad<'a> {
    /// `spaceId ‖ 0x00 ‖ recordId`, for per-record blobs.
    Record { space_id: &'a str, record_id: &'a str },
    /// `spaceId ‖ 0x00 ‖ "presence"` or `"event"`, for channel messages.
    Channel { space_id: &'a str, channel: &'a str },
    /// `spaceId ‖ 0x00 ‖ str(chain_seq)`, for membership log payloads.
    Membership { space_id: &'a str, chain_seq: u64 },
}

impl<'a> Aad<'a> {
    /// Render the AAD to its canonical byte form.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Aad::Record { space_id, record_id } => {
                let mut out = Vec::with_capacity(space_id.len() + 1 + record_id.len());
                out.extend_from_slice(space_id.as_bytes());
                out.push(0);
                out.extend_from_slice(record_id.as_bytes());
                out
            }
            Aad::Channel { space_id, channel } => {
                let mut out = Vec::with_capacity(space_id.len() + 1 + channel.len());
                out.extend_from_slice(space_id.as_bytes());
                out.push(0);
                out.extend_from_slice(channel.as_bytes());
                out
            }
            Aad::Membership { space_id, chain_seq } => {
                let seq = chain_seq.to_string();
                let mut out = Vec::with_capacity(space_id.len() + 1 + seq.len());
                out.extend_from_slice(space_id.as_bytes());
                out.push(0);
                out.extend_from_slice(seq.as_bytes());
                out
            }
        }
    }
}

/// Encrypt `plaintext` under `key` with the given AAD context.
pub fn encrypt(plaintext: &[u8], key: &[u8; 32], aad: &Aad<'_>) -> Result<Vec<u8>, SyncError> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| SyncError::internal(format!("invalid AEAD key: {e}")))?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let aad_bytes = aad.to_bytes();
    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad: &aad_bytes,
            },
        )
        .map_err(|e| SyncError::decrypt(format!("AEAD encrypt failed: {e}")))?;

    let mut out = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
    out.push(ENVELOPE_VERSION);
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a blob produced by [`encrypt`]; the AAD must match exactly.
pub fn decrypt(blob: &[u8], key: &[u8; 32], aad: &Aad<'_>) -> Result<Vec<u8>, SyncError> {
    if blob.len() < 1 + NONCE_LEN {
        return Err(SyncError::decrypt("envelope shorter than header"));
    }
    if blob[0] != ENVELOPE_VERSION {
        return Err(SyncError::decrypt(format!(
            "unsupported envelope version {}",
            blob[0]
        )));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| SyncError::internal(format!("invalid AEAD key: {e}")))?;
    let nonce = Nonce::from_slice(&blob[1..1 + NONCE_LEN]);
    let ciphertext = &blob[1 + NONCE_LEN..];
    let aad_bytes = aad.to_bytes();

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad: &aad_bytes,
            },
        )
        .map_err(|_| SyncError::decrypt("AEAD tag mismatch"))
}
