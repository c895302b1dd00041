//! Data-encryption-key generation and epoch-prefixed AES-KW wrapping.
//!
//! Wrapped form: `[4-byte big-endian epoch u32 ‖ 40-byte AES-KW(K_epoch, DEK)]`,
//! 44 bytes total. The epoch prefix is the only plaintext metadata needed to
//! unwrap a DEK — it tells the reader which KEK to derive.

use aes_kw::KekAes256;
use betterbase_core::SyncError;
use rand_core::RngCore;
use zeroize::Zeroizing;

const EPOCH_PREFIX_LEN: usize = 4;
const WRAPPED_DEK_LEN: usize = EPOCH_PREFIX_LEN + 40;

/// A freshly generated, zeroize-on-drop data encryption key.
pub type Dek = Zeroizing<[u8; 32]>;

/// Generate a fresh random 32-byte DEK.
pub fn generate_dek() -> Dek {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    Zeroizing::new(bytes)
}

/// Wrap `dek` under `kek` for `epoch`, producing the 44-byte wire format.
pub fn wrap_dek(dek: &[u8; 32], kek: &[u8; 32], epoch: u32) -> Result<[u8; WRAPPED_DEK_LEN], SyncError> {
    let kek = KekAes256::from(*kek);
    let mut wrapped = [0u8; 40];
    kek.wrap(dek, &mut wrapped)
        .map_err(|e| SyncError::internal(format!("AES-KW wrap failed: {e}")))?;

    let mut out = [0u8; WRAPPED_DEK_LEN];
    out[..EPOCH_PREFIX_LEN].copy_from_slice(&epoch.to_be_bytes());
    out[EPOCH_PREFIX_LEN..].copy_from_slice(&wrapped);
    Ok(out)
}

/// Read the plaintext epoch prefix of a wrapped DEK without unwrapping it.
pub fn peek_epoch(wrapped: &[u8]) -> Result<u32, SyncError> {
    if wrapped.len() != WRAPPED_DEK_LEN {
        return Err(SyncError::decrypt(format!(
            "wrapped DEK has wrong length: {} (expected {})",
            wrapped.len(),
            WRAPPED_DEK_LEN
        )));
    }
    let mut prefix = [0u8; EPOCH_PREFIX_LEN];
    prefix.copy_from_slice(&wrapped[..EPOCH_PREFIX_LEN]);
    Ok(u32::from_be_bytes(prefix))
}

/// Unwrap a DEK, returning it alongside the epoch it was wrapped under.
pub fn unwrap_dek(wrapped: &[u8], kek: &[u8; 32]) -> Result<(Dek, u32), SyncError> {
    let epoch = peek_epoch(wrapped)?;
    let kek = KekAes256::from(*kek);
    let mut dek = [0u8; 32];
    kek.unwrap(&wrapped[EPOCH_PREFIX_LEN..], &mut dek)
        .map_err(|_| SyncError::decrypt("AES-KW unwrap failed"))?;
    Ok((Zeroizing::new(dek), epoch))
}
