//! The files endpoint a file store drives: upload a wrapped/encrypted blob,
//! download one back. A miss is [`betterbase_core::SyncError::NotFound`],
//! which [`crate::manager::FileStore::get`] turns into `Ok(None)` rather
//! than propagating.

use async_trait::async_trait;
use betterbase_core::{Result, SpaceId};

#[async_trait]
pub trait FileTransport: Send + Sync {
    async fn upload(&self, space_id: &SpaceId, file_id: &str, ciphertext: Vec<u8>, wrapped_dek: Vec<u8>) -> Result<()>;

    /// Returns `(ciphertext, wrapped_dek)`.
    async fn download(&self, space_id: &SpaceId, file_id: &str) -> Result<(Vec<u8>, Vec<u8>)>;
}

/// Confirms the CRDT record a file attaches to has reached the server
/// before the file itself is uploaded, so a file never outlives (or
/// outraces) the record that references it.
#[async_trait]
pub trait EnsureSynced: Send + Sync {
    async fn ensure_synced(&self, record_id: &str) -> Result<()>;
}
