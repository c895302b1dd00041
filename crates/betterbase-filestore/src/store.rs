//! Local persistence the file store drives: a `meta` row per cached file,
//! and the blob bytes themselves, kept in separate stores but addressed by
//! the same [`FileKey`].

use crate::key::FileKey;
use crate::meta::FileMeta;
use async_trait::async_trait;
use betterbase_core::Result;

#[async_trait]
pub trait LocalBlobStore: Send + Sync {
    async fn get_meta(&self, key: &FileKey) -> Result<Option<FileMeta>>;
    async fn put_meta(&self, meta: &FileMeta) -> Result<()>;
    async fn delete_meta(&self, key: &FileKey) -> Result<()>;
    /// Every cached row, for LRU accounting and queue scans. Scoped to one
    /// space by the caller filtering on [`FileKey::space_id`].
    async fn list_meta(&self) -> Result<Vec<FileMeta>>;

    async fn get_blob(&self, key: &FileKey) -> Result<Option<Vec<u8>>>;
    async fn put_blob(&self, key: &FileKey, data: &[u8]) -> Result<()>;
    async fn delete_blob(&self, key: &FileKey) -> Result<()>;
}
