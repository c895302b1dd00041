//! The file store itself: local-first blob cache, offline upload queue,
//! lazy fetch-and-decrypt download path, and LRU eviction over the cached
//! bytes.
//!
//! Always-on: `put`/`get` work against the local stores before any space
//! is ever connected to sync. `process_queue`/`invalidate` progressively
//! flush queued uploads once a [`crate::remote::FileTransport`] is wired
//! up.

use crate::cache::LinearEpochCache;
use crate::key::FileKey;
use crate::meta::{FileMeta, UploadState, UploadStatus};
use crate::remote::{EnsureSynced, FileTransport};
use crate::store::LocalBlobStore;
use async_lock::Mutex as AsyncMutex;
use betterbase_core::{Result, SpaceId, SyncError};
use betterbase_crypto::aead::{self, Aad};
use betterbase_crypto::dek::{generate_dek, peek_epoch, unwrap_dek, wrap_dek};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// How many consecutive upload failures a queued file tolerates before it
/// is left in `error` state for a caller to inspect rather than retried
/// forever inside `process_queue`.
pub const DEFAULT_MAX_UPLOAD_ATTEMPTS: u32 = 8;

fn now_millis() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_millis() as i64
}

pub struct FileStoreConfig {
    pub space_id: SpaceId,
    pub base_epoch: u32,
    pub base_key: [u8; 32],
    pub max_cache_bytes: Option<u64>,
    pub max_upload_attempts: u32,
}

pub struct FileStore {
    space_id: SpaceId,
    storage: Arc<dyn LocalBlobStore>,
    transport: Arc<dyn FileTransport>,
    ensure_synced: Arc<dyn EnsureSynced>,
    epoch_cache: Mutex<LinearEpochCache>,
    max_cache_bytes: Option<u64>,
    max_upload_attempts: u32,

    upload_lock: AsyncMutex<()>,
    upload_dirty: AtomicBool,

    eviction_lock: AsyncMutex<()>,
    eviction_dirty: AtomicBool,

    download_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl FileStore {
    pub fn new(
        config: FileStoreConfig,
        storage: Arc<dyn LocalBlobStore>,
        transport: Arc<dyn FileTransport>,
        ensure_synced: Arc<dyn EnsureSynced>,
    ) -> Self {
        Self {
            epoch_cache: Mutex::new(LinearEpochCache::new(config.space_id.as_str().to_string(), config.base_epoch, &config.base_key)),
            space_id: config.space_id,
            storage,
            transport,
            ensure_synced,
            max_cache_bytes: config.max_cache_bytes,
            max_upload_attempts: config.max_upload_attempts,
            upload_lock: AsyncMutex::new(()),
            upload_dirty: AtomicBool::new(false),
            eviction_lock: AsyncMutex::new(()),
            eviction_dirty: AtomicBool::new(false),
            download_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Forward the epoch cache to `epoch` ahead of the next upload, e.g.
    /// after the space manager observes a rotation complete.
    pub fn advance_epoch(&self, epoch: u32) -> Result<()> {
        self.epoch_cache.lock().advance_to(epoch)?;
        Ok(())
    }

    /// Always succeeds by writing straight to the local stores. If
    /// `record_id` is given the file is queued for upload.
    pub async fn put(&self, file_id: &str, data: Vec<u8>, record_id: Option<String>) -> Result<()> {
        let key = FileKey::new(self.space_id.clone(), file_id);
        let len = data.len() as u64;
        self.storage.put_blob(&key, &data).await?;
        let upload = record_id.map(|record_id| UploadState { status: UploadStatus::Pending, attempts: 0, record_id });
        self.storage.put_meta(&FileMeta { key, len, last_accessed: now_millis(), upload }).await?;
        self.enforce_cache_limit().await;
        Ok(())
    }

    /// Reads the local cache first; on a miss, fetches and decrypts from
    /// the server, single-flight per file id. `Ok(None)` means the file
    /// does not exist server-side either.
    pub async fn get(&self, file_id: &str) -> Result<Option<Vec<u8>>> {
        let key = FileKey::new(self.space_id.clone(), file_id);
        if let Some(data) = self.storage.get_blob(&key).await? {
            self.touch(&key).await?;
            return Ok(Some(data));
        }

        match self.fetch_and_cache(&key).await {
            Ok(data) => Ok(Some(data)),
            Err(SyncError::NotFound { .. }) => Ok(None),
            Err(error) => Err(error),
        }
    }

    async fn touch(&self, key: &FileKey) -> Result<()> {
        if let Some(mut meta) = self.storage.get_meta(key).await? {
            meta.last_accessed = now_millis();
            self.storage.put_meta(&meta).await?;
        }
        Ok(())
    }

    async fn fetch_and_cache(&self, key: &FileKey) -> Result<Vec<u8>> {
        let lock = {
            let mut locks = self.download_locks.lock();
            locks.entry(key.file_id.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
        };
        let _guard = lock.lock().await;

        // Another waiter may have completed the fetch while we queued for
        // the lock.
        if let Some(data) = self.storage.get_blob(key).await? {
            self.download_locks.lock().remove(&key.file_id);
            return Ok(data);
        }

        let result = self.download_and_decrypt(key).await;
        self.download_locks.lock().remove(&key.file_id);
        let plaintext = result?;

        self.storage.put_blob(key, &plaintext).await?;
        self.storage
            .put_meta(&FileMeta { key: key.clone(), len: plaintext.len() as u64, last_accessed: now_millis(), upload: None })
            .await?;
        self.enforce_cache_limit().await;
        Ok(plaintext)
    }

    async fn download_and_decrypt(&self, key: &FileKey) -> Result<Vec<u8>> {
        let (ciphertext, wrapped) = self.transport.download(&self.space_id, &key.file_id).await?;
        let epoch = peek_epoch(&wrapped)?;
        let kek = self.epoch_cache.lock().advance_to(epoch)?;
        let (dek, _) = unwrap_dek(&wrapped, &kek)?;
        aead::decrypt(&ciphertext, &dek, &Aad::Record { space_id: self.space_id.as_str(), record_id: &key.file_id })
    }

    /// Drive every `pending`/`error` entry through upload. Single-flight:
    /// a call while one is already running just marks the in-flight pass
    /// dirty so it loops once more before returning, rather than running
    /// two passes concurrently.
    pub async fn process_queue(&self) -> Result<()> {
        let Some(_guard) = self.upload_lock.try_lock() else {
            self.upload_dirty.store(true, Ordering::SeqCst);
            return Ok(());
        };
        loop {
            self.upload_dirty.store(false, Ordering::SeqCst);
            self.run_queue_pass().await?;
            if !self.upload_dirty.load(Ordering::SeqCst) {
                return Ok(());
            }
        }
    }

    /// Signal that queue processing should (re)start, e.g. the network
    /// came back up. Equivalent to calling [`Self::process_queue`] again.
    pub async fn invalidate(&self) -> Result<()> {
        self.process_queue().await
    }

    async fn run_queue_pass(&self) -> Result<()> {
        let entries: Vec<FileMeta> = self
            .storage
            .list_meta()
            .await?
            .into_iter()
            .filter(|m| m.key.space_id == self.space_id)
            .filter(|m| matches!(m.upload.as_ref().map(|u| u.status), Some(UploadStatus::Pending) | Some(UploadStatus::Error)))
            .collect();

        for meta in entries {
            if let Err(error) = self.upload_one(meta).await {
                tracing::warn!(%error, "file upload attempt failed");
            }
        }
        Ok(())
    }

    async fn upload_one(&self, mut meta: FileMeta) -> Result<()> {
        let Some(mut state) = meta.upload.clone() else { return Ok(()) };
        if state.attempts >= self.max_upload_attempts {
            return Ok(());
        }

        state.status = UploadStatus::Uploading;
        meta.upload = Some(state.clone());
        self.storage.put_meta(&meta).await?;

        let outcome = self.try_upload(&meta.key, &state.record_id).await;
        match outcome {
            Ok(()) => {
                meta.upload = None;
                self.storage.put_meta(&meta).await?;
            }
            Err(error) => {
                state.status = UploadStatus::Error;
                state.attempts += 1;
                meta.upload = Some(state);
                self.storage.put_meta(&meta).await?;
                return Err(error);
            }
        }
        Ok(())
    }

    async fn try_upload(&self, key: &FileKey, record_id: &str) -> Result<()> {
        self.ensure_synced.ensure_synced(record_id).await?;
        let data = self
            .storage
            .get_blob(key)
            .await?
            .ok_or_else(|| SyncError::internal("queued file has no cached blob"))?;

        let dek = generate_dek();
        let ciphertext = aead::encrypt(&data, &dek, &Aad::Record { space_id: self.space_id.as_str(), record_id: &key.file_id })?;
        let (epoch, kek) = {
            let cache = self.epoch_cache.lock();
            (cache.epoch(), cache.current_kek())
        };
        let wrapped = wrap_dek(&dek, &kek, epoch)?;
        // `dek` drops (and zeroes) here regardless of the upload's outcome.

        self.transport.upload(&self.space_id, &key.file_id, ciphertext, wrapped.to_vec()).await
    }

    /// Evict oldest-accessed entries with no pending upload until
    /// `max_cache_bytes` is satisfied. Coalesced like `process_queue`.
    async fn enforce_cache_limit(&self) {
        let Some(limit) = self.max_cache_bytes else { return };
        let Some(_guard) = self.eviction_lock.try_lock() else {
            self.eviction_dirty.store(true, Ordering::SeqCst);
            return;
        };
        loop {
            self.eviction_dirty.store(false, Ordering::SeqCst);
            if let Err(error) = self.run_eviction_pass(limit).await {
                tracing::warn!(%error, "cache eviction pass failed");
            }
            if !self.eviction_dirty.load(Ordering::SeqCst) {
                return;
            }
        }
    }

    async fn run_eviction_pass(&self, limit: u64) -> Result<()> {
        let mut entries: Vec<FileMeta> = self.storage.list_meta().await?.into_iter().filter(|m| m.key.space_id == self.space_id).collect();
        let mut total: u64 = entries.iter().map(|m| m.len).sum();
        if total <= limit {
            return Ok(());
        }

        entries.sort_by_key(|m| m.last_accessed);
        for meta in entries {
            if total <= limit {
                break;
            }
            if meta.upload.is_some() {
                continue;
            }
            self.storage.delete_blob(&meta.key).await?;
            self.storage.delete_meta(&meta.key).await?;
            total = total.saturating_sub(meta.len);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use betterbase_crypto::epoch::derive_forward;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct InMemoryStore {
        meta: Mutex<HashMap<String, FileMeta>>,
        blobs: Mutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl LocalBlobStore for InMemoryStore {
        async fn get_meta(&self, key: &FileKey) -> Result<Option<FileMeta>> {
            Ok(self.meta.lock().get(&key.compound()).cloned())
        }
        async fn put_meta(&self, meta: &FileMeta) -> Result<()> {
            self.meta.lock().insert(meta.key.compound(), meta.clone());
            Ok(())
        }
        async fn delete_meta(&self, key: &FileKey) -> Result<()> {
            self.meta.lock().remove(&key.compound());
            Ok(())
        }
        async fn list_meta(&self) -> Result<Vec<FileMeta>> {
            Ok(self.meta.lock().values().cloned().collect())
        }
        async fn get_blob(&self, key: &FileKey) -> Result<Option<Vec<u8>>> {
            Ok(self.blobs.lock().get(&key.compound()).cloned())
        }
        async fn put_blob(&self, key: &FileKey, data: &[u8]) -> Result<()> {
            self.blobs.lock().insert(key.compound(), data.to_vec());
            Ok(())
        }
        async fn delete_blob(&self, key: &FileKey) -> Result<()> {
            self.blobs.lock().remove(&key.compound());
            Ok(())
        }
    }

    struct FakeTransport {
        uploads: StdMutex<Vec<(String, Vec<u8>, Vec<u8>)>>,
        remote: StdMutex<HashMap<String, (Vec<u8>, Vec<u8>)>>,
    }

    impl FakeTransport {
        fn new() -> Self {
            Self { uploads: StdMutex::new(Vec::new()), remote: StdMutex::new(HashMap::new()) }
        }
    }

    #[async_trait]
    impl FileTransport for FakeTransport {
        async fn upload(&self, _space_id: &SpaceId, file_id: &str, ciphertext: Vec<u8>, wrapped_dek: Vec<u8>) -> Result<()> {
            self.uploads.lock().unwrap().push((file_id.to_string(), ciphertext.clone(), wrapped_dek.clone()));
            self.remote.lock().unwrap().insert(file_id.to_string(), (ciphertext, wrapped_dek));
            Ok(())
        }
        async fn download(&self, _space_id: &SpaceId, file_id: &str) -> Result<(Vec<u8>, Vec<u8>)> {
            self.remote.lock().unwrap().get(file_id).cloned().ok_or_else(|| SyncError::not_found("no such file"))
        }
    }

    struct NoopSync;

    #[async_trait]
    impl EnsureSynced for NoopSync {
        async fn ensure_synced(&self, _record_id: &str) -> Result<()> {
            Ok(())
        }
    }

    struct CountingSync(AtomicU32);

    #[async_trait]
    impl EnsureSynced for CountingSync {
        async fn ensure_synced(&self, _record_id: &str) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn store(max_cache_bytes: Option<u64>) -> (Arc<InMemoryStore>, Arc<FakeTransport>, FileStore) {
        let storage = Arc::new(InMemoryStore::default());
        let transport = Arc::new(FakeTransport::new());
        let config = FileStoreConfig { space_id: SpaceId::from("space-1"), base_epoch: 1, base_key: [7u8; 32], max_cache_bytes, max_upload_attempts: DEFAULT_MAX_UPLOAD_ATTEMPTS };
        let fs = FileStore::new(config, storage.clone(), transport.clone(), Arc::new(NoopSync));
        (storage, transport, fs)
    }

    #[tokio::test]
    async fn put_then_get_round_trips_without_a_server() {
        let (_storage, _transport, fs) = store(None);
        fs.put("file-1", b"hello".to_vec(), None).await.unwrap();
        let data = fs.get("file-1").await.unwrap();
        assert_eq!(data, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn get_on_unknown_file_returns_none() {
        let (_storage, _transport, fs) = store(None);
        assert_eq!(fs.get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn queued_upload_encrypts_wraps_and_clears_state() {
        let (storage, transport, fs) = store(None);
        fs.put("file-1", b"secret".to_vec(), Some("record-1".to_string())).await.unwrap();
        fs.process_queue().await.unwrap();

        let uploads = transport.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(peek_epoch(&uploads[0].2).unwrap(), 1);

        let key = FileKey::new(SpaceId::from("space-1"), "file-1");
        let meta = storage.get_meta(&key).await.unwrap().unwrap();
        assert!(meta.upload.is_none());
    }

    #[tokio::test]
    async fn ensure_synced_runs_before_upload() {
        let storage = Arc::new(InMemoryStore::default());
        let transport = Arc::new(FakeTransport::new());
        let counter = Arc::new(CountingSync(AtomicU32::new(0)));
        let config = FileStoreConfig { space_id: SpaceId::from("space-1"), base_epoch: 1, base_key: [7u8; 32], max_cache_bytes: None, max_upload_attempts: DEFAULT_MAX_UPLOAD_ATTEMPTS };
        let fs = FileStore::new(config, storage, transport, counter.clone());
        fs.put("file-1", b"secret".to_vec(), Some("record-1".to_string())).await.unwrap();
        fs.process_queue().await.unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn download_decrypts_via_forward_derived_kek() {
        let (storage, transport, fs) = store(None);

        // Seed the "server" with a blob wrapped under an epoch ahead of
        // the store's base, as a second client's upload would produce.
        let target_epoch = 3;
        let forward_key = derive_forward(&[7u8; 32], "space-1", 1, target_epoch).unwrap();
        let plaintext = b"remote bytes".to_vec();
        let dek = generate_dek();
        let ciphertext = aead::encrypt(&plaintext, &dek, &Aad::Record { space_id: "space-1", record_id: "remote-file" }).unwrap();
        let wrapped = wrap_dek(&dek, &forward_key, target_epoch).unwrap();
        transport.remote.lock().unwrap().insert("remote-file".to_string(), (ciphertext, wrapped.to_vec()));

        let fetched = fs.get("remote-file").await.unwrap();
        assert_eq!(fetched, Some(plaintext));

        let key = FileKey::new(SpaceId::from("space-1"), "remote-file");
        assert_eq!(storage.get_blob(&key).await.unwrap(), Some(b"remote bytes".to_vec()));
    }

    #[tokio::test]
    async fn eviction_skips_pinned_queued_files() {
        let (storage, _transport, fs) = store(Some(10));
        fs.put("queued", vec![0u8; 8], Some("record-1".to_string())).await.unwrap();
        fs.put("plain", vec![0u8; 8], None).await.unwrap();

        let queued_key = FileKey::new(SpaceId::from("space-1"), "queued");
        let plain_key = FileKey::new(SpaceId::from("space-1"), "plain");
        assert!(storage.get_blob(&queued_key).await.unwrap().is_some());
        assert!(storage.get_blob(&plain_key).await.unwrap().is_none());
    }
}
