//! A 5-minute TTL cache in front of [`AccountsDirectory`], so repeated
//! invites to the same handle don't re-hit the accounts service.

use crate::server::{AccountsDirectory, RecipientInfo};
use betterbase_core::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

const CACHE_TTL: Duration = Duration::from_secs(300);

pub struct AccountsCache {
    inner: Arc<dyn AccountsDirectory>,
    entries: Mutex<HashMap<String, (RecipientInfo, Instant)>>,
}

impl AccountsCache {
    pub fn new(inner: Arc<dyn AccountsDirectory>) -> Self {
        Self { inner, entries: Mutex::new(HashMap::new()) }
    }

    /// Normalize a handle (lowercase, trimmed) before lookup or caching.
    pub fn normalize(handle: &str) -> String {
        handle.trim().to_lowercase()
    }

    pub async fn lookup(&self, handle: &str) -> Result<RecipientInfo> {
        let key = Self::normalize(handle);
        if let Some((info, fetched_at)) = self.entries.lock().get(&key).cloned() {
            if fetched_at.elapsed() < CACHE_TTL {
                return Ok(info);
            }
        }
        let info = self.inner.lookup(&key).await?;
        self.entries.lock().insert(key, (info.clone(), Instant::now()));
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingDirectory {
        calls: AtomicU32,
    }

    #[async_trait]
    impl AccountsDirectory for CountingDirectory {
        async fn lookup(&self, handle: &str) -> Result<RecipientInfo> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RecipientInfo { public_key: serde_json::json!({"kty": "EC"}), mailbox_id: format!("mailbox-{handle}") })
        }
    }

    #[tokio::test]
    async fn repeated_lookups_hit_the_cache() {
        let directory = Arc::new(CountingDirectory { calls: AtomicU32::new(0) });
        let cache = AccountsCache::new(directory.clone());
        cache.lookup("Alice@Example.com").await.unwrap();
        cache.lookup("alice@example.com").await.unwrap();
        cache.lookup(" alice@example.com ").await.unwrap();
        assert_eq!(directory.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_handles_each_miss() {
        let directory = Arc::new(CountingDirectory { calls: AtomicU32::new(0) });
        let cache = AccountsCache::new(directory.clone());
        cache.lookup("alice@example.com").await.unwrap();
        cache.lookup("bob@example.com").await.unwrap();
        assert_eq!(directory.calls.load(Ordering::SeqCst), 2);
    }
}
