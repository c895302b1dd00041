//! LRU-50 cache of object URLs keyed by `(space, fileId)`. Eviction revokes
//! the URL through the host's own revocation hook rather than assuming any
//! particular URL lifetime scheme.

use indexmap::IndexMap;

const CAPACITY: usize = 50;

pub trait UrlRevoker: Send + Sync {
    fn revoke(&self, url: &str);
}

pub struct UrlCache {
    entries: IndexMap<String, String>,
    revoker: Option<Box<dyn UrlRevoker>>,
}

impl UrlCache {
    pub fn new(revoker: Option<Box<dyn UrlRevoker>>) -> Self {
        Self { entries: IndexMap::new(), revoker }
    }

    /// Look up a cached URL, marking it most-recently-used on a hit.
    pub fn get(&mut self, key: &str) -> Option<String> {
        let url = self.entries.shift_remove(key)?;
        self.entries.insert(key.to_string(), url.clone());
        Some(url)
    }

    pub fn put(&mut self, key: String, url: String) {
        if let Some(old) = self.entries.shift_remove(&key) {
            self.revoke(&old);
        }
        self.entries.insert(key, url);
        while self.entries.len() > CAPACITY {
            let (_, evicted) = self.entries.shift_remove_index(0).expect("len just checked > 0");
            self.revoke(&evicted);
        }
    }

    fn revoke(&self, url: &str) {
        if let Some(revoker) = &self.revoker {
            revoker.revoke(url);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct RecordingRevoker(Arc<Mutex<Vec<String>>>);

    impl UrlRevoker for RecordingRevoker {
        fn revoke(&self, url: &str) {
            self.0.lock().push(url.to_string());
        }
    }

    #[test]
    fn evicts_oldest_past_capacity() {
        let revoked = Arc::new(Mutex::new(Vec::new()));
        let mut cache = UrlCache::new(Some(Box::new(RecordingRevoker(revoked.clone()))));
        for i in 0..60 {
            cache.put(format!("space\u{0}file-{i}"), format!("blob:{i}"));
        }
        assert_eq!(cache.entries.len(), CAPACITY);
        assert!(revoked.lock().contains(&"blob:0".to_string()));
        assert!(cache.get(&format!("space\u{0}file-59")).is_some());
    }

    #[test]
    fn get_marks_most_recently_used() {
        let mut cache = UrlCache::new(None);
        cache.put("a".to_string(), "blob:a".to_string());
        cache.put("b".to_string(), "blob:b".to_string());
        cache.get("a");
        let (first_key, _) = cache.entries.first().unwrap();
        assert_eq!(first_key, "b");
    }
}
