// Metadata Cache Port

use crate::error::Result;
use async_trait::async_trait;

/// One key/value pair written to the cache
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub value: serde_json::Value,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Key/value cache of normalized provider results with TTL
#[async_trait]
pub trait MetadataCache: Send + Sync {
    /// Read a live entry
    async fn get(&self, key: &str, now: i64) -> Result<Option<serde_json::Value>>;

    /// Write all entries atomically: either every key is stored or none
    async fn put_all(&self, entries: &[CacheEntry], ttl_ms: i64, now: i64) -> Result<()>;

    /// Delete expired entries
    async fn purge_expired(&self, now: i64) -> Result<u64>;
}

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryMetadataCache {
        entries: Mutex<HashMap<String, (serde_json::Value, i64)>>,
        fail_writes: AtomicBool,
    }

    impl InMemoryMetadataCache {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn keys(&self) -> Vec<String> {
            let mut keys: Vec<String> = self.entries.lock().unwrap().keys().cloned().collect();
            keys.sort();
            keys
        }

        pub fn len(&self) -> usize {
            self.entries.lock().unwrap().len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        pub fn set_fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl MetadataCache for InMemoryMetadataCache {
        async fn get(&self, key: &str, now: i64) -> Result<Option<serde_json::Value>> {
            let entries = self.entries.lock().unwrap();
            Ok(entries
                .get(key)
                .filter(|(_, expires_at)| *expires_at > now)
                .map(|(value, _)| value.clone()))
        }

        async fn put_all(&self, entries: &[CacheEntry], ttl_ms: i64, now: i64) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(AppError::Database("cache unavailable".to_string()));
            }
            let mut map = self.entries.lock().unwrap();
            for entry in entries {
                map.insert(entry.key.clone(), (entry.value.clone(), now + ttl_ms));
            }
            Ok(())
        }

        async fn purge_expired(&self, now: i64) -> Result<u64> {
            let mut map = self.entries.lock().unwrap();
            let before = map.len();
            map.retain(|_, (_, expires_at)| *expires_at > now);
            Ok((before - map.len()) as u64)
        }
    }
}
