use async_trait::async_trait;
use moka::future::Cache;

use super::{CacheEntry, CacheKey, CacheStore, StoreError};

/// Process-local store. Unbounded and without its own expiry: stale entries
/// stay until the next successful fetch for the same key replaces them.
#[derive(Clone)]
pub struct MemoryStore {
    entries: Cache<String, CacheEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Cache::builder().build(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StoreError> {
        Ok(self.entries.get(key.as_str()).await)
    }

    async fn put(&self, key: &CacheKey, entry: CacheEntry) -> Result<(), StoreError> {
        self.entries.insert(key.as_str().to_string(), entry).await;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
