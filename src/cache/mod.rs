pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::weather::WeatherRecord;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Wall-clock milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpochMillis(pub i64);

impl EpochMillis {
    pub fn now() -> Self {
        EpochMillis(chrono::Utc::now().timestamp_millis())
    }

    /// Milliseconds elapsed since `earlier`. Negative when the clock moved backwards.
    pub fn since(self, earlier: EpochMillis) -> i64 {
        self.0.saturating_sub(earlier.0)
    }
}

/// Normalized city name used to index cache entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Trims surrounding whitespace and lower-cases. Idempotent.
    pub fn normalize(raw: &str) -> Self {
        CacheKey(raw.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub record: WeatherRecord,
    pub stored_at: EpochMillis,
}

impl CacheEntry {
    pub fn new(record: WeatherRecord, stored_at: EpochMillis) -> Self {
        Self { record, stored_at }
    }

    /// An entry is fresh while strictly less than `ttl_ms` has elapsed.
    pub fn is_fresh(&self, now: EpochMillis, ttl_ms: i64) -> bool {
        now.since(self.stored_at) < ttl_ms
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),
    #[error("Corrupt cache entry for {key}: {reason}")]
    Corrupt { key: String, reason: String },
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                StoreError::Unavailable(e.to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

/// Key/value storage for cache entries. Implementations know nothing about
/// TTLs; freshness is decided by the caller.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns `Ok(None)` for a missing key.
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StoreError>;

    /// Replaces any existing entry for `key` as a whole value.
    async fn put(&self, key: &CacheKey, entry: CacheEntry) -> Result<(), StoreError>;

    fn backend_name(&self) -> &'static str;
}
