use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use super::{CacheEntry, CacheKey, CacheStore, EpochMillis, StoreError};
use crate::weather::WeatherRecord;

/// Durable store backed by a single SQLite table. Records are kept as JSON,
/// timestamps as `DateTime<Utc>`; both are converted at this boundary.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePool::connect(database_url).await?;
        let store = Self::new(pool);
        store.init_tables().await?;
        Ok(store)
    }

    pub async fn init_tables(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS weather_cache (
                key TEXT PRIMARY KEY,
                record TEXT NOT NULL,
                stored_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}

fn to_datetime(key: &CacheKey, millis: EpochMillis) -> Result<DateTime<Utc>, StoreError> {
    DateTime::<Utc>::from_timestamp_millis(millis.0).ok_or_else(|| StoreError::Corrupt {
        key: key.to_string(),
        reason: format!("timestamp out of range: {}", millis.0),
    })
}

#[async_trait]
impl CacheStore for SqliteStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StoreError> {
        let row = sqlx::query("SELECT record, stored_at FROM weather_cache WHERE key = $1")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw_record: String = row.try_get("record")?;
        let stored_at: DateTime<Utc> = row.try_get("stored_at")?;

        let record: WeatherRecord =
            serde_json::from_str(&raw_record).map_err(|e| StoreError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Some(CacheEntry::new(
            record,
            EpochMillis(stored_at.timestamp_millis()),
        )))
    }

    async fn put(&self, key: &CacheKey, entry: CacheEntry) -> Result<(), StoreError> {
        let stored_at = to_datetime(key, entry.stored_at)?;
        let record = serde_json::to_string(&entry.record).map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        sqlx::query(
            r#"
            INSERT INTO weather_cache (key, record, stored_at)
            VALUES ($1, $2, $3)
            ON CONFLICT(key) DO UPDATE SET
                record = excluded.record,
                stored_at = excluded.stored_at
            "#,
        )
        .bind(key.as_str())
        .bind(record)
        .bind(stored_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
