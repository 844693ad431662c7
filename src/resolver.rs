use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::cache::{CacheEntry, CacheKey, CacheStore, EpochMillis};
use crate::weather::{UpstreamError, WeatherRecord, WeatherUpstream};

/// Which path produced a response. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Cache,
    Api,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub record: WeatherRecord,
    pub source: Provenance,
}

#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("City name must not be empty")]
    InvalidInput,
    #[error("No city matches {0:?}")]
    NotFound(String),
    #[error("Weather upstream unavailable: {0}")]
    UpstreamUnavailable(#[source] UpstreamError),
}

impl ResolutionError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ResolutionError::UpstreamUnavailable(UpstreamError::Timeout))
    }
}

impl From<UpstreamError> for ResolutionError {
    fn from(e: UpstreamError) -> Self {
        match e {
            UpstreamError::NotFound(city) => ResolutionError::NotFound(city),
            other => ResolutionError::UpstreamUnavailable(other),
        }
    }
}

/// Serves weather records from the store while they are younger than the
/// TTL and refreshes them from upstream otherwise.
///
/// Concurrent misses for the same key are not coalesced: each one fetches
/// and writes, and the last write wins.
pub struct FreshnessResolver {
    store: Arc<dyn CacheStore>,
    upstream: Arc<dyn WeatherUpstream>,
    ttl_ms: i64,
}

impl FreshnessResolver {
    pub fn new(
        store: Arc<dyn CacheStore>,
        upstream: Arc<dyn WeatherUpstream>,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            upstream,
            ttl_ms: i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX),
        }
    }

    pub fn store_backend(&self) -> &'static str {
        self.store.backend_name()
    }

    pub fn upstream_provider(&self) -> &'static str {
        self.upstream.provider_name()
    }

    pub async fn resolve(
        &self,
        raw_city: &str,
        now: EpochMillis,
    ) -> Result<Resolved, ResolutionError> {
        let key = CacheKey::normalize(raw_city);
        if key.is_empty() {
            return Err(ResolutionError::InvalidInput);
        }
        let city = raw_city.trim();

        match self.store.get(&key).await {
            Ok(Some(entry)) if entry.is_fresh(now, self.ttl_ms) => {
                tracing::debug!(
                    "Cache hit for {} (age {}ms)",
                    key,
                    now.since(entry.stored_at)
                );
                return Ok(Resolved {
                    record: entry.record,
                    source: Provenance::Cache,
                });
            }
            Ok(Some(entry)) => {
                tracing::debug!(
                    "Cache entry for {} is stale (age {}ms)",
                    key,
                    now.since(entry.stored_at)
                );
            }
            Ok(None) => {
                tracing::debug!("Cache miss for {}", key);
            }
            Err(e) => {
                tracing::warn!("Cache read failed for {}, treating as miss: {}", key, e);
            }
        }

        let report = self.upstream.fetch(city).await.map_err(|e| {
            tracing::warn!("Upstream fetch for {:?} failed: {}", city, e);
            ResolutionError::from(e)
        })?;
        let record = WeatherRecord::from_upstream(&report)?;

        if let Err(e) = self
            .store
            .put(&key, CacheEntry::new(record.clone(), now))
            .await
        {
            tracing::warn!("Cache write failed for {}: {}", key, e);
        }

        Ok(Resolved {
            record,
            source: Provenance::Api,
        })
    }
}
