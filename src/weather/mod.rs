pub mod codes;
pub mod mock;
pub mod openmeteo;
pub mod record;
pub mod retry;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

pub use record::WeatherRecord;
use types::{ForecastResponse, GeocodeResult};

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("No location matches {0:?}")]
    NotFound(String),
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("JSON parsing failed: {0}")]
    JsonParsing(#[from] serde_json::Error),
    #[error("Request timed out")]
    Timeout,
    #[error("Rate limited")]
    RateLimited,
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Malformed payload: {0}")]
    Malformed(String),
}

impl UpstreamError {
    /// Failures worth another attempt. Lookup misses and client errors are final.
    pub fn is_transient(&self) -> bool {
        match self {
            UpstreamError::Timeout | UpstreamError::RateLimited => true,
            UpstreamError::RequestFailed(e) => e.is_connect() || e.is_timeout(),
            UpstreamError::ApiError { status, .. } => *status >= 500,
            UpstreamError::NotFound(_)
            | UpstreamError::JsonParsing(_)
            | UpstreamError::Malformed(_) => false,
        }
    }
}

/// Raw result of the two-stage lookup, before normalization.
#[derive(Debug, Clone)]
pub struct UpstreamReport {
    pub location: GeocodeResult,
    pub forecast: ForecastResponse,
}

/// City name → coordinates → current conditions.
#[async_trait]
pub trait WeatherUpstream: Send + Sync {
    async fn fetch(&self, city: &str) -> Result<UpstreamReport, UpstreamError>;

    fn provider_name(&self) -> &'static str;
}
