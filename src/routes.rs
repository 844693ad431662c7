use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    cache::EpochMillis,
    config::Config,
    resolver::{FreshnessResolver, Provenance, ResolutionError},
    utils::{tokens_match, ErrorResponse},
    weather::WeatherRecord,
};

const API_KEY_HEADER: &str = "x-api-key";

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub resolver: Arc<FreshnessResolver>,
}

#[derive(Debug, Deserialize)]
pub struct WeatherQuery {
    pub city: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
    pub cache_backend: String,
    pub weather_provider: String,
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct WeatherResponse {
    #[serde(flatten)]
    pub record: WeatherRecord,
    pub source: Provenance,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            body: ErrorResponse::new(message, code).with_request_id(Uuid::new_v4().to_string()),
        }
    }
}

impl From<ResolutionError> for ApiError {
    fn from(e: ResolutionError) -> Self {
        let message = e.to_string();
        match e {
            ResolutionError::InvalidInput => {
                ApiError::new(StatusCode::BAD_REQUEST, "invalid_input", &message)
            }
            ResolutionError::NotFound(_) => {
                ApiError::new(StatusCode::NOT_FOUND, "not_found", &message)
            }
            ref err if err.is_timeout() => {
                ApiError::new(StatusCode::GATEWAY_TIMEOUT, "upstream_timeout", &message)
            }
            ResolutionError::UpstreamUnavailable(_) => {
                ApiError::new(StatusCode::BAD_GATEWAY, "upstream_unavailable", &message)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

// Route handlers
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        cache_backend: state.resolver.store_backend().to_string(),
        weather_provider: state.resolver.upstream_provider().to_string(),
        cache_ttl_secs: state.config.cache_ttl_secs,
    })
}

pub async fn get_weather(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<WeatherQuery>,
) -> Result<Json<WeatherResponse>, ApiError> {
    let city = params.city.unwrap_or_default();
    resolve_city(&state, &headers, &city).await
}

pub async fn get_weather_by_path(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(city): Path<String>,
) -> Result<Json<WeatherResponse>, ApiError> {
    resolve_city(&state, &headers, &city).await
}

async fn resolve_city(
    state: &AppState,
    headers: &HeaderMap,
    city: &str,
) -> Result<Json<WeatherResponse>, ApiError> {
    check_api_key(&state.config, headers)?;

    let resolved = state
        .resolver
        .resolve(city, EpochMillis::now())
        .await
        .map_err(|e| {
            match e {
                ResolutionError::InvalidInput | ResolutionError::NotFound(_) => {
                    tracing::debug!("Rejected weather request for {:?}: {}", city, e)
                }
                _ => tracing::error!("Weather request for {:?} failed: {}", city, e),
            }
            ApiError::from(e)
        })?;

    Ok(Json(WeatherResponse {
        record: resolved.record,
        source: resolved.source,
    }))
}

fn check_api_key(config: &Config, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = config.api_token.as_deref() else {
        return Ok(());
    };

    let provided = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if tokens_match(expected, provided) {
        Ok(())
    } else {
        Err(ApiError::new(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "Missing or invalid API key",
        ))
    }
}

// Create the router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/weather", get(get_weather))
        .route("/weather/:city", get(get_weather_by_path))
        .with_state(state)
}
