use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cache;
mod config;
mod resolver;
mod routes;
mod utils;
mod weather;

use cache::{CacheStore, MemoryStore, SqliteStore};
use config::{CacheBackend, Config, WeatherProvider};
use resolver::FreshnessResolver;
use routes::{create_router, AppState};
use weather::{mock::MockUpstream, openmeteo::OpenMeteoClient, WeatherUpstream};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weather_cache_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn CacheStore> = match config.cache_backend {
        CacheBackend::Memory => Arc::new(MemoryStore::new()),
        CacheBackend::Sqlite => {
            let store = SqliteStore::connect(&config.database_url).await?;
            store.health_check().await?;
            Arc::new(store)
        }
    };

    let upstream: Arc<dyn WeatherUpstream> = match config.weather_provider {
        WeatherProvider::OpenMeteo => Arc::new(OpenMeteoClient::new(&config)?),
        WeatherProvider::Mock => Arc::new(MockUpstream::new()),
    };

    tracing::info!(
        "Cache backend: {}, provider: {}, TTL: {}s",
        store.backend_name(),
        upstream.provider_name(),
        config.cache_ttl_secs
    );

    let resolver = Arc::new(FreshnessResolver::new(store, upstream, config.cache_ttl()));
    let bind_addr = config.bind_addr.clone();

    let state = AppState {
        config: Arc::new(config),
        resolver,
    };

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server starting on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
