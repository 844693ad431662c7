use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    Sqlite,
}

impl FromStr for CacheBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(CacheBackend::Memory),
            "sqlite" => Ok(CacheBackend::Sqlite),
            other => Err(anyhow::anyhow!("unknown CACHE_BACKEND: {}", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WeatherProvider {
    OpenMeteo,
    Mock,
}

impl FromStr for WeatherProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "open-meteo" | "openmeteo" => Ok(WeatherProvider::OpenMeteo),
            "mock" => Ok(WeatherProvider::Mock),
            other => Err(anyhow::anyhow!("unknown WEATHER_PROVIDER: {}", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: String,
    pub cache_ttl_secs: u64,
    pub cache_backend: CacheBackend,
    pub database_url: String,
    pub weather_provider: WeatherProvider,
    pub geocoding_base_url: String,
    pub forecast_base_url: String,
    pub upstream_timeout_secs: u64,
    pub upstream_max_attempts: u32,
    pub upstream_retry_base_ms: u64,
    pub upstream_retry_multiplier: f64,
    pub api_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: "0.0.0.0:8080".to_string(),
            cache_ttl_secs: 5 * 60,
            cache_backend: CacheBackend::Memory,
            database_url: "sqlite:./weather_cache.db?mode=rwc".to_string(),
            weather_provider: WeatherProvider::OpenMeteo,
            geocoding_base_url: "https://geocoding-api.open-meteo.com".to_string(),
            forecast_base_url: "https://api.open-meteo.com".to_string(),
            upstream_timeout_secs: 5,
            upstream_max_attempts: 3,
            upstream_retry_base_ms: 250,
            upstream_retry_multiplier: 2.0,
            api_token: None,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let config = Config {
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            cache_ttl_secs: parse_var(&lookup, "CACHE_TTL_SECS", defaults.cache_ttl_secs)?,
            cache_backend: parse_var(&lookup, "CACHE_BACKEND", defaults.cache_backend)?,
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            weather_provider: parse_var(&lookup, "WEATHER_PROVIDER", defaults.weather_provider)?,
            geocoding_base_url: lookup("GEOCODING_BASE_URL")
                .unwrap_or(defaults.geocoding_base_url),
            forecast_base_url: lookup("FORECAST_BASE_URL").unwrap_or(defaults.forecast_base_url),
            upstream_timeout_secs: parse_var(
                &lookup,
                "UPSTREAM_TIMEOUT_SECS",
                defaults.upstream_timeout_secs,
            )?,
            upstream_max_attempts: parse_var(
                &lookup,
                "UPSTREAM_MAX_ATTEMPTS",
                defaults.upstream_max_attempts,
            )?,
            upstream_retry_base_ms: parse_var(
                &lookup,
                "UPSTREAM_RETRY_BASE_MS",
                defaults.upstream_retry_base_ms,
            )?,
            upstream_retry_multiplier: parse_var(
                &lookup,
                "UPSTREAM_RETRY_MULTIPLIER",
                defaults.upstream_retry_multiplier,
            )?,
            api_token: lookup("API_TOKEN").filter(|token| !token.trim().is_empty()),
        };

        if config.cache_ttl_secs == 0 {
            return Err(anyhow::anyhow!("CACHE_TTL_SECS must be greater than zero"));
        }
        if config.upstream_timeout_secs == 0 {
            return Err(anyhow::anyhow!("UPSTREAM_TIMEOUT_SECS must be greater than zero"));
        }
        if config.upstream_max_attempts == 0 {
            return Err(anyhow::anyhow!("UPSTREAM_MAX_ATTEMPTS must be at least 1"));
        }
        if !config.upstream_retry_multiplier.is_finite() || config.upstream_retry_multiplier < 1.0 {
            return Err(anyhow::anyhow!(
                "UPSTREAM_RETRY_MULTIPLIER must be a finite number >= 1.0"
            ));
        }

        Ok(config)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{} is invalid ({}): {}", name, raw, e)),
        None => Ok(default),
    }
}
