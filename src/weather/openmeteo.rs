use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;

use super::retry::RetryPolicy;
use super::types::*;
use super::{UpstreamError, UpstreamReport, WeatherUpstream};
use crate::config::Config;

pub struct OpenMeteoClient {
    client: Client,
    geocoding_base_url: String,
    forecast_base_url: String,
    retry: RetryPolicy,
}

impl OpenMeteoClient {
    pub fn new(config: &Config) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .user_agent(concat!("weather-cache-server/", env!("CARGO_PKG_VERSION")))
            .timeout(config.upstream_timeout())
            .build()?;

        Ok(Self {
            client,
            geocoding_base_url: config.geocoding_base_url.trim_end_matches('/').to_string(),
            forecast_base_url: config.forecast_base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::from_config(config),
        })
    }

    /// First geocoding match for a free-text city name.
    pub async fn geocode(&self, city: &str) -> Result<GeocodeResult, UpstreamError> {
        let url = &format!("{}/v1/search", self.geocoding_base_url);
        let params = &[
            ("name", city.to_string()),
            ("count", "1".to_string()),
            ("language", "en".to_string()),
            ("format", "json".to_string()),
        ];

        let response: GeocodeSearchResponse = self
            .retry
            .run("geocoding", move || self.get_json(url, params))
            .await?;

        response
            .results
            .into_iter()
            .next()
            .ok_or_else(|| UpstreamError::NotFound(city.to_string()))
    }

    pub async fn current_conditions(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<ForecastResponse, UpstreamError> {
        let url = &format!("{}/v1/forecast", self.forecast_base_url);
        let params = &[
            ("latitude", latitude.to_string()),
            ("longitude", longitude.to_string()),
            ("current", CURRENT_FIELDS.to_string()),
            ("daily", DAILY_FIELDS.to_string()),
            ("timezone", "GMT".to_string()),
            ("forecast_days", "1".to_string()),
        ];

        self.retry
            .run("forecast", move || self.get_json(url, params))
            .await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<T, UpstreamError> {
        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UpstreamError::Timeout
                } else {
                    UpstreamError::RequestFailed(e)
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(UpstreamError::RateLimited);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(UpstreamError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout
            } else {
                UpstreamError::RequestFailed(e)
            }
        })?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl WeatherUpstream for OpenMeteoClient {
    async fn fetch(&self, city: &str) -> Result<UpstreamReport, UpstreamError> {
        let location = self.geocode(city).await?;
        tracing::debug!(
            "Geocoded {:?} to {} ({:.4}, {:.4})",
            city,
            location.name,
            location.latitude,
            location.longitude
        );

        let forecast = self
            .current_conditions(location.latitude, location.longitude)
            .await?;

        Ok(UpstreamReport { location, forecast })
    }

    fn provider_name(&self) -> &'static str {
        "open-meteo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server, ServerGuard};

    const GEOCODE_PARIS: &str = r#"{
        "results": [{
            "id": 2988507,
            "name": "Paris",
            "latitude": 48.85341,
            "longitude": 2.3488,
            "country": "France",
            "admin1": "Île-de-France",
            "timezone": "Europe/Paris"
        }],
        "generationtime_ms": 0.5
    }"#;

    const FORECAST_PARIS: &str = r#"{
        "latitude": 48.86,
        "longitude": 2.3399997,
        "current": {
            "time": "2024-05-01T12:00",
            "interval": 900,
            "temperature_2m": 18.2,
            "apparent_temperature": 16.9,
            "relative_humidity_2m": 58,
            "is_day": 1,
            "weather_code": 0,
            "cloud_cover": 5,
            "wind_speed_10m": 9.4,
            "wind_gusts_10m": 20.2
        },
        "daily": {
            "time": ["2024-05-01"],
            "temperature_2m_max": [21.3],
            "temperature_2m_min": [9.8]
        }
    }"#;

    fn client_for(server: &ServerGuard, max_attempts: u32) -> OpenMeteoClient {
        let config = Config {
            geocoding_base_url: server.url(),
            forecast_base_url: server.url(),
            upstream_max_attempts: max_attempts,
            upstream_retry_base_ms: 1,
            ..Config::default()
        };
        OpenMeteoClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_geocodes_then_reads_conditions() {
        let mut server = Server::new_async().await;
        let geocode = server
            .mock("GET", "/v1/search")
            .match_query(Matcher::UrlEncoded("name".into(), "Paris".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(GEOCODE_PARIS)
            .expect(1)
            .create_async()
            .await;
        let forecast = server
            .mock("GET", "/v1/forecast")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("latitude".into(), "48.85341".into()),
                Matcher::UrlEncoded("longitude".into(), "2.3488".into()),
                Matcher::UrlEncoded("timezone".into(), "GMT".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(FORECAST_PARIS)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, 3);
        let report = client.fetch("Paris").await.unwrap();

        assert_eq!(report.location.name, "Paris");
        assert_eq!(report.location.country.as_deref(), Some("France"));
        let current = report.forecast.current.unwrap();
        assert_eq!(current.weather_code, 0);
        assert_eq!(current.temperature_2m, 18.2);

        geocode.assert_async().await;
        forecast.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_geocoding_result_is_not_found() {
        let mut server = Server::new_async().await;
        let geocode = server
            .mock("GET", "/v1/search")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"generationtime_ms":0.3}"#)
            .expect(1)
            .create_async()
            .await;
        let forecast = server
            .mock("GET", "/v1/forecast")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let client = client_for(&server, 3);
        let result = client.fetch("Atlantis").await;

        assert!(matches!(result, Err(UpstreamError::NotFound(ref name)) if name == "Atlantis"));
        geocode.assert_async().await;
        forecast.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_then_reported() {
        let mut server = Server::new_async().await;
        let _geocode = server
            .mock("GET", "/v1/search")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(GEOCODE_PARIS)
            .create_async()
            .await;
        let forecast = server
            .mock("GET", "/v1/forecast")
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("upstream busy")
            .expect(2)
            .create_async()
            .await;

        let client = client_for(&server, 2);
        let result = client.fetch("Paris").await;

        assert!(matches!(result, Err(UpstreamError::ApiError { status: 503, .. })));
        forecast.assert_async().await;
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let mut server = Server::new_async().await;
        let geocode = server
            .mock("GET", "/v1/search")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"error":true,"reason":"Parameter name is required"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, 3);
        let result = client.fetch("Paris").await;

        assert!(matches!(result, Err(UpstreamError::ApiError { status: 400, .. })));
        geocode.assert_async().await;
    }

    #[tokio::test]
    async fn test_malformed_forecast_body() {
        let mut server = Server::new_async().await;
        let _geocode = server
            .mock("GET", "/v1/search")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(GEOCODE_PARIS)
            .create_async()
            .await;
        let _forecast = server
            .mock("GET", "/v1/forecast")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>gateway</html>")
            .create_async()
            .await;

        let client = client_for(&server, 1);
        let result = client.fetch("Paris").await;

        assert!(matches!(result, Err(UpstreamError::JsonParsing(_))));
        assert!(!result.unwrap_err().is_transient());
    }

    #[tokio::test]
    async fn test_silent_upstream_times_out() {
        // Accepts connections and never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let holder = tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                open.push(socket);
            }
        });

        let config = Config {
            geocoding_base_url: format!("http://{}", addr),
            forecast_base_url: format!("http://{}", addr),
            upstream_timeout_secs: 1,
            upstream_max_attempts: 1,
            ..Config::default()
        };
        let client = OpenMeteoClient::new(&config).unwrap();

        let started = std::time::Instant::now();
        let result = client.fetch("Paris").await;

        assert!(matches!(result, Err(UpstreamError::Timeout)));
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
        holder.abort();
    }
}
