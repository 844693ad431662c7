use async_trait::async_trait;
use chrono::{Timelike, Utc};

use super::types::*;
use super::{UpstreamError, UpstreamReport, WeatherUpstream};

/// Offline provider for local development. Knows a handful of cities and
/// produces stable readings for each of them.
pub struct MockUpstream;

// name, country, latitude, longitude, base temperature
const MOCK_LOCATIONS: &[(&str, &str, f64, f64, f64)] = &[
    ("Paris", "France", 48.85341, 2.3488, 16.0),
    ("London", "United Kingdom", 51.50853, -0.12574, 13.0),
    ("Tokyo", "Japan", 35.6895, 139.69171, 19.0),
    ("New York", "United States", 40.71427, -74.00597, 15.0),
    ("Jakarta", "Indonesia", -6.21462, 106.84513, 30.0),
    ("Sydney", "Australia", -33.86785, 151.20732, 21.0),
    ("Reykjavik", "Iceland", 64.13548, -21.89541, 4.0),
];

const MOCK_WEATHER_CODES: &[i32] = &[0, 1, 2, 3, 45, 61, 80, 95];

impl MockUpstream {
    pub fn new() -> Self {
        Self
    }

    pub fn geocode(&self, city: &str) -> Result<GeocodeResult, UpstreamError> {
        let query = city.trim().to_lowercase();
        MOCK_LOCATIONS
            .iter()
            .find(|(name, ..)| name.to_lowercase() == query)
            .map(|(name, country, latitude, longitude, _)| GeocodeResult {
                name: name.to_string(),
                latitude: *latitude,
                longitude: *longitude,
                country: Some(country.to_string()),
                admin1: None,
                timezone: Some("GMT".to_string()),
            })
            .ok_or_else(|| UpstreamError::NotFound(city.to_string()))
    }

    pub fn current_conditions(&self, location: &GeocodeResult) -> ForecastResponse {
        let base_temp = MOCK_LOCATIONS
            .iter()
            .find(|(name, ..)| *name == location.name)
            .map(|(.., temp)| *temp)
            .unwrap_or(15.0);

        // Seeded per city so repeated calls agree
        let seed = location
            .name
            .bytes()
            .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
        let mut rng = fastrand::Rng::with_seed(seed);

        let now = Utc::now();
        let hour = now.hour();
        let is_day = (6..18).contains(&hour);
        let diurnal = if is_day { 3.0 } else { -3.0 };
        let temperature = base_temp + diurnal + rng.f64() * 2.0;
        let wind_speed = 5.0 + rng.f64() * 20.0;
        let weather_code = MOCK_WEATHER_CODES[rng.usize(..MOCK_WEATHER_CODES.len())];

        ForecastResponse {
            latitude: location.latitude,
            longitude: location.longitude,
            current: Some(CurrentConditions {
                time: now.format("%Y-%m-%dT%H:00").to_string(),
                temperature_2m: temperature,
                weather_code,
                wind_speed_10m: wind_speed,
                apparent_temperature: Some(temperature - wind_speed / 10.0),
                relative_humidity_2m: Some(40.0 + rng.f64() * 50.0),
                is_day: Some(if is_day { 1 } else { 0 }),
                cloud_cover: Some(if weather_code == 0 { 0.0 } else { 20.0 + rng.f64() * 80.0 }),
                wind_gusts_10m: Some(wind_speed * 1.6),
            }),
            daily: Some(DailySummary {
                time: vec![now.format("%Y-%m-%d").to_string()],
                temperature_2m_max: vec![Some(base_temp + 5.0)],
                temperature_2m_min: vec![Some(base_temp - 5.0)],
            }),
        }
    }
}

impl Default for MockUpstream {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WeatherUpstream for MockUpstream {
    async fn fetch(&self, city: &str) -> Result<UpstreamReport, UpstreamError> {
        let location = self.geocode(city)?;
        let forecast = self.current_conditions(&location);
        Ok(UpstreamReport { location, forecast })
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}
