use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::codes;
use super::{UpstreamError, UpstreamReport};
use crate::utils::round_to_decimals;

/// Normalized current conditions for one city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub city: String,
    pub country: Option<String>,
    pub temperature: f64,
    pub description: String,
    pub wind_speed: f64,
    pub apparent_temperature: Option<f64>,
    pub wind_gusts: Option<f64>,
    pub cloud_cover: Option<f64>,
    pub humidity: Option<f64>,
    pub is_day: Option<bool>,
    pub temp_max: Option<f64>,
    pub temp_min: Option<f64>,
    /// When the upstream last reported, ISO-8601 in UTC.
    pub timestamp: String,
}

impl WeatherRecord {
    /// Maps the raw upstream report into the normalized shape.
    ///
    /// Temperatures are rounded to whole degrees, wind to one decimal place.
    /// A missing `current` block, a non-finite reading or an unparseable
    /// observation time is reported as [`UpstreamError::Malformed`].
    pub fn from_upstream(report: &UpstreamReport) -> Result<Self, UpstreamError> {
        let current = report
            .forecast
            .current
            .as_ref()
            .ok_or_else(|| UpstreamError::Malformed("missing current conditions".to_string()))?;

        let temperature = finite("temperature_2m", current.temperature_2m)?;
        let wind_speed = finite("wind_speed_10m", current.wind_speed_10m)?;
        if wind_speed < 0.0 {
            return Err(UpstreamError::Malformed(format!(
                "negative wind speed: {}",
                wind_speed
            )));
        }

        let daily = report.forecast.daily.clone().unwrap_or_default();
        let first_of = |values: &[Option<f64>]| values.first().copied().flatten();

        Ok(Self {
            city: report.location.name.clone(),
            country: report.location.country.clone(),
            temperature: round_to_decimals(temperature, 0),
            description: codes::describe(current.weather_code).to_string(),
            wind_speed: round_to_decimals(wind_speed, 1),
            apparent_temperature: optional("apparent_temperature", current.apparent_temperature)?
                .map(|t| round_to_decimals(t, 0)),
            wind_gusts: optional("wind_gusts_10m", current.wind_gusts_10m)?
                .map(|w| round_to_decimals(w, 1)),
            cloud_cover: optional("cloud_cover", current.cloud_cover)?
                .map(|c| round_to_decimals(c, 0)),
            humidity: optional("relative_humidity_2m", current.relative_humidity_2m)?
                .map(|h| round_to_decimals(h, 0)),
            is_day: current.is_day.map(|flag| flag != 0),
            temp_max: optional("temperature_2m_max", first_of(&daily.temperature_2m_max))?
                .map(|t| round_to_decimals(t, 0)),
            temp_min: optional("temperature_2m_min", first_of(&daily.temperature_2m_min))?
                .map(|t| round_to_decimals(t, 0)),
            timestamp: normalize_timestamp(&current.time)?,
        })
    }
}

fn finite(field: &str, value: f64) -> Result<f64, UpstreamError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(UpstreamError::Malformed(format!("{} is not a number", field)))
    }
}

fn optional(field: &str, value: Option<f64>) -> Result<Option<f64>, UpstreamError> {
    value.map(|v| finite(field, v)).transpose()
}

/// Open-Meteo reports local times without an offset (`2024-05-01T12:00`);
/// requests ask for GMT so those are read as UTC. Full RFC 3339 strings are
/// accepted as well.
fn normalize_timestamp(raw: &str) -> Result<String, UpstreamError> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
                .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
                .map(|naive| naive.and_utc())
        })
        .map_err(|_| UpstreamError::Malformed(format!("bad observation time: {:?}", raw)))?;

    Ok(parsed.to_rfc3339_opts(SecondsFormat::Secs, true))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::weather::types::{CurrentConditions, DailySummary, ForecastResponse, GeocodeResult};

    pub(crate) fn sample_record() -> WeatherRecord {
        WeatherRecord {
            city: "Paris".to_string(),
            country: Some("France".to_string()),
            temperature: 18.0,
            description: "Clear Sky".to_string(),
            wind_speed: 11.3,
            apparent_temperature: Some(17.0),
            wind_gusts: Some(24.8),
            cloud_cover: Some(0.0),
            humidity: Some(62.0),
            is_day: Some(true),
            temp_max: Some(20.0),
            temp_min: Some(11.0),
            timestamp: "2024-05-01T12:00:00Z".to_string(),
        }
    }

    pub(crate) fn sample_report(temperature: f64, weather_code: i32) -> UpstreamReport {
        UpstreamReport {
            location: GeocodeResult {
                name: "Paris".to_string(),
                latitude: 48.85341,
                longitude: 2.3488,
                country: Some("France".to_string()),
                admin1: Some("Île-de-France".to_string()),
                timezone: Some("Europe/Paris".to_string()),
            },
            forecast: ForecastResponse {
                latitude: 48.86,
                longitude: 2.35,
                current: Some(CurrentConditions {
                    time: "2024-05-01T12:00".to_string(),
                    temperature_2m: temperature,
                    weather_code,
                    wind_speed_10m: 11.34,
                    apparent_temperature: Some(16.6),
                    relative_humidity_2m: Some(62.0),
                    is_day: Some(1),
                    cloud_cover: Some(0.0),
                    wind_gusts_10m: Some(24.81),
                }),
                daily: Some(DailySummary {
                    time: vec!["2024-05-01".to_string()],
                    temperature_2m_max: vec![Some(20.2)],
                    temperature_2m_min: vec![Some(10.6)],
                }),
            },
        }
    }

    #[test]
    fn test_maps_and_rounds_fields() {
        let record = WeatherRecord::from_upstream(&sample_report(18.4, 0)).unwrap();
        assert_eq!(record.city, "Paris");
        assert_eq!(record.country.as_deref(), Some("France"));
        assert_eq!(record.temperature, 18.0);
        assert_eq!(record.description, "Clear Sky");
        assert_eq!(record.wind_speed, 11.3);
        assert_eq!(record.apparent_temperature, Some(17.0));
        assert_eq!(record.wind_gusts, Some(24.8));
        assert_eq!(record.is_day, Some(true));
        assert_eq!(record.temp_max, Some(20.0));
        assert_eq!(record.temp_min, Some(11.0));
        assert_eq!(record.timestamp, "2024-05-01T12:00:00Z");
    }

    #[test]
    fn test_unknown_weather_code_is_not_an_error() {
        let record = WeatherRecord::from_upstream(&sample_report(18.0, 42)).unwrap();
        assert_eq!(record.description, "Unknown Condition");
    }

    #[test]
    fn test_missing_current_block_is_malformed() {
        let mut report = sample_report(18.0, 0);
        report.forecast.current = None;
        assert!(matches!(
            WeatherRecord::from_upstream(&report),
            Err(UpstreamError::Malformed(_))
        ));
    }

    #[test]
    fn test_bad_timestamp_is_malformed() {
        let mut report = sample_report(18.0, 0);
        if let Some(current) = report.forecast.current.as_mut() {
            current.time = "yesterday".to_string();
        }
        assert!(matches!(
            WeatherRecord::from_upstream(&report),
            Err(UpstreamError::Malformed(_))
        ));
    }

    #[test]
    fn test_missing_daily_leaves_extremes_empty() {
        let mut report = sample_report(18.0, 0);
        report.forecast.daily = None;
        let record = WeatherRecord::from_upstream(&report).unwrap();
        assert!(record.temp_max.is_none());
        assert!(record.temp_min.is_none());
    }

    #[test]
    fn test_rfc3339_timestamp_is_kept_in_utc() {
        assert_eq!(
            normalize_timestamp("2024-05-01T14:00:00+02:00").unwrap(),
            "2024-05-01T12:00:00Z"
        );
    }
}
