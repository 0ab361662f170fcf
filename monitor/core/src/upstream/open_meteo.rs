//! Open-Meteo Weather Provider
//!
//! Queries `/v1/forecast` for current conditions at a single point. No API key
//! is required.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use super::traits::{UpstreamError, WeatherProvider};
use super::weather::describe_code;
use crate::model::{GeoPoint, WeatherSnapshot};

/// Default API host
pub const DEFAULT_BASE_URL: &str = "https://api.open-meteo.com";

const CURRENT_FIELDS: &str = "temperature_2m,precipitation,wind_speed_10m,weather_code";

/// Open-Meteo weather provider
#[derive(Clone)]
pub struct OpenMeteo {
    base_url: String,
    http_client: reqwest::Client,
}

impl OpenMeteo {
    /// Create a weather provider
    pub fn new(base_url: impl Into<String>, http_client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        }
    }
}

#[async_trait]
impl WeatherProvider for OpenMeteo {
    fn name(&self) -> &str {
        "Open-Meteo"
    }

    async fn current(&self, point: &GeoPoint) -> Result<WeatherSnapshot, UpstreamError> {
        let response = self
            .http_client
            .get(format!("{}/v1/forecast", self.base_url))
            .query(&[
                ("latitude", point.lat.to_string()),
                ("longitude", point.lon.to_string()),
                ("current", CURRENT_FIELDS.to_string()),
                ("wind_speed_unit", "kmh".to_string()),
                ("timezone", "UTC".to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status { status, body });
        }

        let data: Value = response.json().await?;
        parse_current(&data)
    }
}

/// Extract a [`WeatherSnapshot`] from a forecast payload's `current` block
///
/// # Errors
///
/// [`UpstreamError::Malformed`] if temperature or weather code is missing.
pub fn parse_current(data: &Value) -> Result<WeatherSnapshot, UpstreamError> {
    let current = data
        .get("current")
        .ok_or_else(|| UpstreamError::Malformed("missing current block".to_string()))?;

    let temperature_c = current
        .get("temperature_2m")
        .and_then(Value::as_f64)
        .ok_or_else(|| UpstreamError::Malformed("missing temperature_2m".to_string()))?;
    let code = current
        .get("weather_code")
        .and_then(Value::as_u64)
        .and_then(|c| u16::try_from(c).ok())
        .ok_or_else(|| UpstreamError::Malformed("missing weather_code".to_string()))?;

    let kind = describe_code(code);
    Ok(WeatherSnapshot {
        temperature_c,
        precipitation_mm: current
            .get("precipitation")
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
        wind_kmh: current
            .get("wind_speed_10m")
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
        code,
        description: kind.description.to_string(),
        icon: kind.icon.to_string(),
        fetched_at: Utc::now(),
    })
}
