//! Upstream Client
//!
//! Combines the routing provider with the optional speed and weather
//! providers into one [`MeasurementSource`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::open_meteo::{self, OpenMeteo};
use super::tomtom::{self, TomTomFlow, TomTomRouting};
use super::traits::{
    Measurement, MeasurementSource, RouteProvider, SpeedProvider, Telemetry, UpstreamError,
};
use super::weather::{WeatherCache, DEFAULT_WEATHER_TTL};
use crate::model::{GeoPoint, Route, SpeedSample, WeatherSnapshot};

/// Provider settings
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderConfig {
    /// Routing API host
    pub routing_base_url: String,
    /// Routing/flow API key (required at startup)
    pub api_key: Option<String>,
    /// Per-request timeout for every provider
    pub request_timeout: Duration,
    /// Whether to sample speed at each route origin
    pub speed_enabled: bool,
    /// Flow API host
    pub speed_base_url: String,
    /// Whether to attach weather to readings
    pub weather_enabled: bool,
    /// Weather API host
    pub weather_base_url: String,
    /// Representative point for weather
    pub weather_location: GeoPoint,
    /// Weather snapshot lifetime
    pub weather_ttl: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            routing_base_url: tomtom::DEFAULT_BASE_URL.to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(30),
            speed_enabled: true,
            speed_base_url: tomtom::DEFAULT_BASE_URL.to_string(),
            weather_enabled: true,
            weather_base_url: open_meteo::DEFAULT_BASE_URL.to_string(),
            weather_location: GeoPoint::new(32.5422, -117.0293, "San Ysidro"),
            weather_ttl: DEFAULT_WEATHER_TTL,
        }
    }
}

/// Build the shared HTTP client
///
/// # Errors
///
/// Returns the builder error if the TLS backend cannot be initialized.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("crossing-monitor/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Measurement source backed by real providers
#[derive(Clone)]
pub struct UpstreamClient {
    routing: Arc<dyn RouteProvider>,
    speed: Option<Arc<dyn SpeedProvider>>,
    weather: Option<Arc<WeatherCache>>,
}

impl UpstreamClient {
    /// Create a client with only a routing provider
    pub fn new(routing: Arc<dyn RouteProvider>) -> Self {
        Self {
            routing,
            speed: None,
            weather: None,
        }
    }

    /// Attach a speed provider
    #[must_use]
    pub fn with_speed(mut self, speed: Arc<dyn SpeedProvider>) -> Self {
        self.speed = Some(speed);
        self
    }

    /// Attach a weather cache
    #[must_use]
    pub fn with_weather(mut self, weather: Arc<WeatherCache>) -> Self {
        self.weather = Some(weather);
        self
    }

    /// Build the TomTom/Open-Meteo client stack from configuration
    ///
    /// # Errors
    ///
    /// [`UpstreamError::Network`] if the HTTP client cannot be built.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, UpstreamError> {
        let http_client = build_http_client(config.request_timeout)
            .map_err(|e| UpstreamError::Network(e.to_string()))?;
        let api_key = config.api_key.clone().unwrap_or_default();

        let mut client = Self::new(Arc::new(TomTomRouting::new(
            config.routing_base_url.clone(),
            api_key.clone(),
            http_client.clone(),
        )));

        if config.speed_enabled {
            client = client.with_speed(Arc::new(TomTomFlow::new(
                config.speed_base_url.clone(),
                api_key,
                http_client.clone(),
            )));
        }

        if config.weather_enabled {
            let provider = Arc::new(OpenMeteo::new(config.weather_base_url.clone(), http_client));
            client = client.with_weather(Arc::new(WeatherCache::new(
                provider,
                config.weather_location.clone(),
                config.weather_ttl,
            )));
        }

        Ok(client)
    }

    async fn speed_telemetry(&self, point: &GeoPoint) -> Telemetry<SpeedSample> {
        let Some(speed) = &self.speed else {
            return Telemetry::Unavailable;
        };
        let telemetry = Telemetry::from_result(speed.speed_at(point).await);
        if let Telemetry::Failed(ref e) = telemetry {
            warn!(provider = speed.name(), error = %e, "Speed sample unavailable");
        }
        telemetry
    }

    async fn weather_telemetry(&self) -> Telemetry<WeatherSnapshot> {
        match &self.weather {
            Some(cache) => cache.get().await,
            None => Telemetry::Unavailable,
        }
    }
}

#[async_trait]
impl MeasurementSource for UpstreamClient {
    async fn measure(&self, route: &Route) -> Result<Measurement, UpstreamError> {
        let measured = self
            .routing
            .route(&route.origin, &route.destination)
            .await?;

        let (speed, weather) = tokio::join!(
            self.speed_telemetry(&route.origin),
            self.weather_telemetry()
        );

        debug!(
            route = %route.id,
            provider = self.routing.name(),
            traffic_min = measured.traffic_minutes,
            baseline_min = measured.baseline_minutes,
            speed = speed.is_available(),
            weather = weather.is_available(),
            "Route measured"
        );

        Ok(Measurement {
            route: measured,
            speed,
            weather,
        })
    }
}
