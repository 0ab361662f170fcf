//! Upstream Providers
//!
//! Access to the external routing, traffic-flow and weather services through
//! a common set of traits.
//!
//! # Available Providers
//!
//! - **TomTom Routing**: live, historic and no-traffic travel times (required)
//! - **TomTom Flow**: current vs. free-flow speed at a point (optional)
//! - **Open-Meteo**: current weather, cached per TTL (optional)
//!
//! # Usage
//!
//! ```ignore
//! use monitor_core::upstream::{MeasurementSource, ProviderConfig, UpstreamClient};
//!
//! let client = UpstreamClient::from_config(&ProviderConfig::default())?;
//! let measurement = client.measure(&route).await?;
//! ```

mod client;
pub mod open_meteo;
pub mod tomtom;
mod traits;
pub mod weather;

pub use client::{build_http_client, ProviderConfig, UpstreamClient};
pub use traits::{
    Measurement, MeasurementSource, RouteProvider, SpeedProvider, Telemetry, UpstreamError,
    WeatherProvider,
};
pub use weather::{describe_code, WeatherCache, WeatherKind, DEFAULT_WEATHER_TTL};
