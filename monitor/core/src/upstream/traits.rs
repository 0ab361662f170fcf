//! Upstream Provider Traits
//!
//! Trait definitions for the external services a measurement is built from.
//! The routing provider is mandatory; speed and weather are optional
//! telemetry that must never abort a measurement.
//!
//! # Failure Model
//!
//! - [`RouteProvider`] failures surface as [`UpstreamError`] and fail the
//!   measurement for that route only.
//! - Speed and weather outcomes are reported as [`Telemetry`], which keeps
//!   "nothing to report" apart from "the call failed".
//!
//! No trait method retries. A failed poll is retried by the next cycle.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{GeoPoint, Route, RouteMeasurement, SpeedSample, WeatherSnapshot};

/// Errors from upstream providers
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum UpstreamError {
    /// Connection refused, DNS failure, reset, ...
    #[error("Network error: {0}")]
    Network(String),

    /// The request did not complete within the client timeout
    #[error("Request timed out")]
    Timeout,

    /// The provider answered with a non-success status
    #[error("Provider returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (possibly empty)
        body: String,
    },

    /// The payload could not be interpreted
    #[error("Malformed payload: {0}")]
    Malformed(String),

    /// The provider found no route between the two points
    #[error("No route found")]
    NoRoute,
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Malformed(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Outcome of an optional telemetry call
#[derive(Clone, Debug, PartialEq)]
pub enum Telemetry<T> {
    /// The provider returned data
    Available(T),
    /// No provider configured, or the provider had nothing for this point
    Unavailable,
    /// The call failed
    Failed(UpstreamError),
}

impl<T> Telemetry<T> {
    /// Fold a provider result where `Ok(None)` means "no data"
    pub fn from_result(result: Result<Option<T>, UpstreamError>) -> Self {
        match result {
            Ok(Some(value)) => Self::Available(value),
            Ok(None) => Self::Unavailable,
            Err(e) => Self::Failed(e),
        }
    }

    /// The data, if any
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Available(value) => Some(value),
            Self::Unavailable | Self::Failed(_) => None,
        }
    }

    /// Whether data is present
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    /// Whether the call failed
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Everything gathered for one route in one poll
#[derive(Clone, Debug)]
pub struct Measurement {
    /// Normalized routing result
    pub route: RouteMeasurement,
    /// Speed at the route origin
    pub speed: Telemetry<SpeedSample>,
    /// Weather at the monitored area
    pub weather: Telemetry<WeatherSnapshot>,
}

impl Measurement {
    /// A measurement without optional telemetry
    #[must_use]
    pub fn route_only(route: RouteMeasurement) -> Self {
        Self {
            route,
            speed: Telemetry::Unavailable,
            weather: Telemetry::Unavailable,
        }
    }
}

/// Routing provider: travel times between two points
#[async_trait]
pub trait RouteProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Query current and congestion-free travel time from `origin` to `destination`
    async fn route(
        &self,
        origin: &GeoPoint,
        destination: &GeoPoint,
    ) -> Result<RouteMeasurement, UpstreamError>;
}

/// Speed provider: current and free-flow speed at a point
#[async_trait]
pub trait SpeedProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Speed sample at `point`, `Ok(None)` if the provider has no segment there
    async fn speed_at(&self, point: &GeoPoint) -> Result<Option<SpeedSample>, UpstreamError>;
}

/// Weather provider: current conditions at a point
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Current conditions at `point`
    async fn current(&self, point: &GeoPoint) -> Result<WeatherSnapshot, UpstreamError>;
}

/// Source of complete measurements, consumed by the scheduler
#[async_trait]
pub trait MeasurementSource: Send + Sync {
    /// Measure one route. At most one routing call is made; no retries.
    async fn measure(&self, route: &Route) -> Result<Measurement, UpstreamError>;
}
