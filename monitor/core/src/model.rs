//! Monitor Data Model
//!
//! Routes and crossings are configuration: they are loaded once at startup and
//! never mutated. Readings are produced by the scheduler, one per successful
//! poll of one route, and are immutable once created.
//!
//! # Identifiers
//!
//! Routes are addressed by [`RouteId`] everywhere (store slots, durable logs,
//! queries). Positions in configuration lists carry no meaning.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classifier::{Severity, Thresholds};

// ============================================================================
// Identifiers
// ============================================================================

/// Route identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteId(pub String);

impl RouteId {
    /// Create a route identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RouteId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Crossing identifier (empty for routes configured without a crossing)
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CrossingId(pub String);

impl CrossingId {
    /// Create a crossing identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the implicit group of ungrouped routes
    #[must_use]
    pub fn is_ungrouped(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CrossingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Configuration Entities
// ============================================================================

/// A geographic point with a human label
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in decimal degrees
    pub lat: f64,
    /// Longitude in decimal degrees
    pub lon: f64,
    /// Human-readable label ("Tijuana", "San Ysidro", ...)
    #[serde(default)]
    pub label: String,
}

impl GeoPoint {
    /// Create a point
    pub fn new(lat: f64, lon: f64, label: impl Into<String>) -> Self {
        Self {
            lat,
            lon,
            label: label.into(),
        }
    }

    /// `lat,lon` as used in provider URLs
    #[must_use]
    pub fn coordinate_pair(&self) -> String {
        format!("{},{}", self.lat, self.lon)
    }

    /// Whether latitude and longitude are inside their valid ranges
    #[must_use]
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }
}

/// One directional origin → destination measurement target
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Unique route identifier
    pub id: RouteId,
    /// Display name
    pub name: String,
    /// Start of the route
    pub origin: GeoPoint,
    /// End of the route
    pub destination: GeoPoint,
    /// Durable log file name, relative to the log directory
    pub log_file: String,
    /// Crossing this route belongs to
    pub crossing: CrossingId,
}

impl Route {
    /// Create a route; the log file defaults to `<id>.csv`
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> Self {
        let id = RouteId::new(id);
        let log_file = format!("{id}.csv");
        Self {
            id,
            name: name.into(),
            origin,
            destination,
            log_file,
            crossing: CrossingId::default(),
        }
    }

    /// Assign the route to a crossing
    #[must_use]
    pub fn in_crossing(mut self, crossing: CrossingId) -> Self {
        self.crossing = crossing;
        self
    }

    /// Override the durable log file name
    #[must_use]
    pub fn with_log_file(mut self, log_file: impl Into<String>) -> Self {
        self.log_file = log_file.into();
        self
    }
}

/// A named group of routes representing a physical checkpoint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Crossing {
    /// Unique crossing identifier
    pub id: CrossingId,
    /// Display name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Routes in display order
    pub routes: Vec<Route>,
}

// ============================================================================
// Measurements
// ============================================================================

/// Normalized result of one routing call
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteMeasurement {
    /// Travel time under current conditions (minutes, rounded)
    pub traffic_minutes: u32,
    /// Best available congestion-free travel time (minutes, rounded)
    pub baseline_minutes: u32,
    /// Route length (kilometers, one decimal)
    pub distance_km: f64,
}

impl RouteMeasurement {
    /// Build a measurement from provider seconds and meters.
    ///
    /// The baseline falls back from historic to free-flow to the current time
    /// itself, in which case the delay resolves to zero.
    #[must_use]
    pub fn from_provider(
        traffic_secs: u64,
        historic_secs: Option<u64>,
        no_traffic_secs: Option<u64>,
        length_meters: u64,
    ) -> Self {
        let baseline_secs = historic_secs.or(no_traffic_secs).unwrap_or(traffic_secs);
        Self {
            traffic_minutes: seconds_to_minutes(traffic_secs),
            baseline_minutes: seconds_to_minutes(baseline_secs),
            distance_km: (length_meters as f64 / 100.0).round() / 10.0,
        }
    }

    /// Delay in minutes, clamped at zero
    #[must_use]
    pub fn delay_minutes(&self) -> u32 {
        self.traffic_minutes.saturating_sub(self.baseline_minutes)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn seconds_to_minutes(secs: u64) -> u32 {
    (secs as f64 / 60.0).round() as u32
}

/// Current speed at a point compared to free flow
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeedSample {
    /// Current speed (km/h)
    pub current_kmh: f64,
    /// Free-flow speed (km/h)
    pub free_flow_kmh: f64,
    /// Current speed as a percentage of free flow
    pub percent_of_free_flow: u32,
}

impl SpeedSample {
    /// Build a sample; the percentage is 0 when free flow is unknown
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn new(current_kmh: f64, free_flow_kmh: f64) -> Self {
        let percent_of_free_flow = if free_flow_kmh > 0.0 {
            (current_kmh / free_flow_kmh * 100.0).round().max(0.0) as u32
        } else {
            0
        };
        Self {
            current_kmh,
            free_flow_kmh,
            percent_of_free_flow,
        }
    }
}

/// Weather conditions at the monitored area
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    /// Air temperature (°C)
    pub temperature_c: f64,
    /// Precipitation (mm)
    pub precipitation_mm: f64,
    /// Wind speed (km/h)
    pub wind_kmh: f64,
    /// WMO weather interpretation code
    pub code: u16,
    /// Human description of the code
    pub description: String,
    /// Icon for the code
    pub icon: String,
    /// When the provider was queried
    pub fetched_at: DateTime<Utc>,
}

// ============================================================================
// Readings
// ============================================================================

/// One persisted, timestamped measurement of a route
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// When the measurement was taken
    pub timestamp: DateTime<Utc>,
    /// Route measured
    pub route: RouteId,
    /// Crossing the route belongs to
    pub crossing: CrossingId,
    /// Travel time under current conditions (minutes)
    pub traffic_minutes: u32,
    /// Congestion-free travel time (minutes)
    pub baseline_minutes: u32,
    /// `max(0, traffic - baseline)`
    pub delay_minutes: u32,
    /// Congestion classification of the delay
    pub severity: Severity,
    /// Route length (kilometers)
    pub distance_km: f64,
    /// Speed at the route origin, if available
    pub speed: Option<SpeedSample>,
    /// Weather at the monitored area, if available
    pub weather: Option<WeatherSnapshot>,
}

impl Reading {
    /// Build a reading for `route` from a routing measurement
    #[must_use]
    pub fn new(
        route: &Route,
        measurement: &RouteMeasurement,
        thresholds: &Thresholds,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let delay_minutes = measurement.delay_minutes();
        Self {
            timestamp,
            route: route.id.clone(),
            crossing: route.crossing.clone(),
            traffic_minutes: measurement.traffic_minutes,
            baseline_minutes: measurement.baseline_minutes,
            delay_minutes,
            severity: thresholds.classify(delay_minutes),
            distance_km: measurement.distance_km,
            speed: None,
            weather: None,
        }
    }

    /// Attach a speed sample
    #[must_use]
    pub fn with_speed(mut self, speed: Option<SpeedSample>) -> Self {
        self.speed = speed;
        self
    }

    /// Attach a weather snapshot
    #[must_use]
    pub fn with_weather(mut self, weather: Option<WeatherSnapshot>) -> Self {
        self.weather = weather;
        self
    }
}
