//! Weather Codes and Snapshot Cache
//!
//! WMO weather interpretation codes are grouped into a small fixed set of
//! conditions, each with a description and an icon.
//!
//! [`WeatherCache`] bounds traffic to the weather provider: every route in a
//! cycle reads the same snapshot, and the provider is queried at most once per
//! TTL window.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::traits::{Telemetry, WeatherProvider};
use crate::model::{GeoPoint, WeatherSnapshot};

/// Default snapshot lifetime: 10 minutes
pub const DEFAULT_WEATHER_TTL: Duration = Duration::from_secs(600);

/// A weather condition group
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WeatherKind {
    /// Human description
    pub description: &'static str,
    /// Icon
    pub icon: &'static str,
}

const UNKNOWN: WeatherKind = WeatherKind {
    description: "Unknown",
    icon: "❓",
};

/// Inclusive code ranges and their condition
const WEATHER_CODES: &[(u16, u16, WeatherKind)] = &[
    (0, 0, WeatherKind { description: "Clear sky", icon: "☀️" }),
    (1, 2, WeatherKind { description: "Partly cloudy", icon: "⛅" }),
    (3, 3, WeatherKind { description: "Overcast", icon: "☁️" }),
    (45, 48, WeatherKind { description: "Fog", icon: "🌫️" }),
    (51, 57, WeatherKind { description: "Drizzle", icon: "🌦️" }),
    (61, 67, WeatherKind { description: "Rain", icon: "🌧️" }),
    (71, 77, WeatherKind { description: "Snow", icon: "❄️" }),
    (80, 82, WeatherKind { description: "Rain showers", icon: "🌦️" }),
    (85, 86, WeatherKind { description: "Snow", icon: "❄️" }),
    (95, 99, WeatherKind { description: "Thunderstorm", icon: "⛈️" }),
];

/// Map a WMO code to its condition group
#[must_use]
pub fn describe_code(code: u16) -> WeatherKind {
    WEATHER_CODES
        .iter()
        .find(|(low, high, _)| (*low..=*high).contains(&code))
        .map_or(UNKNOWN, |(_, _, kind)| *kind)
}

struct CachedSnapshot {
    snapshot: WeatherSnapshot,
    fetched: Instant,
}

/// TTL cache in front of a [`WeatherProvider`] for one fixed location
///
/// The slot lock is held across the upstream call, so concurrent misses
/// result in a single request. Failed fetches are not cached and an expired
/// snapshot is never served.
pub struct WeatherCache {
    provider: Arc<dyn WeatherProvider>,
    location: GeoPoint,
    ttl: Duration,
    slot: Mutex<Option<CachedSnapshot>>,
}

impl WeatherCache {
    /// Create a cache for `location`
    pub fn new(provider: Arc<dyn WeatherProvider>, location: GeoPoint, ttl: Duration) -> Self {
        Self {
            provider,
            location,
            ttl,
            slot: Mutex::new(None),
        }
    }

    /// Configured lifetime
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Current snapshot, fetching if the cached one is missing or expired
    pub async fn get(&self) -> Telemetry<WeatherSnapshot> {
        let mut slot = self.slot.lock().await;

        if let Some(cached) = slot.as_ref() {
            if cached.fetched.elapsed() < self.ttl {
                return Telemetry::Available(cached.snapshot.clone());
            }
        }

        match self.provider.current(&self.location).await {
            Ok(snapshot) => {
                debug!(
                    provider = self.provider.name(),
                    code = snapshot.code,
                    "Weather snapshot refreshed"
                );
                *slot = Some(CachedSnapshot {
                    snapshot: snapshot.clone(),
                    fetched: Instant::now(),
                });
                Telemetry::Available(snapshot)
            }
            Err(e) => {
                warn!(provider = self.provider.name(), error = %e, "Weather fetch failed");
                *slot = None;
                Telemetry::Failed(e)
            }
        }
    }
}
