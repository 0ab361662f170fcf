//! TOML Configuration File Support
//!
//! Loads the monitor configuration from `~/.config/crossing-monitor/monitor.toml`.
//!
//! # Configuration Priority
//!
//! Values are resolved with the following priority (highest first):
//! 1. CLI arguments (applied by the caller through [`ConfigOverrides`])
//! 2. Environment variables (`MONITOR_*`)
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [scheduler]
//! interval_secs = 300
//! overlap = "tolerate"
//!
//! [store]
//! capacity = 720
//! log_dir = "/var/lib/crossing-monitor"
//!
//! [classifier]
//! low_max = 2
//! moderate_max = 10
//!
//! [routing]
//! api_key = "..."
//! timeout_secs = 30
//!
//! [weather]
//! latitude = 32.5422
//! longitude = -117.0293
//! cache_ttl_secs = 600
//!
//! [[crossings]]
//! id = "san-ysidro"
//! name = "San Ysidro"
//!
//! [[crossings.routes]]
//! id = "sy-north"
//! name = "San Ysidro northbound"
//! origin = { lat = 32.5300, lon = -117.0210, label = "Tijuana" }
//! destination = { lat = 32.5422, lon = -117.0293, label = "San Ysidro POE" }
//! ```

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classifier::Thresholds;
use crate::model::{Crossing, CrossingId, GeoPoint, Route, RouteId};
use crate::scheduler::{OverlapPolicy, SchedulerConfig};
use crate::store::StoreConfig;
use crate::upstream::ProviderConfig;

/// Environment variable holding the routing API key
pub const ENV_API_KEY: &str = "MONITOR_API_KEY";
/// Environment variable overriding the polling interval (seconds)
pub const ENV_INTERVAL_SECS: &str = "MONITOR_INTERVAL_SECS";
/// Environment variable overriding the log directory
pub const ENV_LOG_DIR: &str = "MONITOR_LOG_DIR";
/// Environment variable overriding the per-route store capacity
pub const ENV_STORE_CAPACITY: &str = "MONITOR_STORE_CAPACITY";
/// Environment variable overriding the weather cache TTL (seconds)
pub const ENV_WEATHER_TTL_SECS: &str = "MONITOR_WEATHER_TTL_SECS";
/// Environment variable overriding the routing API host
pub const ENV_ROUTING_URL: &str = "MONITOR_ROUTING_URL";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// A required credential is not set
    #[error("Missing credential: {0}")]
    MissingCredential(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Scheduler section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerToml {
    /// Seconds between cycle starts
    pub interval_secs: Option<u64>,

    /// Behavior when a tick arrives during a running cycle
    pub overlap: Option<OverlapPolicy>,
}

/// Store section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreToml {
    /// Readings held in memory per route
    pub capacity: Option<usize>,

    /// Directory for the per-route CSV logs
    pub log_dir: Option<PathBuf>,
}

/// Classifier section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierToml {
    /// Largest delay (minutes) classified LOW
    pub low_max: Option<u32>,

    /// Largest delay (minutes) classified MODERATE
    pub moderate_max: Option<u32>,
}

/// Routing provider section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingToml {
    /// API host
    pub base_url: Option<String>,

    /// API key, shared with the speed provider
    pub api_key: Option<String>,

    /// Per-request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Speed provider section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedToml {
    /// Whether speed samples are collected
    pub enabled: Option<bool>,

    /// API host
    pub base_url: Option<String>,
}

/// Weather provider section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherToml {
    /// Whether weather is attached to readings
    pub enabled: Option<bool>,

    /// API host
    pub base_url: Option<String>,

    /// Latitude of the monitored area
    pub latitude: Option<f64>,

    /// Longitude of the monitored area
    pub longitude: Option<f64>,

    /// Snapshot lifetime in seconds
    pub cache_ttl_secs: Option<u64>,
}

/// One `[[routes]]` or `[[crossings.routes]]` entry
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouteToml {
    /// Unique route identifier
    pub id: String,

    /// Display name (defaults to the identifier)
    #[serde(default)]
    pub name: Option<String>,

    /// Start point
    pub origin: GeoPoint,

    /// End point
    pub destination: GeoPoint,

    /// Log file name relative to the log directory (defaults to `<id>.csv`)
    #[serde(default)]
    pub log_file: Option<String>,
}

impl RouteToml {
    fn into_route(self, crossing: &CrossingId) -> Route {
        let name = self.name.unwrap_or_else(|| self.id.clone());
        let route = Route::new(self.id.as_str(), name, self.origin, self.destination)
            .in_crossing(crossing.clone());
        match self.log_file {
            Some(file) => route.with_log_file(file),
            None => route,
        }
    }
}

/// One `[[crossings]]` entry
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CrossingToml {
    /// Unique crossing identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// Free-form description
    #[serde(default)]
    pub description: String,

    /// Routes in display order
    #[serde(default)]
    pub routes: Vec<RouteToml>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorToml {
    /// Scheduler configuration section
    pub scheduler: SchedulerToml,

    /// Store configuration section
    pub store: StoreToml,

    /// Classifier configuration section
    pub classifier: ClassifierToml,

    /// Routing provider section
    pub routing: RoutingToml,

    /// Speed provider section
    pub speed: SpeedToml,

    /// Weather provider section
    pub weather: WeatherToml,

    /// Crossings with their routes
    pub crossings: Vec<CrossingToml>,

    /// Routes that belong to no crossing
    pub routes: Vec<RouteToml>,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved monitor configuration
///
/// Use [`load_config`] to load with proper priority handling, then
/// [`MonitorConfig::validate`] before starting the engine.
#[derive(Clone, Debug)]
pub struct MonitorConfig {
    /// Polling cadence
    pub scheduler: SchedulerConfig,

    /// Store capacity and log location
    pub store: StoreConfig,

    /// Severity cut-offs
    pub thresholds: Thresholds,

    /// Upstream provider settings
    pub providers: ProviderConfig,

    /// Crossings in display order; ungrouped routes are collected in a
    /// trailing crossing with an empty identifier
    pub crossings: Vec<Crossing>,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            store: StoreConfig::default(),
            thresholds: Thresholds::default(),
            providers: ProviderConfig::default(),
            crossings: Vec::new(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl MonitorConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Every configured route, in display order
    #[must_use]
    pub fn routes(&self) -> Vec<Route> {
        self.crossings
            .iter()
            .flat_map(|c| c.routes.iter().cloned())
            .collect()
    }

    /// Check the configuration before startup
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingCredential`] if no API key is set, otherwise
    /// [`ConfigError::ValidationError`] for the first invalid value found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self
            .providers
            .api_key
            .as_deref()
            .map_or(true, |k| k.trim().is_empty())
        {
            return Err(ConfigError::MissingCredential(format!(
                "routing API key (set [routing] api_key or {ENV_API_KEY})"
            )));
        }

        if self.scheduler.interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "scheduler interval must be positive".to_string(),
            ));
        }
        if self.providers.request_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "request timeout must be positive".to_string(),
            ));
        }
        if self.store.capacity == 0 {
            return Err(ConfigError::ValidationError(
                "store capacity must be at least 1".to_string(),
            ));
        }
        if !self.thresholds.is_ordered() {
            return Err(ConfigError::ValidationError(format!(
                "classifier low_max ({}) must be below moderate_max ({})",
                self.thresholds.low_max, self.thresholds.moderate_max
            )));
        }
        if self.providers.weather_enabled && !self.providers.weather_location.is_valid() {
            return Err(ConfigError::ValidationError(
                "weather location is out of range".to_string(),
            ));
        }

        let routes = self.routes();
        if routes.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one route must be configured".to_string(),
            ));
        }

        let mut crossing_ids = HashSet::new();
        for crossing in &self.crossings {
            if !crossing.id.is_ungrouped() && !crossing_ids.insert(&crossing.id) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate crossing id '{}'",
                    crossing.id
                )));
            }
        }

        let mut route_ids: HashSet<&RouteId> = HashSet::new();
        let mut log_files = HashSet::new();
        for route in &routes {
            if route.id.as_str().trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "route id must not be empty".to_string(),
                ));
            }
            if !route_ids.insert(&route.id) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate route id '{}'",
                    route.id
                )));
            }
            if !log_files.insert(route.log_file.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "route '{}' shares log file '{}' with another route",
                    route.id, route.log_file
                )));
            }
            for (end, point) in [("origin", &route.origin), ("destination", &route.destination)] {
                if !point.is_valid() {
                    return Err(ConfigError::ValidationError(format!(
                        "route '{}' {end} ({}) is out of range",
                        route.id,
                        point.coordinate_pair()
                    )));
                }
            }
        }

        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/crossing-monitor/monitor.toml` or
/// `~/.config/crossing-monitor/monitor.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("crossing-monitor").join("monitor.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<MonitorConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path, then apply the process
/// environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<MonitorConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration from a specific path with a custom environment lookup
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<MonitorConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = MonitorConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: MonitorToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                routes = config.routes().len(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut MonitorConfig, toml: MonitorToml) {
    // Scheduler settings
    if let Some(secs) = toml.scheduler.interval_secs {
        config.scheduler.interval = Duration::from_secs(secs);
    }
    if let Some(overlap) = toml.scheduler.overlap {
        config.scheduler.overlap = overlap;
    }

    // Store settings
    if let Some(capacity) = toml.store.capacity {
        config.store.capacity = capacity;
    }
    if let Some(dir) = toml.store.log_dir {
        config.store.log_dir = dir;
    }

    // Classifier settings
    if let Some(low) = toml.classifier.low_max {
        config.thresholds.low_max = low;
    }
    if let Some(moderate) = toml.classifier.moderate_max {
        config.thresholds.moderate_max = moderate;
    }

    // Provider settings
    let providers = &mut config.providers;
    if let Some(url) = toml.routing.base_url {
        providers.routing_base_url = url;
    }
    if toml.routing.api_key.is_some() {
        providers.api_key = toml.routing.api_key;
    }
    if let Some(secs) = toml.routing.timeout_secs {
        providers.request_timeout = Duration::from_secs(secs);
    }
    if let Some(enabled) = toml.speed.enabled {
        providers.speed_enabled = enabled;
    }
    if let Some(url) = toml.speed.base_url {
        providers.speed_base_url = url;
    }
    if let Some(enabled) = toml.weather.enabled {
        providers.weather_enabled = enabled;
    }
    if let Some(url) = toml.weather.base_url {
        providers.weather_base_url = url;
    }
    if let Some(lat) = toml.weather.latitude {
        providers.weather_location.lat = lat;
    }
    if let Some(lon) = toml.weather.longitude {
        providers.weather_location.lon = lon;
    }
    if let Some(secs) = toml.weather.cache_ttl_secs {
        providers.weather_ttl = Duration::from_secs(secs);
    }

    // Crossings and routes
    let mut crossings: Vec<Crossing> = toml
        .crossings
        .into_iter()
        .map(|c| {
            let id = CrossingId::new(c.id);
            let routes = c.routes.into_iter().map(|r| r.into_route(&id)).collect();
            Crossing {
                id,
                name: c.name,
                description: c.description,
                routes,
            }
        })
        .collect();

    if !toml.routes.is_empty() {
        let id = CrossingId::default();
        let routes = toml.routes.into_iter().map(|r| r.into_route(&id)).collect();
        crossings.push(Crossing {
            id,
            name: "Routes".to_string(),
            description: String::new(),
            routes,
        });
    }

    if !crossings.is_empty() {
        config.crossings = crossings;
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut MonitorConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(key) = env(ENV_API_KEY) {
        config.providers.api_key = Some(key);
        config.source = ConfigSource::Env;
    }
    if let Some(url) = env(ENV_ROUTING_URL) {
        config.providers.routing_base_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(interval) = env(ENV_INTERVAL_SECS) {
        if let Ok(secs) = interval.parse::<u64>() {
            config.scheduler.interval = Duration::from_secs(secs);
            config.source = ConfigSource::Env;
        } else {
            tracing::warn!(value = %interval, "Ignoring invalid {ENV_INTERVAL_SECS}");
        }
    }
    if let Some(dir) = env(ENV_LOG_DIR) {
        config.store.log_dir = PathBuf::from(dir);
        config.source = ConfigSource::Env;
    }
    if let Some(capacity) = env(ENV_STORE_CAPACITY) {
        if let Ok(n) = capacity.parse::<usize>() {
            config.store.capacity = n;
            config.source = ConfigSource::Env;
        } else {
            tracing::warn!(value = %capacity, "Ignoring invalid {ENV_STORE_CAPACITY}");
        }
    }
    if let Some(ttl) = env(ENV_WEATHER_TTL_SECS) {
        if let Ok(secs) = ttl.parse::<u64>() {
            config.providers.weather_ttl = Duration::from_secs(secs);
            config.source = ConfigSource::Env;
        } else {
            tracing::warn!(value = %ttl, "Ignoring invalid {ENV_WEATHER_TTL_SECS}");
        }
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Polling interval override (seconds)
    pub interval_secs: Option<u64>,

    /// Log directory override
    pub log_dir: Option<PathBuf>,

    /// Store capacity override
    pub store_capacity: Option<usize>,

    /// API key override
    pub api_key: Option<String>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set polling interval override
    #[must_use]
    pub fn with_interval_secs(mut self, secs: u64) -> Self {
        self.interval_secs = Some(secs);
        self
    }

    /// Set log directory override
    #[must_use]
    pub fn with_log_dir(mut self, dir: PathBuf) -> Self {
        self.log_dir = Some(dir);
        self
    }

    /// Set store capacity override
    #[must_use]
    pub fn with_store_capacity(mut self, capacity: usize) -> Self {
        self.store_capacity = Some(capacity);
        self
    }

    /// Set API key override
    #[must_use]
    pub fn with_api_key(mut self, key: String) -> Self {
        self.api_key = Some(key);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut MonitorConfig) {
        if self.interval_secs.is_some()
            || self.log_dir.is_some()
            || self.store_capacity.is_some()
            || self.api_key.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(secs) = self.interval_secs {
            config.scheduler.interval = Duration::from_secs(secs);
        }

        if let Some(ref dir) = self.log_dir {
            config.store.log_dir = dir.clone();
        }

        if let Some(capacity) = self.store_capacity {
            config.store.capacity = capacity;
        }

        if let Some(ref key) = self.api_key {
            config.providers.api_key = Some(key.clone());
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
