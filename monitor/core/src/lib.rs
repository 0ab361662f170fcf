//! Monitor Core - Border Crossing Traffic Polling Engine
//!
//! This crate periodically measures travel time over a fixed set of border
//! crossing routes, classifies the congestion delay, and keeps a bounded
//! in-memory history per route backed by an append-only CSV log. It has no
//! presentation layer; dashboards read through [`QueryInterface`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Scheduler                               │
//! │   tick ──▶ one task per route ──▶ MeasurementSource::measure     │
//! └───────────────────────────┬──────────────────────────────────────┘
//!                             │ RouteMeasurement + Telemetry
//!                             ▼
//! ┌──────────────────┐   ┌──────────────────┐   ┌───────────────────┐
//! │  UpstreamClient  │   │    Classifier    │   │    SeriesStore    │
//! │  ┌────────────┐  │   │  delay ─▶ LOW    │   │  ┌─────────────┐  │
//! │  │  Routing   │  │   │         MODERATE │──▶│  │ VecDeque    │  │
//! │  │  Flow      │  │   │         HIGH     │   │  │ (capped)    │  │
//! │  │  Weather ⟳ │  │   └──────────────────┘   │  ├─────────────┤  │
//! │  └────────────┘  │                          │  │ CSV log     │  │
//! └──────────────────┘                          │  └─────────────┘  │
//!                                               └─────────┬─────────┘
//!                                                         │
//!                                               ┌─────────▼─────────┐
//!                                               │  QueryInterface   │
//!                                               │   (read-only)     │
//!                                               └───────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use monitor_core::{
//!     config::load_config, QueryInterface, Scheduler, SeriesStore, UpstreamClient,
//! };
//!
//! let config = load_config()?;
//! config.validate()?;
//!
//! let routes = config.routes();
//! let store = Arc::new(SeriesStore::new(&config.store, &routes));
//! let source = Arc::new(UpstreamClient::from_config(&config.providers)?);
//! let scheduler = Arc::new(Scheduler::new(
//!     source,
//!     Arc::clone(&store),
//!     routes,
//!     config.thresholds,
//!     config.scheduler.clone(),
//! ));
//! let query = QueryInterface::new(store, config.crossings.clone());
//!
//! let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! tokio::spawn(scheduler.run(shutdown_rx));
//! println!("{:?}", query.snapshot().worst);
//! ```
//!
//! # Module Overview
//!
//! - [`classifier`]: Delay to severity mapping
//! - [`config`]: TOML, environment and CLI configuration
//! - [`model`]: Routes, crossings, measurements and readings
//! - [`query`]: Read-only snapshot and history access
//! - [`scheduler`]: Fixed-interval polling of every route
//! - [`store`]: Bounded per-route history plus durable CSV log
//! - [`upstream`]: Routing, flow and weather providers

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod classifier;
pub mod config;
pub mod model;
pub mod query;
pub mod scheduler;
pub mod store;
pub mod upstream;

// Re-exports for convenience
pub use classifier::{classify, worst, Severity, Thresholds};
pub use config::{
    load_config, load_config_from_path, ConfigError, ConfigOverrides, ConfigSource, MonitorConfig,
};
pub use model::{
    Crossing, CrossingId, GeoPoint, Reading, Route, RouteId, RouteMeasurement, SpeedSample,
    WeatherSnapshot,
};
pub use query::{ChartPoint, CrossingStatus, MonitorSnapshot, QueryInterface, RouteStatus};
pub use scheduler::{
    CycleReport, OverlapPolicy, RouteFailure, Scheduler, SchedulerConfig, SchedulerState,
};
pub use store::{SeriesStore, StoreConfig, StoreError};
pub use upstream::{
    Measurement, MeasurementSource, ProviderConfig, Telemetry, UpstreamClient, UpstreamError,
};
