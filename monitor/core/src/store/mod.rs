//! Series Store
//!
//! Per-route reading history: a bounded in-memory sequence plus a durable
//! append-only log.
//!
//! # Design
//!
//! ```text
//!   SeriesStore
//!   └── DashMap<RouteId, Arc<RouteSeries>>     (slots fixed at construction)
//!         ├── RwLock<VecDeque<Reading>>         (capped, FIFO eviction)
//!         └── DurableLog                        (one CSV file per route)
//! ```
//!
//! - **Single writer per route**: only the scheduler appends, and only after
//!   that route's own call resolves.
//! - **Readers never block each other**: they take the read lock and clone
//!   readings out. Mutation is append/evict only, so a reader sees either the
//!   old or the new tail.
//! - **Availability over durability**: a failed log write never undoes the
//!   in-memory append.

mod log;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::{Reading, Route, RouteId};

pub use log::{DurableLog, COLUMNS, HEADER};

/// Default per-route capacity: 2.5 days at a 5-minute cadence
pub const DEFAULT_CAPACITY: usize = 720;

/// Errors from the series store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The route was not configured
    #[error("Unknown route: {0}")]
    UnknownRoute(RouteId),

    /// Durable log I/O failed; the in-memory sequence was still updated
    #[error("Failed to write log at {path}: {source}")]
    Persistence {
        /// Log file path
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },
}

/// Store settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    /// Maximum readings held in memory per route
    pub capacity: usize,
    /// Directory holding the per-route log files
    pub log_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            log_dir: default_log_dir(),
        }
    }
}

/// `$XDG_DATA_HOME/crossing-monitor/logs`, or `./logs` if there is no data dir
#[must_use]
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|p| p.join("crossing-monitor").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

/// One route's slot
#[derive(Debug)]
struct RouteSeries {
    readings: RwLock<VecDeque<Reading>>,
    log: DurableLog,
}

/// Identifier-keyed reading store
#[derive(Debug)]
pub struct SeriesStore {
    slots: DashMap<RouteId, Arc<RouteSeries>>,
    capacity: usize,
    log_dir: PathBuf,
}

impl SeriesStore {
    /// Create a store with one slot per route
    ///
    /// The log directory is created here; if that fails the store still
    /// starts, and each append reports the write failure.
    pub fn new<'a>(config: &StoreConfig, routes: impl IntoIterator<Item = &'a Route>) -> Self {
        if let Err(e) = std::fs::create_dir_all(&config.log_dir) {
            warn!(
                error = %e,
                path = %config.log_dir.display(),
                "Failed to create log directory; readings will be kept in memory only"
            );
        }

        let capacity = config.capacity.max(1);
        let slots = DashMap::new();
        for route in routes {
            slots.insert(
                route.id.clone(),
                Arc::new(RouteSeries {
                    readings: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
                    log: DurableLog::new(config.log_dir.join(&route.log_file)),
                }),
            );
        }

        Self {
            slots,
            capacity,
            log_dir: config.log_dir.clone(),
        }
    }

    fn slot(&self, route_id: &RouteId) -> Result<Arc<RouteSeries>, StoreError> {
        self.slots
            .get(route_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| StoreError::UnknownRoute(route_id.clone()))
    }

    /// Per-route capacity
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Directory holding the log files
    #[must_use]
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Configured route identifiers, sorted
    #[must_use]
    pub fn route_ids(&self) -> Vec<RouteId> {
        let mut ids: Vec<RouteId> = self.slots.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Log file path of a route
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownRoute`] for unconfigured routes.
    pub fn log_path(&self, route_id: &RouteId) -> Result<PathBuf, StoreError> {
        Ok(self.slot(route_id)?.log.path().to_path_buf())
    }

    /// Append a reading to memory and to the durable log
    ///
    /// # Errors
    ///
    /// - [`StoreError::UnknownRoute`]: nothing was recorded
    /// - [`StoreError::Persistence`]: the reading is in memory but not on disk
    pub fn append(&self, route_id: &RouteId, reading: Reading) -> Result<(), StoreError> {
        let slot = self.slot(route_id)?;

        // Held across both writes so disk order matches memory order
        let mut readings = slot.readings.write();
        let persisted = slot.log.append(&reading);
        readings.push_back(reading);
        while readings.len() > self.capacity {
            readings.pop_front();
        }
        debug!(route = %route_id, held = readings.len(), "Reading stored");
        drop(readings);

        persisted.map_err(|source| StoreError::Persistence {
            path: slot.log.path().to_path_buf(),
            source,
        })
    }

    /// Most recent reading
    #[must_use]
    pub fn latest(&self, route_id: &RouteId) -> Option<Reading> {
        self.slot(route_id).ok()?.readings.read().back().cloned()
    }

    /// Up to `n` most recent readings, oldest first
    #[must_use]
    pub fn recent(&self, route_id: &RouteId, n: usize) -> Vec<Reading> {
        let Ok(slot) = self.slot(route_id) else {
            return Vec::new();
        };
        let readings = slot.readings.read();
        let skip = readings.len().saturating_sub(n);
        readings.iter().skip(skip).cloned().collect()
    }

    /// Full in-memory sequence, oldest first
    #[must_use]
    pub fn all(&self, route_id: &RouteId) -> Vec<Reading> {
        let Ok(slot) = self.slot(route_id) else {
            return Vec::new();
        };
        let readings = slot.readings.read();
        readings.iter().cloned().collect()
    }

    /// Number of readings held in memory
    #[must_use]
    pub fn len(&self, route_id: &RouteId) -> usize {
        let Ok(slot) = self.slot(route_id) else {
            return 0;
        };
        let readings = slot.readings.read();
        readings.len()
    }

    /// Whether a route holds no readings in memory
    #[must_use]
    pub fn is_empty(&self, route_id: &RouteId) -> bool {
        self.len(route_id) == 0
    }

    /// Raw durable log contents
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownRoute`], or [`StoreError::Persistence`] if the
    /// file exists but cannot be read.
    pub fn full_log(&self, route_id: &RouteId) -> Result<Vec<u8>, StoreError> {
        let slot = self.slot(route_id)?;
        slot.log
            .read_all()
            .map_err(|source| StoreError::Persistence {
                path: slot.log.path().to_path_buf(),
                source,
            })
    }
}
