//! Poll Scheduler
//!
//! Drives the polling cadence: one timer, one cycle per tick, one task per
//! route per cycle.
//!
//! # State Machine
//!
//! ```text
//!            tick
//!   ┌──────┐ ───────▶ ┌─────────┐
//!   │ Idle │          │ Polling │
//!   └──────┘ ◀─────── └─────────┘
//!          all cycles done
//! ```
//!
//! The first cycle runs immediately at startup. Cycles are timer-driven and
//! never back-pressured: with [`OverlapPolicy::Tolerate`] a slow cycle keeps
//! running while the next one starts, and writes land in arrival order.
//! [`OverlapPolicy::SkipIfBusy`] drops ticks that arrive while a cycle is
//! still in flight.
//!
//! # Failure Isolation
//!
//! Every route runs in its own task with its own error handling. A failed or
//! panicking route leaves its slot untouched for that cycle and has no effect
//! on any other route. There are no retries; the next cycle is the retry.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::classifier::Thresholds;
use crate::model::{Reading, Route, RouteId};
use crate::store::{SeriesStore, StoreError};
use crate::upstream::MeasurementSource;

/// Default polling interval: 5 minutes
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

/// Completed cycle reports buffered for slow subscribers
const REPORT_CHANNEL_CAPACITY: usize = 16;

/// What to do when a tick fires while a previous cycle is still running
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Start the new cycle anyway
    #[default]
    Tolerate,
    /// Skip this tick
    SkipIfBusy,
}

/// Scheduler settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Time between cycle starts
    pub interval: Duration,
    /// Overlap handling
    pub overlap: OverlapPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            overlap: OverlapPolicy::default(),
        }
    }
}

/// Scheduler state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerState {
    /// Between cycles
    Idle,
    /// At least one cycle in progress
    Polling,
}

/// A route that did not produce a durable reading in a cycle
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RouteFailure {
    /// Route
    pub route: RouteId,
    /// Error description
    pub reason: String,
}

/// Summary of one cycle
#[derive(Clone, Debug, Serialize)]
pub struct CycleReport {
    /// Unique cycle identifier
    pub cycle_id: Uuid,
    /// When the cycle started
    pub started_at: DateTime<Utc>,
    /// When the last route finished
    pub finished_at: DateTime<Utc>,
    /// Routes that recorded a reading
    pub succeeded: Vec<RouteId>,
    /// Routes that recorded nothing
    pub failed: Vec<RouteFailure>,
    /// Routes whose reading is in memory but not in the durable log
    pub not_persisted: Vec<RouteFailure>,
}

impl CycleReport {
    /// Whether every route recorded a reading
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.not_persisted.is_empty()
    }
}

enum RouteOutcome {
    Recorded,
    NotPersisted(String),
    Failed(String),
}

/// Decrements the in-flight count when a cycle ends, however it ends
struct InFlightGuard(Arc<AtomicUsize>);

impl InFlightGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Fixed-interval poller over all configured routes
pub struct Scheduler {
    source: Arc<dyn MeasurementSource>,
    store: Arc<SeriesStore>,
    routes: Arc<Vec<Route>>,
    thresholds: Thresholds,
    config: SchedulerConfig,
    in_flight: Arc<AtomicUsize>,
    cycles_started: AtomicU64,
    ticks_skipped: AtomicU64,
    reports: broadcast::Sender<CycleReport>,
}

impl Scheduler {
    /// Create a scheduler
    pub fn new(
        source: Arc<dyn MeasurementSource>,
        store: Arc<SeriesStore>,
        routes: Vec<Route>,
        thresholds: Thresholds,
        config: SchedulerConfig,
    ) -> Self {
        let (reports, _) = broadcast::channel(REPORT_CHANNEL_CAPACITY);
        Self {
            source,
            store,
            routes: Arc::new(routes),
            thresholds,
            config,
            in_flight: Arc::new(AtomicUsize::new(0)),
            cycles_started: AtomicU64::new(0),
            ticks_skipped: AtomicU64::new(0),
            reports,
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            SchedulerState::Polling
        } else {
            SchedulerState::Idle
        }
    }

    /// Cycles started so far
    #[must_use]
    pub fn cycles_started(&self) -> u64 {
        self.cycles_started.load(Ordering::SeqCst)
    }

    /// Ticks dropped by [`OverlapPolicy::SkipIfBusy`]
    #[must_use]
    pub fn ticks_skipped(&self) -> u64 {
        self.ticks_skipped.load(Ordering::SeqCst)
    }

    /// Subscribe to completed cycle reports
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CycleReport> {
        self.reports.subscribe()
    }

    /// Configured routes
    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Run one cycle now and wait for every route to finish
    pub async fn run_cycle(&self) -> CycleReport {
        let guard = InFlightGuard::enter(&self.in_flight);
        let report = self.poll_all().await;
        drop(guard);
        report
    }

    /// Run cycles on the configured interval until `shutdown` turns true
    /// (or its sender is dropped). In-flight cycles are awaited before
    /// returning.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycles: JoinSet<()> = JoinSet::new();

        info!(
            routes = self.routes.len(),
            interval_secs = self.config.interval.as_secs(),
            overlap = ?self.config.overlap,
            "Scheduler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.config.overlap == OverlapPolicy::SkipIfBusy
                        && self.state() == SchedulerState::Polling
                    {
                        self.ticks_skipped.fetch_add(1, Ordering::SeqCst);
                        warn!("Previous cycle still running, skipping tick");
                        continue;
                    }
                    let guard = InFlightGuard::enter(&self.in_flight);
                    let scheduler = Arc::clone(&self);
                    cycles.spawn(async move {
                        scheduler.poll_all().await;
                        drop(guard);
                    });
                }
                Some(joined) = cycles.join_next(), if !cycles.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Cycle task ended abnormally");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(in_flight = cycles.len(), "Scheduler stopping");
        while let Some(joined) = cycles.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Cycle task ended abnormally");
            }
        }
        info!("Scheduler stopped");
    }

    async fn poll_all(&self) -> CycleReport {
        let cycle_id = Uuid::new_v4();
        let started_at = Utc::now();
        let cycle_number = self.cycles_started.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(%cycle_id, cycle = cycle_number, "Cycle started");

        let mut tasks = JoinSet::new();
        for route in self.routes.iter().cloned() {
            let source = Arc::clone(&self.source);
            let store = Arc::clone(&self.store);
            let thresholds = self.thresholds;
            tasks.spawn(async move {
                let id = route.id.clone();
                let outcome = AssertUnwindSafe(poll_route(source, store, route, thresholds))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| RouteOutcome::Failed("poll task panicked".to_string()));
                (id, outcome)
            });
        }

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        let mut not_persisted = Vec::new();
        let mut reported: HashSet<RouteId> = HashSet::new();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((route, outcome)) => {
                    reported.insert(route.clone());
                    match outcome {
                        RouteOutcome::Recorded => succeeded.push(route),
                        RouteOutcome::NotPersisted(reason) => {
                            not_persisted.push(RouteFailure { route, reason });
                        }
                        RouteOutcome::Failed(reason) => failed.push(RouteFailure { route, reason }),
                    }
                }
                Err(e) => error!(%cycle_id, error = %e, "Route task ended abnormally"),
            }
        }

        // Tasks lost to cancellation are still accounted for
        for route in self.routes.iter() {
            if !reported.contains(&route.id) {
                failed.push(RouteFailure {
                    route: route.id.clone(),
                    reason: "poll task did not complete".to_string(),
                });
            }
        }

        let report = CycleReport {
            cycle_id,
            started_at,
            finished_at: Utc::now(),
            succeeded,
            failed,
            not_persisted,
        };

        info!(
            %cycle_id,
            cycle = cycle_number,
            ok = report.succeeded.len(),
            failed = report.failed.len(),
            not_persisted = report.not_persisted.len(),
            "Cycle finished"
        );

        // No subscribers is fine
        let _ = self.reports.send(report.clone());
        report
    }
}

async fn poll_route(
    source: Arc<dyn MeasurementSource>,
    store: Arc<SeriesStore>,
    route: Route,
    thresholds: Thresholds,
) -> RouteOutcome {
    let measurement = match source.measure(&route).await {
        Ok(m) => m,
        Err(e) => {
            warn!(route = %route.id, error = %e, "Poll failed, route left unchanged");
            return RouteOutcome::Failed(e.to_string());
        }
    };

    let reading = Reading::new(&route, &measurement.route, &thresholds, Utc::now())
        .with_speed(measurement.speed.into_option())
        .with_weather(measurement.weather.into_option());
    let severity = reading.severity;
    let delay = reading.delay_minutes;

    match store.append(&route.id, reading) {
        Ok(()) => {
            debug!(route = %route.id, delay_min = delay, %severity, "Reading recorded");
            RouteOutcome::Recorded
        }
        Err(e @ StoreError::Persistence { .. }) => {
            error!(route = %route.id, error = %e, "Reading kept in memory only");
            RouteOutcome::NotPersisted(e.to_string())
        }
        Err(e @ StoreError::UnknownRoute(_)) => {
            error!(route = %route.id, error = %e, "Reading dropped");
            RouteOutcome::Failed(e.to_string())
        }
    }
}
