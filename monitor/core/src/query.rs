//! Query Interface
//!
//! Read-only view of the store for presentation layers. Every call clones
//! readings out of the store, so callers never hold a lock.
//!
//! ```text
//!   MonitorSnapshot
//!   ├── worst                     (over every route)
//!   └── crossings[]
//!         ├── worst               (over this crossing's routes)
//!         └── routes[]
//!               └── latest        (None until the first successful poll)
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::classifier::{worst, Severity};
use crate::model::{Crossing, CrossingId, GeoPoint, Reading, RouteId};
use crate::store::{SeriesStore, StoreError};

/// Latest state of one route
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RouteStatus {
    /// Route identifier
    pub id: RouteId,
    /// Display name
    pub name: String,
    /// Start point
    pub origin: GeoPoint,
    /// End point
    pub destination: GeoPoint,
    /// Most recent reading
    pub latest: Option<Reading>,
    /// Readings currently held in memory
    pub readings_held: usize,
}

/// Latest state of one crossing
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CrossingStatus {
    /// Crossing identifier (empty for ungrouped routes)
    pub id: CrossingId,
    /// Display name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Worst latest severity among the crossing's routes
    pub worst: Option<Severity>,
    /// Route states in configured order
    pub routes: Vec<RouteStatus>,
}

/// Point-in-time view of every configured route
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MonitorSnapshot {
    /// When the snapshot was taken
    pub generated_at: DateTime<Utc>,
    /// Worst latest severity across all routes
    pub worst: Option<Severity>,
    /// Crossings in configured order
    pub crossings: Vec<CrossingStatus>,
}

impl MonitorSnapshot {
    /// Look up a route's status by identifier
    #[must_use]
    pub fn route(&self, id: &RouteId) -> Option<&RouteStatus> {
        self.crossings
            .iter()
            .flat_map(|c| c.routes.iter())
            .find(|r| &r.id == id)
    }
}

/// One chart sample
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChartPoint {
    /// Reading time
    pub timestamp: DateTime<Utc>,
    /// Travel time with traffic (minutes)
    pub traffic: u32,
    /// Congestion-free travel time (minutes)
    pub baseline: u32,
    /// Delay (minutes)
    pub delay: u32,
}

impl From<&Reading> for ChartPoint {
    fn from(reading: &Reading) -> Self {
        Self {
            timestamp: reading.timestamp,
            traffic: reading.traffic_minutes,
            baseline: reading.baseline_minutes,
            delay: reading.delay_minutes,
        }
    }
}

/// Read-only façade over the series store
#[derive(Clone, Debug)]
pub struct QueryInterface {
    store: Arc<SeriesStore>,
    crossings: Arc<Vec<Crossing>>,
}

impl QueryInterface {
    /// Create a façade over `store` for the configured crossings
    pub fn new(store: Arc<SeriesStore>, crossings: Vec<Crossing>) -> Self {
        Self {
            store,
            crossings: Arc::new(crossings),
        }
    }

    /// Configured crossings
    #[must_use]
    pub fn crossings(&self) -> &[Crossing] {
        &self.crossings
    }

    /// Latest reading of every route, grouped by crossing
    #[must_use]
    pub fn snapshot(&self) -> MonitorSnapshot {
        let crossings: Vec<CrossingStatus> = self
            .crossings
            .iter()
            .map(|crossing| {
                let routes: Vec<RouteStatus> = crossing
                    .routes
                    .iter()
                    .map(|route| RouteStatus {
                        id: route.id.clone(),
                        name: route.name.clone(),
                        origin: route.origin.clone(),
                        destination: route.destination.clone(),
                        latest: self.store.latest(&route.id),
                        readings_held: self.store.len(&route.id),
                    })
                    .collect();
                CrossingStatus {
                    id: crossing.id.clone(),
                    name: crossing.name.clone(),
                    description: crossing.description.clone(),
                    worst: worst(
                        routes
                            .iter()
                            .filter_map(|r| r.latest.as_ref().map(|l| l.severity)),
                    ),
                    routes,
                }
            })
            .collect();

        MonitorSnapshot {
            generated_at: Utc::now(),
            worst: worst(crossings.iter().filter_map(|c| c.worst)),
            crossings,
        }
    }

    /// Most recent reading of one route
    #[must_use]
    pub fn latest(&self, route_id: &RouteId) -> Option<Reading> {
        self.store.latest(route_id)
    }

    /// Up to `n` most recent readings, oldest first; `n` is capped at the
    /// store capacity
    #[must_use]
    pub fn recent(&self, route_id: &RouteId, n: usize) -> Vec<Reading> {
        self.store.recent(route_id, n.min(self.store.capacity()))
    }

    /// Chart samples for the `n` most recent readings
    #[must_use]
    pub fn chart(&self, route_id: &RouteId, n: usize) -> Vec<ChartPoint> {
        self.recent(route_id, n).iter().map(ChartPoint::from).collect()
    }

    /// Full in-memory history
    #[must_use]
    pub fn history(&self, route_id: &RouteId) -> Vec<Reading> {
        self.store.all(route_id)
    }

    /// Raw durable log, suitable for download
    ///
    /// # Errors
    ///
    /// See [`SeriesStore::full_log`].
    pub fn log_bytes(&self, route_id: &RouteId) -> Result<Vec<u8>, StoreError> {
        self.store.full_log(route_id)
    }

    /// Worst latest severity among `route_ids`; routes without readings are
    /// ignored
    #[must_use]
    pub fn worst_severity(&self, route_ids: &[RouteId]) -> Option<Severity> {
        worst(
            route_ids
                .iter()
                .filter_map(|id| self.store.latest(id))
                .map(|r| r.severity),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Thresholds;
    use crate::model::{Route, RouteMeasurement};
    use crate::store::StoreConfig;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn route(id: &str, crossing: &str) -> Route {
        Route::new(
            id,
            format!("Route {id}"),
            GeoPoint::new(32.53, -117.02, "start"),
            GeoPoint::new(32.54, -117.03, "end"),
        )
        .in_crossing(CrossingId::new(crossing))
    }

    fn crossings() -> Vec<Crossing> {
        vec![
            Crossing {
                id: CrossingId::new("san-ysidro"),
                name: "San Ysidro".to_string(),
                description: "Busiest land crossing".to_string(),
                routes: vec![route("sy-north", "san-ysidro"), route("sy-ready", "san-ysidro")],
            },
            Crossing {
                id: CrossingId::new("otay"),
                name: "Otay Mesa".to_string(),
                description: String::new(),
                routes: vec![route("otay-north", "otay")],
            },
        ]
    }

    fn setup(dir: &TempDir, capacity: usize) -> (QueryInterface, Arc<SeriesStore>) {
        let crossings = crossings();
        let store = Arc::new(SeriesStore::new(
            &StoreConfig {
                capacity,
                log_dir: dir.path().to_path_buf(),
            },
            crossings.iter().flat_map(|c| c.routes.iter()),
        ));
        (QueryInterface::new(Arc::clone(&store), crossings), store)
    }

    fn record(store: &SeriesStore, route: &Route, traffic: u32, baseline: u32) {
        let measurement = RouteMeasurement {
            traffic_minutes: traffic,
            baseline_minutes: baseline,
            distance_km: 3.0,
        };
        let reading = Reading::new(route, &measurement, &Thresholds::default(), Utc::now());
        store.append(&route.id, reading).unwrap();
    }

    #[test]
    fn test_snapshot_before_any_poll() {
        let dir = TempDir::new().unwrap();
        let (query, _) = setup(&dir, 10);

        let snapshot = query.snapshot();
        assert_eq!(snapshot.worst, None);
        assert_eq!(snapshot.crossings.len(), 2);
        for crossing in &snapshot.crossings {
            assert_eq!(crossing.worst, None);
            assert!(crossing.routes.iter().all(|r| r.latest.is_none()));
        }
    }

    #[test]
    fn test_snapshot_aggregates_worst() {
        let dir = TempDir::new().unwrap();
        let (query, store) = setup(&dir, 10);
        let crossings = crossings();

        // sy-north: 17/9 -> MODERATE, sy-ready: 9/9 -> LOW, otay-north: 43/10 -> HIGH
        record(&store, &crossings[0].routes[0], 17, 9);
        record(&store, &crossings[0].routes[1], 9, 9);
        record(&store, &crossings[1].routes[0], 43, 10);

        let snapshot = query.snapshot();
        assert_eq!(snapshot.crossings[0].worst, Some(Severity::Moderate));
        assert_eq!(snapshot.crossings[1].worst, Some(Severity::High));
        assert_eq!(snapshot.worst, Some(Severity::High));

        let sy_north = snapshot.route(&RouteId::new("sy-north")).unwrap();
        assert_eq!(sy_north.latest.as_ref().unwrap().delay_minutes, 8);
        assert_eq!(sy_north.readings_held, 1);
    }

    #[test]
    fn test_worst_severity_over_subset() {
        let dir = TempDir::new().unwrap();
        let (query, store) = setup(&dir, 10);
        let crossings = crossings();
        record(&store, &crossings[0].routes[0], 17, 9);
        record(&store, &crossings[0].routes[1], 9, 9);

        let ids = [RouteId::new("sy-north"), RouteId::new("sy-ready")];
        assert_eq!(query.worst_severity(&ids), Some(Severity::Moderate));
        assert_eq!(query.worst_severity(&ids[1..]), Some(Severity::Low));
        assert_eq!(query.worst_severity(&[RouteId::new("otay-north")]), None);
        assert_eq!(query.worst_severity(&[]), None);
    }

    #[test]
    fn test_recent_capped_at_capacity() {
        let dir = TempDir::new().unwrap();
        let (query, store) = setup(&dir, 3);
        let route = &crossings()[1].routes[0];
        for traffic in 10..16 {
            record(&store, route, traffic, 10);
        }

        let recent = query.recent(&route.id, 100);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent.last().unwrap().traffic_minutes, 15);
        assert_eq!(query.history(&route.id).len(), 3);

        let chart = query.chart(&route.id, 2);
        assert_eq!(
            chart.iter().map(|p| (p.traffic, p.delay)).collect::<Vec<_>>(),
            vec![(14, 4), (15, 5)]
        );
    }

    #[test]
    fn test_log_bytes() {
        let dir = TempDir::new().unwrap();
        let (query, store) = setup(&dir, 10);
        let route = &crossings()[0].routes[0];

        assert!(query.log_bytes(&route.id).unwrap().is_empty());
        record(&store, route, 17, 9);
        let log = String::from_utf8(query.log_bytes(&route.id).unwrap()).unwrap();
        assert_eq!(log.lines().count(), 2);
        assert!(query.log_bytes(&RouteId::new("ghost")).is_err());
    }

    #[test]
    fn test_snapshot_serializes() {
        let dir = TempDir::new().unwrap();
        let (query, store) = setup(&dir, 10);
        record(&store, &crossings()[1].routes[0], 43, 10);

        let json = serde_json::to_value(query.snapshot()).unwrap();
        assert_eq!(json["worst"], "HIGH");
        assert_eq!(json["crossings"][1]["routes"][0]["latest"]["severity"], "HIGH");
    }
}
