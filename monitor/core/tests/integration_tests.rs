//! Integration tests for the polling engine
//!
//! These tests wire real components together with fake providers:
//! - Configuration file driving store, scheduler and query layout
//! - Full cycles through `UpstreamClient` (routing, flow, cached weather)
//! - Durable log row counts across many cycles and evictions
//! - Concurrent readers while cycles are writing

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tempfile::{NamedTempFile, TempDir};
use tokio::sync::watch;

use monitor_core::config::load_config_with_env;
use monitor_core::store::HEADER;
use monitor_core::upstream::{RouteProvider, SpeedProvider, WeatherCache, WeatherProvider};
use monitor_core::{
    GeoPoint, MonitorConfig, QueryInterface, RouteId, RouteMeasurement, Scheduler, SeriesStore,
    Severity, SpeedSample, UpstreamClient, UpstreamError, WeatherSnapshot,
};

// =============================================================================
// Fake Providers
// =============================================================================

/// Routing keyed by origin label; unknown labels have no route
#[derive(Default)]
struct LabelRouting {
    minutes: Mutex<HashMap<String, (u32, u32)>>,
    calls: AtomicUsize,
}

impl LabelRouting {
    fn set(&self, label: &str, traffic: u32, baseline: u32) {
        self.minutes
            .lock()
            .insert(label.to_string(), (traffic, baseline));
    }
}

#[async_trait]
impl RouteProvider for LabelRouting {
    fn name(&self) -> &str {
        "label-routing"
    }

    async fn route(
        &self,
        origin: &GeoPoint,
        _destination: &GeoPoint,
    ) -> Result<RouteMeasurement, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let entry = self.minutes.lock().get(&origin.label).copied();
        match entry {
            Some((traffic, baseline)) => Ok(RouteMeasurement {
                traffic_minutes: traffic,
                baseline_minutes: baseline,
                distance_km: 4.2,
            }),
            None => Err(UpstreamError::Status {
                status: 503,
                body: "unavailable".to_string(),
            }),
        }
    }
}

struct SlowFlow;

#[async_trait]
impl SpeedProvider for SlowFlow {
    fn name(&self) -> &str {
        "slow-flow"
    }

    async fn speed_at(&self, _point: &GeoPoint) -> Result<Option<SpeedSample>, UpstreamError> {
        Ok(Some(SpeedSample::new(20.0, 80.0)))
    }
}

#[derive(Default)]
struct CountingWeather {
    calls: AtomicUsize,
}

#[async_trait]
impl WeatherProvider for CountingWeather {
    fn name(&self) -> &str {
        "counting-weather"
    }

    async fn current(&self, _point: &GeoPoint) -> Result<WeatherSnapshot, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(WeatherSnapshot {
            temperature_c: 21.5,
            precipitation_mm: 0.0,
            wind_kmh: 12.0,
            code: 3,
            description: "Overcast".to_string(),
            icon: "☁️".to_string(),
            fetched_at: Utc::now(),
        })
    }
}

// =============================================================================
// Harness
// =============================================================================

const CONFIG_TOML: &str = r#"
[scheduler]
interval_secs = 300

[store]
capacity = 5

[routing]
api_key = "test-key"

[[crossings]]
id = "san-ysidro"
name = "San Ysidro"

[[crossings.routes]]
id = "sy-north"
origin = { lat = 32.5300, lon = -117.0210, label = "sy" }
destination = { lat = 32.5422, lon = -117.0293, label = "poe" }

[[crossings.routes]]
id = "sy-ready"
origin = { lat = 32.5310, lon = -117.0220, label = "ready" }
destination = { lat = 32.5422, lon = -117.0293, label = "poe" }

[[crossings]]
id = "otay"
name = "Otay Mesa"

[[crossings.routes]]
id = "otay-north"
origin = { lat = 32.5500, lon = -116.9400, label = "otay" }
destination = { lat = 32.5600, lon = -116.9300, label = "poe" }
"#;

struct Engine {
    _log_dir: TempDir,
    config: MonitorConfig,
    routing: Arc<LabelRouting>,
    weather: Arc<CountingWeather>,
    store: Arc<SeriesStore>,
    scheduler: Arc<Scheduler>,
    query: QueryInterface,
}

fn engine() -> Engine {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(CONFIG_TOML.as_bytes()).unwrap();
    let log_dir = TempDir::new().unwrap();
    let log_dir_str = log_dir.path().to_string_lossy().to_string();

    let config = load_config_with_env(Some(file.path().to_path_buf()), |key| {
        (key == "MONITOR_LOG_DIR").then(|| log_dir_str.clone())
    })
    .unwrap();
    config.validate().unwrap();

    let routing = Arc::new(LabelRouting::default());
    let weather = Arc::new(CountingWeather::default());
    let cache = Arc::new(WeatherCache::new(
        weather.clone(),
        config.providers.weather_location.clone(),
        config.providers.weather_ttl,
    ));
    let source = Arc::new(
        UpstreamClient::new(routing.clone())
            .with_speed(Arc::new(SlowFlow))
            .with_weather(cache),
    );

    let routes = config.routes();
    let store = Arc::new(SeriesStore::new(&config.store, &routes));
    let scheduler = Arc::new(Scheduler::new(
        source,
        Arc::clone(&store),
        routes,
        config.thresholds,
        config.scheduler.clone(),
    ));
    let query = QueryInterface::new(Arc::clone(&store), config.crossings.clone());

    Engine {
        _log_dir: log_dir,
        config,
        routing,
        weather,
        store,
        scheduler,
        query,
    }
}

fn id(s: &str) -> RouteId {
    RouteId::new(s)
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_full_cycle_populates_snapshot() {
    let engine = engine();
    engine.routing.set("sy", 17, 9);
    engine.routing.set("ready", 9, 9);
    engine.routing.set("otay", 43, 10);

    let report = engine.scheduler.run_cycle().await;
    assert!(report.is_clean());
    assert_eq!(report.succeeded.len(), 3);

    let snapshot = engine.query.snapshot();
    assert_eq!(snapshot.worst, Some(Severity::High));
    assert_eq!(snapshot.crossings[0].worst, Some(Severity::Moderate));
    assert_eq!(snapshot.crossings[1].worst, Some(Severity::High));

    let sy = snapshot.route(&id("sy-north")).unwrap().latest.clone().unwrap();
    assert_eq!(sy.delay_minutes, 8);
    assert_eq!(sy.speed.unwrap().percent_of_free_flow, 25);
    assert_eq!(sy.weather.unwrap().description, "Overcast");
}

#[tokio::test]
async fn test_weather_fetched_once_per_ttl() {
    let engine = engine();
    for label in ["sy", "ready", "otay"] {
        engine.routing.set(label, 10, 10);
    }

    engine.scheduler.run_cycle().await;
    engine.scheduler.run_cycle().await;

    // Six successful measurements share a single weather call
    assert_eq!(engine.routing.calls.load(Ordering::SeqCst), 6);
    assert_eq!(engine.weather.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_route_isolated_and_logged_nowhere() {
    let engine = engine();
    engine.routing.set("sy", 17, 9);
    engine.routing.set("otay", 12, 10);
    // "ready" is unscripted and fails with a 503

    let report = engine.scheduler.run_cycle().await;
    assert_eq!(report.succeeded.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].route, id("sy-ready"));
    assert!(report.failed[0].reason.contains("503"));

    assert!(engine.store.latest(&id("sy-ready")).is_none());
    assert!(engine.query.log_bytes(&id("sy-ready")).unwrap().is_empty());
    assert_eq!(
        engine.query.worst_severity(&[id("sy-north"), id("sy-ready")]),
        Some(Severity::Moderate)
    );
}

#[tokio::test]
async fn test_log_keeps_history_beyond_capacity() {
    let engine = engine();
    engine.routing.set("sy", 20, 10);
    let cycles = 8;

    for _ in 0..cycles {
        engine.scheduler.run_cycle().await;
    }

    let route = id("sy-north");
    assert_eq!(engine.store.len(&route), engine.config.store.capacity);
    assert_eq!(engine.query.history(&route).len(), 5);

    let log = String::from_utf8(engine.query.log_bytes(&route).unwrap()).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), cycles + 1);
    assert_eq!(lines[0], HEADER);
    assert!(lines[1..]
        .iter()
        .all(|row| row.ends_with(",\"san-ysidro\",\"sy-north\",20,10,10,\"MODERATE\"")));
}

#[tokio::test]
async fn test_readers_see_ordered_sequences_during_writes() {
    let engine = engine();
    for label in ["sy", "ready", "otay"] {
        engine.routing.set(label, 14, 10);
    }

    let reader_query = engine.query.clone();
    let reader = tokio::spawn(async move {
        for _ in 0..200 {
            for route in ["sy-north", "sy-ready", "otay-north"] {
                let recent = reader_query.recent(&id(route), 5);
                assert!(recent.len() <= 5);
                assert!(recent.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
            }
            let _ = reader_query.snapshot();
            tokio::task::yield_now().await;
        }
    });

    for _ in 0..10 {
        engine.scheduler.run_cycle().await;
    }
    reader.await.unwrap();

    assert_eq!(engine.store.len(&id("otay-north")), 5);
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_until_shutdown() {
    let engine = engine();
    engine.routing.set("sy", 9, 9);
    let mut reports = engine.scheduler.subscribe();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(Arc::clone(&engine.scheduler).run(shutdown_rx));

    let first = reports.recv().await.unwrap();
    assert_eq!(first.succeeded, vec![id("sy-north")]);
    let second = reports.recv().await.unwrap();
    assert!(second.started_at >= first.started_at);

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();

    assert_eq!(engine.store.len(&id("sy-north")), 2);
    assert_eq!(engine.scheduler.cycles_started(), 2);
}
