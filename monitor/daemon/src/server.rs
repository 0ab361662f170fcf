//! Daemon Server Implementation
//!
//! Owns the polling engine for the lifetime of the process:
//! - Builds the store, upstream client, scheduler and query façade
//! - Runs the scheduler until the shutdown channel fires
//! - Logs a per-cycle summary from the scheduler's report channel
//!
//! ```text
//!                    MonitorServer
//!                         │
//!          ┌──────────────┼──────────────┐
//!          │              │              │
//!      Scheduler     report logger   QueryInterface
//!      (run loop)    (broadcast)     (snapshot)
//!          │
//!     SeriesStore ◀───────────────────────┘
//! ```

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use monitor_core::{
    CycleReport, MonitorConfig, QueryInterface, RouteId, Scheduler, SeriesStore, UpstreamClient,
};

/// The main daemon server
pub struct MonitorServer {
    /// Resolved configuration
    config: MonitorConfig,
    /// Shared reading store
    store: Arc<SeriesStore>,
    /// Poller; absent in export mode
    scheduler: Option<Arc<Scheduler>>,
    /// Read-only façade for summaries and `--once` output
    query: QueryInterface,
}

impl MonitorServer {
    /// Build the full polling engine from a validated configuration
    pub fn new(config: MonitorConfig) -> Result<Self> {
        let source = Arc::new(
            UpstreamClient::from_config(&config.providers)
                .context("Failed to build upstream client")?,
        );
        let mut server = Self::for_export(config)?;
        let scheduler = Scheduler::new(
            source,
            Arc::clone(&server.store),
            server.config.routes(),
            server.config.thresholds,
            server.config.scheduler.clone(),
        );
        server.scheduler = Some(Arc::new(scheduler));
        Ok(server)
    }

    /// Build only the store and query layer; no credentials are needed
    pub fn for_export(config: MonitorConfig) -> Result<Self> {
        let routes = config.routes();
        if routes.is_empty() {
            anyhow::bail!("No routes configured");
        }
        let store = Arc::new(SeriesStore::new(&config.store, &routes));
        let query = QueryInterface::new(Arc::clone(&store), config.crossings.clone());

        info!(
            routes = routes.len(),
            capacity = store.capacity(),
            log_dir = %store.log_dir().display(),
            "Store ready"
        );

        Ok(Self {
            config,
            store,
            scheduler: None,
            query,
        })
    }

    /// Read-only façade
    pub fn query(&self) -> &QueryInterface {
        &self.query
    }

    fn scheduler(&self) -> Result<&Arc<Scheduler>> {
        self.scheduler
            .as_ref()
            .context("Server was built without a scheduler")
    }

    /// Write a route's durable log to `out`
    pub fn export(&self, route: &RouteId, out: &mut impl Write) -> Result<()> {
        let bytes = self
            .query
            .log_bytes(route)
            .with_context(|| format!("Failed to export log for route '{route}'"))?;
        out.write_all(&bytes).context("Failed to write log")?;
        out.flush().context("Failed to flush output")?;
        debug!(route = %route, bytes = bytes.len(), "Log exported");
        Ok(())
    }

    /// Run a single cycle
    pub async fn run_once(&self) -> Result<CycleReport> {
        Ok(self.scheduler()?.run_cycle().await)
    }

    /// Run the scheduler until `shutdown` fires
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let scheduler = Arc::clone(self.scheduler()?);

        info!(
            interval_secs = self.config.scheduler.interval.as_secs(),
            crossings = self.config.crossings.len(),
            "Monitor daemon running"
        );

        let reports = scheduler.subscribe();
        let logger = tokio::spawn(log_reports(reports, self.query.clone()));

        scheduler.run(shutdown).await;

        logger.abort();
        let _ = logger.await;

        info!("Shutting down...");
        Ok(())
    }
}

async fn log_reports(mut reports: broadcast::Receiver<CycleReport>, query: QueryInterface) {
    loop {
        match reports.recv().await {
            Ok(report) => log_summary(&report, &query),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Cycle summaries dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn log_summary(report: &CycleReport, query: &QueryInterface) {
    let snapshot = query.snapshot();
    for crossing in &snapshot.crossings {
        for route in &crossing.routes {
            if let Some(ref latest) = route.latest {
                info!(
                    route = %route.id,
                    traffic_min = latest.traffic_minutes,
                    delay_min = latest.delay_minutes,
                    severity = %latest.severity,
                    "Route status"
                );
            }
        }
    }
    info!(
        cycle_id = %report.cycle_id,
        ok = report.succeeded.len(),
        failed = report.failed.len(),
        worst = snapshot.worst.map_or("n/a", |s| s.as_str()),
        "Cycle summary"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use monitor_core::{Crossing, CrossingId, GeoPoint, Route};
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> MonitorConfig {
        let mut config = MonitorConfig::default();
        config.store.log_dir = dir.path().to_path_buf();
        config.providers.api_key = Some("test-key".to_string());
        config.providers.weather_enabled = false;
        config.crossings = vec![Crossing {
            id: CrossingId::new("otay"),
            name: "Otay Mesa".to_string(),
            description: String::new(),
            routes: vec![Route::new(
                "otay-north",
                "Otay Mesa northbound",
                GeoPoint::new(32.55, -116.94, "Otay"),
                GeoPoint::new(32.56, -116.93, "POE"),
            )],
        }];
        config
    }

    #[test]
    fn test_export_empty_log() {
        let dir = TempDir::new().unwrap();
        let server = MonitorServer::for_export(config(&dir)).unwrap();

        let mut out = Vec::new();
        server.export(&RouteId::new("otay-north"), &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_export_unknown_route() {
        let dir = TempDir::new().unwrap();
        let server = MonitorServer::for_export(config(&dir)).unwrap();

        let mut out = Vec::new();
        let err = server.export(&RouteId::new("ghost"), &mut out).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_export_requires_routes() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.crossings.clear();
        assert!(MonitorServer::for_export(config).is_err());
    }

    #[tokio::test]
    async fn test_export_server_cannot_poll() {
        let dir = TempDir::new().unwrap();
        let server = MonitorServer::for_export(config(&dir)).unwrap();
        assert!(server.run_once().await.is_err());
        let (_tx, rx) = watch::channel(false);
        assert!(server.run(rx).await.is_err());
    }

    #[test]
    fn test_full_server_builds() {
        let dir = TempDir::new().unwrap();
        let server = MonitorServer::new(config(&dir)).unwrap();
        assert!(server.scheduler.is_some());
        assert_eq!(server.query().crossings().len(), 1);
    }
}
