//! Dependency health checks
//!
//! Probes the database, every download client, a sample of indexers and
//! each library's disk, recording severity, message and latency per
//! component. The report is queryable in-process; the scheduler logs
//! severity changes.

use crate::database::DatabasePool;
use outpost_core::{DiskProbe, HealthCheck, HealthReport, HealthSeverity, Result};
use outpost_downloaders::DownloadClient;
use outpost_import::Library;
use outpost_indexers::IndexerClient;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

/// Free space below threshold x this factor is a warning, below the
/// threshold itself unhealthy.
const DISK_WARNING_FACTOR: u64 = 2;

pub struct HealthService {
    pool: DatabasePool,
    clients: Vec<Arc<dyn DownloadClient>>,
    indexers: Vec<Arc<dyn IndexerClient>>,
    libraries: Vec<Library>,
    disk: Arc<dyn DiskProbe>,
    min_free_bytes: u64,
    report: RwLock<HealthReport>,
}

impl HealthService {
    pub fn new(
        pool: DatabasePool,
        clients: Vec<Arc<dyn DownloadClient>>,
        indexers: Vec<Arc<dyn IndexerClient>>,
        libraries: Vec<Library>,
        disk: Arc<dyn DiskProbe>,
        min_free_bytes: u64,
    ) -> Self {
        Self {
            pool,
            clients,
            indexers,
            libraries,
            disk,
            min_free_bytes,
            report: RwLock::new(HealthReport::default()),
        }
    }

    /// Snapshot of the latest report.
    pub async fn report(&self) -> HealthReport {
        self.report.read().await.clone()
    }

    /// Probe every dependency once.
    #[instrument(skip(self))]
    pub async fn check_all(&self) -> Result<HealthReport> {
        let mut report = HealthReport::default();

        report.record(self.check_database().await);

        for client in &self.clients {
            let name = format!("client:{}", client.definition().name);
            let started = Instant::now();
            let check = match client.test().await {
                Ok(()) => HealthCheck::healthy(&name, started.elapsed().as_millis() as u64),
                Err(e) => HealthCheck::unhealthy(&name, e.to_string()),
            };
            report.record(check);
        }

        // A sample of indexers keeps the pass cheap with many configured.
        for indexer in self.indexers.iter().take(5) {
            let name = format!("indexer:{}", indexer.definition().name);
            let started = Instant::now();
            let check = match indexer.test_connection().await {
                Ok(()) => HealthCheck::healthy(&name, started.elapsed().as_millis() as u64),
                Err(e) => HealthCheck::unhealthy(&name, e.to_string()),
            };
            report.record(check);
        }

        for library in &self.libraries {
            let name = format!("disk:{}", library.root.display());
            let check = match self.disk.free_bytes(&library.root) {
                Ok(free) if free < self.min_free_bytes => HealthCheck::unhealthy(
                    &name,
                    format!("only {} bytes free", free),
                ),
                Ok(free) if free < self.min_free_bytes * DISK_WARNING_FACTOR => {
                    HealthCheck::warning(&name, format!("{} bytes free", free))
                }
                Ok(_) => HealthCheck::healthy(&name, 0),
                Err(e) => HealthCheck::unhealthy(&name, e.to_string()),
            };
            report.record(check);
        }

        if report.overall() != HealthSeverity::Healthy {
            warn!(overall = %report.overall(), "health degraded");
        } else {
            info!("all dependencies healthy");
        }

        *self.report.write().await = report.clone();
        Ok(report)
    }

    async fn check_database(&self) -> HealthCheck {
        let started = Instant::now();
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => HealthCheck::healthy("database", started.elapsed().as_millis() as u64),
            Err(e) => HealthCheck::unhealthy("database", e.to_string()),
        }
    }
}
