//! Scheduler
//!
//! Ticker-driven background loops sharing one cooperative stop signal:
//! tracker reconciliation, monitored searches, the RSS sweep and the
//! storage guard. Every loop body is caught and logged; no error can
//! terminate a loop.

use outpost_core::repositories::WantedRepository;
use outpost_core::{DiskProbe, EventBus, Result, StoragePause, SystemEvent};
use outpost_import::Library;
use outpost_indexers::IndexerGateway;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::selector::ReleaseSelector;
use crate::tracker::DownloadTracker;

/// Loop intervals and thresholds.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tracker_interval: Duration,
    pub search_interval: Duration,
    pub rss_interval: Duration,
    pub storage_interval: Duration,
    /// Pause new grabs when any library has less free space than this.
    pub min_free_bytes: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tracker_interval: Duration::from_secs(30),
            search_interval: Duration::from_secs(60 * 60),
            rss_interval: Duration::from_secs(15 * 60),
            storage_interval: Duration::from_secs(5 * 60),
            min_free_bytes: 5 * 1024 * 1024 * 1024,
        }
    }
}

pub struct Scheduler {
    tracker: Arc<DownloadTracker>,
    selector: Arc<ReleaseSelector>,
    gateway: Arc<IndexerGateway>,
    wanted: Arc<dyn WantedRepository>,
    libraries: Vec<Library>,
    disk: Arc<dyn DiskProbe>,
    pause: Arc<StoragePause>,
    events: Arc<EventBus>,
    config: SchedulerConfig,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tracker: Arc<DownloadTracker>,
        selector: Arc<ReleaseSelector>,
        gateway: Arc<IndexerGateway>,
        wanted: Arc<dyn WantedRepository>,
        libraries: Vec<Library>,
        disk: Arc<dyn DiskProbe>,
        pause: Arc<StoragePause>,
        events: Arc<EventBus>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            tracker,
            selector,
            gateway,
            wanted,
            libraries,
            disk,
            pause,
            events,
            config,
        }
    }

    /// Spawn every loop. Handles resolve when the stop signal fires.
    pub fn start(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        info!(
            tracker = ?self.config.tracker_interval,
            search = ?self.config.search_interval,
            rss = ?self.config.rss_interval,
            storage = ?self.config.storage_interval,
            "scheduler starting"
        );

        vec![
            self.clone().spawn_loop(
                "tracker_poll",
                self.config.tracker_interval,
                shutdown.clone(),
                Self::tracker_tick_boxed,
            ),
            self.clone().spawn_loop(
                "monitored_search",
                self.config.search_interval,
                shutdown.clone(),
                Self::search_tick_boxed,
            ),
            self.clone().spawn_loop(
                "rss_sweep",
                self.config.rss_interval,
                shutdown.clone(),
                Self::rss_tick_boxed,
            ),
            self.clone().spawn_loop(
                "storage_guard",
                self.config.storage_interval,
                shutdown,
                Self::storage_tick_boxed,
            ),
        ]
    }

    fn tracker_tick_boxed(
        s: Arc<Self>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send>> {
        Box::pin(Self::tracker_tick_owned(s))
    }

    fn search_tick_boxed(
        s: Arc<Self>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send>> {
        Box::pin(Self::search_tick_owned(s))
    }

    fn rss_tick_boxed(
        s: Arc<Self>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send>> {
        Box::pin(Self::rss_tick_owned(s))
    }

    fn storage_tick_boxed(
        s: Arc<Self>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send>> {
        Box::pin(async move { s.storage_tick().await })
    }

    fn spawn_loop(
        self: Arc<Self>,
        name: &'static str,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
        body: fn(Arc<Self>) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send>>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // A failing tick never kills the loop.
                        if let Err(e) = body(self.clone()).await {
                            error!(loop_name = name, error = %e, "scheduler tick failed");
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            debug!(loop_name = name, "scheduler loop stopping");
                            break;
                        }
                    }
                }
            }
        })
    }

    async fn tracker_tick_owned(self: Arc<Self>) -> Result<()> {
        self.tracker_tick().await
    }

    async fn search_tick_owned(self: Arc<Self>) -> Result<()> {
        self.search_tick().await
    }

    async fn rss_tick_owned(self: Arc<Self>) -> Result<()> {
        self.rss_tick().await
    }

    /// Tracker poll: reconcile, release due pending grabs, sweep seeders.
    #[instrument(skip(self))]
    async fn tracker_tick(&self) -> Result<()> {
        self.tracker.reconcile().await?;
        let released = self.selector.process_due_grabs().await?;
        if released > 0 {
            debug!(released, "pending grabs released");
        }
        self.tracker.removal_sweep().await?;
        Ok(())
    }

    /// Monitored search: one pass over every item with an unmet target.
    #[instrument(skip(self))]
    async fn search_tick(&self) -> Result<()> {
        let items = self.wanted.list_needing_search().await?;
        debug!(items = items.len(), "monitored search pass");

        for item in items {
            if self.pause.is_paused() {
                debug!("storage pause active, ending search pass early");
                break;
            }
            if let Err(e) = self.selector.search_for(&item).await {
                warn!(title = %item.title, error = %e, "monitored search failed");
            }
        }
        Ok(())
    }

    /// RSS sweep: fetch the latest from every indexer and match against
    /// wanted items.
    #[instrument(skip(self))]
    async fn rss_tick(&self) -> Result<()> {
        let outcome = self.gateway.fetch_latest().await;
        debug!(
            releases = outcome.releases.len(),
            failures = outcome.failures.len(),
            "rss sweep fetched"
        );

        let mut grabbed = 0;
        for release in &outcome.releases {
            match self.selector.consider_rss_release(release).await {
                Ok(true) => grabbed += 1,
                Ok(false) => {}
                Err(e) => debug!(title = %release.title, error = %e, "rss candidate skipped"),
            }
        }
        if grabbed > 0 {
            info!(grabbed, "rss sweep grabbed releases");
        }
        Ok(())
    }

    /// Storage guard: flip the pause flag when any library runs low.
    #[instrument(skip(self))]
    async fn storage_tick(&self) -> Result<()> {
        let mut low: Option<(String, u64)> = None;
        for library in &self.libraries {
            match self.disk.free_bytes(&library.root) {
                Ok(free) if free < self.config.min_free_bytes => {
                    low = Some((library.name.clone(), free));
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(library = %library.name, error = %e, "disk probe failed");
                }
            }
        }

        match low {
            Some((library, free)) => {
                if self.pause.pause() {
                    warn!(library, free, "library low on space, pausing new grabs");
                    self.events
                        .publish(SystemEvent::StoragePauseChanged { paused: true });
                }
            }
            None => {
                if self.pause.resume() {
                    info!("storage recovered, resuming grabs");
                    self.events
                        .publish(SystemEvent::StoragePauseChanged { paused: false });
                }
            }
        }
        Ok(())
    }
}
