//! Download tracker
//!
//! Reconciles the clients' view of the world with the local tracked
//! download records each scheduler tick: metrics are refreshed, client
//! statuses drive the state machine (never backward past the import
//! hand-off), out-of-band additions are adopted, vanished downloads are
//! failed, stalls are detected and seeding retention is evaluated.

use chrono::{Duration as ChronoDuration, Utc};
use futures::stream::{self, StreamExt};
use outpost_core::models::{
    DownloadState, MediaKind, ReleaseProtocol, TrackedDownload,
};
use outpost_core::repositories::{BlocklistRepository, DownloadRepository};
use outpost_core::{BlocklistService, EventBus, OutpostError, Result, SystemEvent};
use outpost_decision::parse_release;
use outpost_downloaders::{ClientRouter, DownloadClient, DownloadItem, DownloadItemStatus};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Tracker policy knobs.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// A download with no progress for longer than this is stalled.
    pub stalled_threshold: Duration,
    /// Bounded pool for per-client `list` calls.
    pub list_concurrency: usize,
    /// Seeding retention: removable once seeding this long, regardless of
    /// ratio.
    pub max_seed_time: Duration,
    /// Seeding retention: removable once the ratio is met and seeding at
    /// least this long.
    pub min_seed_time: Duration,
    pub min_seed_ratio: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            stalled_threshold: Duration::from_secs(6 * 3600),
            list_concurrency: 4,
            max_seed_time: Duration::from_secs(14 * 24 * 3600),
            min_seed_time: Duration::from_secs(3600),
            min_seed_ratio: 1.0,
        }
    }
}

/// Counters from one reconciliation pass, for logging and tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub updated: usize,
    pub adopted: usize,
    pub disappeared: usize,
    pub stalled: usize,
    pub ready_for_import: usize,
    pub removable: usize,
}

fn list_client(
    client: Arc<dyn DownloadClient>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = (i32, String, Result<Vec<DownloadItem>>)> + Send>>
{
    Box::pin(async move {
        let def = client.definition();
        (def.id, def.name.clone(), client.list().await)
    })
}

pub struct DownloadTracker {
    downloads: Arc<dyn DownloadRepository>,
    blocklist: Arc<BlocklistService<dyn BlocklistRepository>>,
    router: Arc<ClientRouter>,
    events: Arc<EventBus>,
    config: TrackerConfig,
    /// Per-download locks serialising state transitions.
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl DownloadTracker {
    pub fn new(
        downloads: Arc<dyn DownloadRepository>,
        blocklist: Arc<BlocklistService<dyn BlocklistRepository>>,
        router: Arc<ClientRouter>,
        events: Arc<EventBus>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            downloads,
            blocklist,
            router,
            events,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// One reconciliation pass over every client.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> Result<ReconcileSummary> {
        let mut summary = ReconcileSummary::default();

        // Fan out ListDownloads per client with a small bounded pool. A
        // client that fails to answer is skipped entirely so its downloads
        // are not mistaken for disappeared ones.
        let clients = self.router.clients().to_vec();
        let listings = stream::iter(clients)
            .map(list_client)
            .buffer_unordered(self.config.list_concurrency)
            .collect::<Vec<_>>()
            .await;

        let mut items: HashMap<String, DownloadItem> = HashMap::new();
        let mut responsive_clients: HashSet<i32> = HashSet::new();
        for (client_id, name, listing) in listings {
            match listing {
                Ok(list) => {
                    responsive_clients.insert(client_id);
                    for item in list {
                        items.insert(
                            outpost_core::models::download_key(client_id, &item.external_id),
                            item,
                        );
                    }
                }
                Err(e) => {
                    warn!(client = %name, error = %e, "client listing failed, skipping");
                }
            }
        }

        let tracked = self.downloads.list_active().await?;
        let mut tracked_keys: HashSet<String> = HashSet::new();

        for mut download in tracked {
            tracked_keys.insert(download.key());
            let guard = self.lock_for(download.id).await;
            let _held = guard.lock().await;

            // One broken record must not sink the whole pass.
            let result = match items.get(&download.key()) {
                Some(item) => self.sync_with_item(&mut download, item, &mut summary).await,
                None if responsive_clients.contains(&download.client_id)
                    && DownloadState::can_transition(download.state, DownloadState::Failed) =>
                {
                    summary.disappeared += 1;
                    self.fail_download(&mut download, "disappeared from client")
                        .await
                }
                None => {
                    // Client did not answer this tick, or the download sits
                    // in a state (e.g. ImportBlocked) the client listing no
                    // longer speaks for.
                    Ok(())
                }
            };
            if let Err(e) = result {
                warn!(download = %download.title, error = %e, "reconciliation of download failed");
            }
        }

        // Client entries with no tracked record: out-of-band additions.
        for (key, item) in &items {
            if !tracked_keys.contains(key) {
                match self.adopt(item).await {
                    Ok(()) => summary.adopted += 1,
                    Err(e) => warn!(name = %item.name, error = %e, "adoption failed"),
                }
            }
        }

        info!(
            updated = summary.updated,
            adopted = summary.adopted,
            disappeared = summary.disappeared,
            stalled = summary.stalled,
            ready_for_import = summary.ready_for_import,
            "reconciliation pass complete"
        );
        Ok(summary)
    }

    /// Merge one client item into its tracked record.
    async fn sync_with_item(
        &self,
        download: &mut TrackedDownload,
        item: &DownloadItem,
        summary: &mut ReconcileSummary,
    ) -> Result<()> {
        let prior_progress = download.progress;
        download.update_metrics(
            Some(item.size_bytes),
            Some(item.downloaded_bytes),
            item.progress,
            Some(item.speed_bps),
            item.eta_secs,
            None,
        );
        download.ratio = item.ratio;
        download.seeding_time_secs = item.seeding_time_secs;
        if download.save_path.is_none() {
            download.save_path = item.save_path.clone();
        }

        // Client status drives the state machine, but never backward once
        // the importer owns the download.
        if !download.state.is_import_phase() {
            let target = match item.status {
                DownloadItemStatus::Queued => DownloadState::Queued,
                DownloadItemStatus::Downloading => DownloadState::Downloading,
                DownloadItemStatus::Paused => DownloadState::Paused,
                DownloadItemStatus::Completed => DownloadState::Completed,
                DownloadItemStatus::Error => DownloadState::Failed,
            };

            if target == DownloadState::Failed {
                let reason = item
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "client reported an error".to_string());
                self.fail_download(download, &reason).await?;
                return Ok(());
            }

            // A stalled download only returns to Downloading when progress
            // actually resumes, not merely because the client still calls
            // it downloading.
            let still_stuck = download.state == DownloadState::Stalled
                && target == DownloadState::Downloading
                && item.progress <= prior_progress;
            if !still_stuck {
                self.walk_to(download, target).await?;
            }

            if download.state == DownloadState::Completed {
                let event = download.transition(DownloadState::ImportPending, "awaiting import")?;
                self.downloads.record_event(&event).await?;
                self.publish_transition(&event);
                self.events.publish(SystemEvent::DownloadReadyForImport {
                    download_id: download.id,
                });
                summary.ready_for_import += 1;
            }

            // Stall detection: downloading with no progress past the
            // threshold.
            if download.state == DownloadState::Downloading
                && download.progress < 1.0
                && Utc::now() - download.state_changed_at
                    > ChronoDuration::from_std(self.config.stalled_threshold)
                        .unwrap_or_else(|_| ChronoDuration::hours(6))
            {
                let event = download.transition(DownloadState::Stalled, "no progress")?;
                download.add_warning(format!(
                    "no progress for more than {} hours",
                    self.config.stalled_threshold.as_secs() / 3600
                ));
                self.downloads.record_event(&event).await?;
                self.publish_transition(&event);
                summary.stalled += 1;
            }
        }

        // Seeding retention applies to finished torrents only.
        if self.is_torrent(download) && !download.can_remove {
            if let Some(seed_time) = download.seeding_time_secs {
                let ratio_met = download.ratio.unwrap_or(0.0) >= self.config.min_seed_ratio
                    && seed_time as u64 >= self.config.min_seed_time.as_secs();
                let time_met = seed_time as u64 >= self.config.max_seed_time.as_secs();
                if ratio_met || time_met {
                    download.can_remove = true;
                    self.events.publish(SystemEvent::DownloadReadyForRemoval {
                        download_id: download.id,
                        client_id: download.client_id,
                        external_id: download.external_id.clone(),
                    });
                    summary.removable += 1;
                }
            }
        }

        self.downloads.upsert(download).await?;
        summary.updated += 1;
        Ok(())
    }

    fn is_torrent(&self, download: &TrackedDownload) -> bool {
        self.router
            .client_by_id(download.client_id)
            .map(|c| c.definition().protocol() == ReleaseProtocol::Torrent)
            .unwrap_or(false)
    }

    /// Walk the download to the target state through legal intermediate
    /// hops (e.g. `Paused -> Downloading -> Completed`). An unreachable
    /// target leaves the state alone.
    async fn walk_to(&self, download: &mut TrackedDownload, target: DownloadState) -> Result<()> {
        if download.state == target {
            return Ok(());
        }

        let path: Vec<DownloadState> = if DownloadState::can_transition(download.state, target) {
            vec![target]
        } else if DownloadState::can_transition(download.state, DownloadState::Downloading)
            && DownloadState::can_transition(DownloadState::Downloading, target)
        {
            vec![DownloadState::Downloading, target]
        } else {
            debug!(
                download = %download.id,
                from = %download.state,
                to = %target,
                "no legal transition path, keeping state"
            );
            return Ok(());
        };

        for step in path {
            let event = download.transition(step, "client status")?;
            self.downloads.record_event(&event).await?;
            self.publish_transition(&event);
        }
        Ok(())
    }

    /// Create a tracked record for a download found at a client with no
    /// local counterpart.
    async fn adopt(&self, item: &DownloadItem) -> Result<()> {
        let parsed = parse_release(&item.name);
        let kind = if parsed.is_episode() {
            MediaKind::Show
        } else {
            MediaKind::Movie
        };

        let mut download = TrackedDownload::new(item.client_id, &item.external_id, kind, &item.name);
        download.parsed = Some(parsed);
        download.save_path = item.save_path.clone();
        download.update_metrics(
            Some(item.size_bytes),
            Some(item.downloaded_bytes),
            item.progress,
            Some(item.speed_bps),
            item.eta_secs,
            None,
        );

        // Persist before any transition so events have a row to attach to.
        self.downloads.upsert(&download).await?;

        // Bring the fresh record up to the client's reported status.
        match item.status {
            DownloadItemStatus::Queued => {}
            DownloadItemStatus::Downloading => {
                self.walk_to(&mut download, DownloadState::Downloading).await?;
            }
            DownloadItemStatus::Paused => {
                self.walk_to(&mut download, DownloadState::Paused).await?;
            }
            DownloadItemStatus::Completed => {
                self.walk_to(&mut download, DownloadState::Completed).await?;
                let event = download.transition(DownloadState::ImportPending, "awaiting import")?;
                self.downloads.record_event(&event).await?;
                self.publish_transition(&event);
                self.events.publish(SystemEvent::DownloadReadyForImport {
                    download_id: download.id,
                });
            }
            DownloadItemStatus::Error => {
                self.walk_to(&mut download, DownloadState::Downloading).await?;
                let event = download.transition(DownloadState::Failed, "client reported an error")?;
                self.downloads.record_event(&event).await?;
                self.publish_transition(&event);
            }
        }

        info!(name = %item.name, key = %download.key(), "adopted out-of-band download");
        self.downloads.upsert(&download).await
    }

    /// Failure path: transition, blocklist the release, bump the group
    /// counter and announce the failure.
    async fn fail_download(&self, download: &mut TrackedDownload, reason: &str) -> Result<()> {
        let event = download.transition(DownloadState::Failed, reason)?;
        download.add_error(reason);
        self.downloads.record_event(&event).await?;
        self.downloads.upsert(download).await?;
        self.publish_transition(&event);

        let group = download
            .parsed
            .as_ref()
            .and_then(|p| p.release_group.clone());
        self.blocklist
            .record_failure(
                &download.title,
                group.as_deref(),
                download.media_id.map(|id| (id, download.media_kind)),
                reason,
                None,
            )
            .await?;

        self.events.publish(SystemEvent::DownloadFailed {
            download_id: download.id,
            media_id: download.media_id,
            title: download.title.clone(),
            reason: reason.to_string(),
        });
        Ok(())
    }

    fn publish_transition(&self, event: &outpost_core::models::DownloadEvent) {
        self.events.publish(SystemEvent::DownloadStateChanged {
            download_id: event.download_id,
            from: event.from_state,
            to: event.to_state,
        });
    }

    /// Mark a download as being imported. Called by the import service.
    pub async fn begin_import(&self, download_id: Uuid) -> Result<TrackedDownload> {
        let guard = self.lock_for(download_id).await;
        let _held = guard.lock().await;

        let mut download = self
            .downloads
            .get(download_id)
            .await?
            .ok_or(OutpostError::NotFound {
                resource: format!("download {}", download_id),
            })?;
        let event = download.transition(DownloadState::Importing, "importer started")?;
        self.downloads.record_event(&event).await?;
        self.downloads.upsert(&download).await?;
        self.publish_transition(&event);
        Ok(download)
    }

    /// Record a finished import.
    pub async fn finish_import(&self, download_id: Uuid, import_path: &str) -> Result<()> {
        let guard = self.lock_for(download_id).await;
        let _held = guard.lock().await;

        let mut download = self
            .downloads
            .get(download_id)
            .await?
            .ok_or(OutpostError::NotFound {
                resource: format!("download {}", download_id),
            })?;
        download.import_path = Some(import_path.to_string());
        let event = download.transition(DownloadState::Imported, "files in library")?;
        self.downloads.record_event(&event).await?;
        self.downloads.upsert(&download).await?;
        self.publish_transition(&event);

        self.events.publish(SystemEvent::ImportCompleted {
            download_id,
            media_id: download.media_id,
            dest_path: import_path.to_string(),
        });
        Ok(())
    }

    /// Record an import refused by policy.
    pub async fn block_import(&self, download_id: Uuid, reason: &str) -> Result<()> {
        let guard = self.lock_for(download_id).await;
        let _held = guard.lock().await;

        let mut download = self
            .downloads
            .get(download_id)
            .await?
            .ok_or(OutpostError::NotFound {
                resource: format!("download {}", download_id),
            })?;
        download.import_block_reason = Some(reason.to_string());
        let event = download.transition(DownloadState::ImportBlocked, reason)?;
        self.downloads.record_event(&event).await?;
        self.downloads.upsert(&download).await?;
        self.publish_transition(&event);
        Ok(())
    }

    /// Retry a failed download: back to Queued so the next reconciliation
    /// pass picks it up again.
    pub async fn retry(&self, download_id: Uuid) -> Result<()> {
        let guard = self.lock_for(download_id).await;
        let _held = guard.lock().await;

        let mut download = self
            .downloads
            .get(download_id)
            .await?
            .ok_or(OutpostError::NotFound {
                resource: format!("download {}", download_id),
            })?;
        let event = download.transition(DownloadState::Queued, "manual retry")?;
        self.downloads.record_event(&event).await?;
        self.downloads.upsert(&download).await?;
        self.publish_transition(&event);
        Ok(())
    }

    /// Delete client entries whose seeding retention is satisfied.
    #[instrument(skip(self))]
    pub async fn removal_sweep(&self) -> Result<usize> {
        let imported = self
            .downloads
            .list_by_state(DownloadState::Imported)
            .await?;
        let mut removed = 0;

        for mut download in imported.into_iter().filter(|d| d.can_remove) {
            let Some(client) = self.router.client_by_id(download.client_id) else {
                continue;
            };
            match client.remove(&download.external_id, false).await {
                Ok(()) => {
                    download.can_remove = false;
                    self.downloads.upsert(&download).await?;
                    removed += 1;
                    info!(title = %download.title, "removed finished download from client");
                }
                Err(e) => {
                    warn!(title = %download.title, error = %e, "client removal failed");
                }
            }
        }
        Ok(removed)
    }
}
