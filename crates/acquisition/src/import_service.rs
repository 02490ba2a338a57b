//! Import service
//!
//! Subscribes to the tracker's "ready for import" events, runs the import
//! pipeline for each completed download and reports the outcome back into
//! the state machine and the quality status of the wanted item.

use outpost_core::models::ImportHistory;
use outpost_core::repositories::{HistoryRepository, ProfileRepository, WantedRepository};
use outpost_core::{EventBus, OutpostError, Result, SystemEvent};
use outpost_import::{ImportJob, Importer};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::tracker::DownloadTracker;

pub struct ImportService {
    tracker: Arc<DownloadTracker>,
    importer: Arc<Importer>,
    wanted: Arc<dyn WantedRepository>,
    profiles: Arc<dyn ProfileRepository>,
    history: Arc<dyn HistoryRepository>,
    events: Arc<EventBus>,
}

impl ImportService {
    pub fn new(
        tracker: Arc<DownloadTracker>,
        importer: Arc<Importer>,
        wanted: Arc<dyn WantedRepository>,
        profiles: Arc<dyn ProfileRepository>,
        history: Arc<dyn HistoryRepository>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            tracker,
            importer,
            wanted,
            profiles,
            history,
            events,
        }
    }

    /// Import one completed download end to end.
    #[instrument(skip(self))]
    pub async fn import_download(&self, download_id: Uuid) -> Result<()> {
        let download = self.tracker.begin_import(download_id).await?;

        let Some(save_path) = download.save_path.clone() else {
            self.tracker
                .block_import(download_id, "no save path reported by client")
                .await?;
            return Ok(());
        };

        let item = match download.media_id {
            Some(media_id) => self.wanted.get(media_id).await?,
            None => None,
        };
        let parsed = download.parsed.clone().unwrap_or_default();
        let (title, year) = match &item {
            Some(item) => (item.title.clone(), item.year.or(parsed.year)),
            None => (
                if parsed.title.is_empty() {
                    download.title.clone()
                } else {
                    parsed.title.clone()
                },
                parsed.year,
            ),
        };

        let job = ImportJob {
            media_kind: download.media_kind,
            title,
            year,
            parsed,
            save_path: PathBuf::from(&save_path),
        };

        match self.importer.import(&job).await {
            Ok(outcome) => {
                for moved in &outcome.moved {
                    self.history
                        .add(&ImportHistory::success(
                            download_id,
                            moved.source.display().to_string(),
                            moved.dest.display().to_string(),
                            download.media_kind,
                        ))
                        .await?;
                }
                self.tracker
                    .finish_import(download_id, &outcome.main_dest.display().to_string())
                    .await?;

                if let Some(item) = item {
                    self.update_quality_status(&item.id, item.quality_profile_id, &download)
                        .await?;
                }
                Ok(())
            }
            Err(
                e @ (OutpostError::ImportNoVideo { .. }
                | OutpostError::ImportPathCollision { .. }
                | OutpostError::NotConfigured { .. }
                | OutpostError::FilesystemIO { .. }
                | OutpostError::ValidationError { .. }),
            ) => {
                // Policy failures block the import; they are not retried
                // automatically.
                let reason = import_block_reason(&e);
                warn!(reason = %reason, "import blocked");
                self.history
                    .add(&ImportHistory::failure(
                        download_id,
                        save_path,
                        download.media_kind,
                        e.to_string(),
                    ))
                    .await?;
                self.tracker.block_import(download_id, &reason).await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn update_quality_status(
        &self,
        media_id: &Uuid,
        profile_id: Uuid,
        download: &outpost_core::models::TrackedDownload,
    ) -> Result<()> {
        let cutoff = self
            .profiles
            .get_profile(profile_id)
            .await?
            .map(|p| p.cutoff_score);
        let score = download.format_score;
        let cutoff_met = cutoff.map(|c| score >= c).unwrap_or(false);
        self.wanted
            .set_quality_status(*media_id, score, cutoff_met)
            .await?;
        info!(score, cutoff_met, "quality status updated");
        Ok(())
    }

    /// Subscriber loop: one import at a time per event, imports for
    /// different downloads may run concurrently via separate tasks.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut receiver = self.events.subscribe();
        loop {
            tokio::select! {
                event = receiver.recv() => {
                    match event {
                        Ok(SystemEvent::DownloadReadyForImport { download_id }) => {
                            let service = self.clone();
                            tokio::spawn(async move {
                                if let Err(e) = service.import_download(download_id).await {
                                    warn!(%download_id, error = %e, "import failed");
                                }
                            });
                        }
                        Ok(_) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "import service lagged behind the event bus");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("import service subscriber stopped");
    }
}

fn import_block_reason(error: &OutpostError) -> String {
    match error {
        OutpostError::ImportNoVideo { .. } => "no video".to_string(),
        OutpostError::NotConfigured { what, .. } if what == "library" => "no library".to_string(),
        OutpostError::ImportPathCollision { path } => format!("destination exists: {}", path),
        other => other.to_string(),
    }
}
