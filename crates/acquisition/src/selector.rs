//! Release selector
//!
//! Turns a wanted item into a grab: builds the search, fans it out through
//! the indexer gateway, parses and scores every candidate, filters the
//! blocklist and keyword rules, honours the release delay and submits the
//! winner to a download client.

use chrono::{Duration as ChronoDuration, Utc};
use outpost_core::models::{
    MediaKind, PendingGrab, QualityProfile, ReleaseOrigin, ScoredRelease, TrackedDownload,
    WantedItem,
};
use outpost_core::repositories::{
    BlocklistRepository, DownloadRepository, PendingGrabRepository, ProfileRepository,
    SettingsRepository, WantedRepository,
};
use outpost_core::{BlocklistService, EventBus, OutpostError, Result, StoragePause, SystemEvent};
use outpost_decision::{compare_candidates, parse_release, DecisionEngine};
use outpost_downloaders::ClientRouter;
use outpost_indexers::{IndexerGateway, IndexerRelease, SearchParams};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Selector policy knobs.
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// Hold a grab back until publish time + this delay. Zero disables.
    pub release_delay: Duration,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            release_delay: Duration::ZERO,
        }
    }
}

/// What a selection pass concluded.
#[derive(Debug, Clone)]
pub enum SelectionOutcome {
    /// The best candidate was submitted to a client.
    Grabbed { download_id: Uuid },
    /// The best candidate is younger than the release delay and was queued.
    Delayed { not_before: chrono::DateTime<Utc> },
    /// Nothing acceptable came back.
    NoCandidates,
    /// The storage guard has paused new grabs.
    DeferredStorage,
    /// The candidate would not upgrade the existing import.
    NoUpgrade,
}

pub struct ReleaseSelector {
    gateway: Arc<IndexerGateway>,
    router: Arc<ClientRouter>,
    engine: Arc<DecisionEngine>,
    wanted: Arc<dyn WantedRepository>,
    profiles: Arc<dyn ProfileRepository>,
    downloads: Arc<dyn DownloadRepository>,
    pending: Arc<dyn PendingGrabRepository>,
    settings: Arc<dyn SettingsRepository>,
    blocklist: Arc<BlocklistService<dyn BlocklistRepository>>,
    pause: Arc<StoragePause>,
    events: Arc<EventBus>,
    config: SelectorConfig,
}

impl ReleaseSelector {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gateway: Arc<IndexerGateway>,
        router: Arc<ClientRouter>,
        engine: Arc<DecisionEngine>,
        wanted: Arc<dyn WantedRepository>,
        profiles: Arc<dyn ProfileRepository>,
        downloads: Arc<dyn DownloadRepository>,
        pending: Arc<dyn PendingGrabRepository>,
        settings: Arc<dyn SettingsRepository>,
        blocklist: Arc<BlocklistService<dyn BlocklistRepository>>,
        pause: Arc<StoragePause>,
        events: Arc<EventBus>,
        config: SelectorConfig,
    ) -> Self {
        Self {
            gateway,
            router,
            engine,
            wanted,
            profiles,
            downloads,
            pending,
            settings,
            blocklist,
            pause,
            events,
            config,
        }
    }

    /// Search the indexers for a wanted item and grab the best candidate.
    #[instrument(skip(self, item), fields(title = %item.title))]
    pub async fn search_for(&self, item: &WantedItem) -> Result<SelectionOutcome> {
        if self.pause.is_paused() {
            debug!("storage pause active, deferring search");
            return Ok(SelectionOutcome::DeferredStorage);
        }

        let profile = self
            .profiles
            .get_profile(item.quality_profile_id)
            .await?
            .ok_or(OutpostError::NotConfigured {
                what: "quality_profile".to_string(),
                message: format!("profile {} not found", item.quality_profile_id),
            })?;

        let params = match item.kind {
            MediaKind::Movie => SearchParams::movie(&item.title, Some(item.external_id), None),
            MediaKind::Show => SearchParams::episode(&item.title, None, None, None),
        };

        let outcome = self.gateway.search(item.kind, &params).await;
        if outcome.is_total_failure() {
            return Err(OutpostError::TransientNetwork {
                service: "indexers".to_string(),
                error: format!("all {} indexer queries failed", outcome.failures.len()),
            });
        }

        let candidates = self.score_candidates(&outcome.releases, &profile).await;
        self.wanted.set_last_searched(item.id, Utc::now()).await?;

        let Some(best) = candidates.into_iter().next() else {
            debug!("no acceptable candidates");
            return Ok(SelectionOutcome::NoCandidates);
        };

        // Upgrade gate against the existing import, if there is one.
        if let Some(existing) = item.current_score {
            if !self.engine.is_upgrade(&profile, existing, best.total_score) {
                debug!(
                    existing,
                    candidate = best.total_score,
                    "candidate does not upgrade the existing import"
                );
                return Ok(SelectionOutcome::NoUpgrade);
            }
        }

        self.grab_or_delay(item, best).await
    }

    /// Parse, score, filter and order the raw releases, best first.
    async fn score_candidates(
        &self,
        releases: &[IndexerRelease],
        profile: &QualityProfile,
    ) -> Vec<ScoredRelease> {
        let format_settings = match self.settings.format_settings().await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to load format settings, using defaults");
                Default::default()
            }
        };

        let mut candidates = Vec::new();
        for release in releases {
            if let Some(keyword) = format_settings.rejects(&release.title) {
                debug!(title = %release.title, keyword, "rejected by keyword list");
                continue;
            }

            let parsed = parse_release(&release.title);
            match self
                .blocklist
                .is_blocked(&release.title, parsed.release_group.as_deref())
                .await
            {
                Ok(true) => {
                    debug!(title = %release.title, "release is blocklisted");
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(error = %e, "blocklist lookup failed, skipping candidate");
                    continue;
                }
            }

            let evaluation = self.engine.evaluate(&release.title, &parsed, profile);
            if let Some(reason) = &evaluation.rejection {
                debug!(title = %release.title, reason, "release rejected");
                continue;
            }

            let scored = ScoredRelease {
                release_title: release.title.clone(),
                parsed,
                quality: evaluation.quality.name().to_string(),
                base_score: evaluation.base_score,
                matched_formats: evaluation.matched_formats,
                total_score: evaluation.total_score,
                rejected: false,
                rejection_reason: None,
                origin: ReleaseOrigin {
                    indexer_id: release.indexer_id,
                    protocol: release.protocol,
                    download_url: release.download_url.clone(),
                    magnet_url: release.magnet_url.clone(),
                    info_hash: release.info_hash.clone(),
                    guid: release.guid.clone(),
                },
                size_bytes: release.size_bytes,
                seeders: release.seeders,
                published_at: release.published_at,
            };
            debug_assert!(scored.score_is_consistent());
            candidates.push(scored);
        }

        candidates.sort_by(|a, b| {
            compare_candidates(
                a.total_score,
                a.origin.protocol,
                a.seeders,
                a.published_at,
                b.total_score,
                b.origin.protocol,
                b.seeders,
                b.published_at,
            )
        });
        candidates
    }

    /// Either submit now or park the release until its delay elapses.
    async fn grab_or_delay(
        &self,
        item: &WantedItem,
        best: ScoredRelease,
    ) -> Result<SelectionOutcome> {
        if !self.config.release_delay.is_zero() {
            if let Some(published) = best.published_at {
                let delay = ChronoDuration::from_std(self.config.release_delay)
                    .unwrap_or_else(|_| ChronoDuration::zero());
                let not_before = published + delay;
                if not_before > Utc::now() {
                    info!(
                        title = %best.release_title,
                        %not_before,
                        "holding release until its delay elapses"
                    );
                    let grab = PendingGrab::new(
                        item.id,
                        item.kind,
                        serde_json::to_value(&best).map_err(|e| {
                            OutpostError::ValidationError {
                                field: "pending_grab".to_string(),
                                message: e.to_string(),
                            }
                        })?,
                        not_before,
                    );
                    self.pending.add(&grab).await?;
                    return Ok(SelectionOutcome::Delayed { not_before });
                }
            }
        }

        let download_id = self.grab(item, &best).await?;
        Ok(SelectionOutcome::Grabbed { download_id })
    }

    /// Submit a scored release and create its tracked download.
    pub async fn grab(&self, item: &WantedItem, release: &ScoredRelease) -> Result<Uuid> {
        if self.pause.is_paused() {
            return Err(OutpostError::StorageFull {
                library: "all".to_string(),
                free_bytes: 0,
            });
        }

        let link = release
            .origin
            .magnet_url
            .as_deref()
            .unwrap_or(&release.origin.download_url);
        let submission = self
            .router
            .submit(release.origin.protocol, link, None)
            .await?;

        let external_id = submission
            .external_id
            .clone()
            .or_else(|| release.origin.info_hash.clone())
            .unwrap_or_else(|| release.origin.guid.clone());

        // Submitting the same (client, externalId) twice yields exactly one
        // tracked download.
        let key = outpost_core::models::download_key(submission.client_id, &external_id);
        if let Some(existing) = self.downloads.find_by_key(&key).await? {
            if !existing.state.is_terminal() {
                debug!(key = %key, "download already tracked, not duplicating");
                return Ok(existing.id);
            }
        }

        let mut download = TrackedDownload::new(
            submission.client_id,
            external_id,
            item.kind,
            &release.release_title,
        );
        download.media_id = Some(item.id);
        download.parsed = Some(release.parsed.clone());
        download.quality = Some(release.quality.clone());
        download.format_score = release.total_score;
        download.size_bytes = release.size_bytes;
        download.seeders = release.seeders;
        download.grabbed_at = Some(Utc::now());

        self.downloads.upsert(&download).await?;
        self.wanted.set_last_searched(item.id, Utc::now()).await?;

        info!(
            title = %release.release_title,
            score = release.total_score,
            client = %submission.client_name,
            "release grabbed"
        );
        self.events.publish(SystemEvent::GrabSubmitted {
            download_id: download.id,
            media_id: Some(item.id),
            title: release.release_title.clone(),
        });

        Ok(download.id)
    }

    /// Submit pending grabs whose not-before time has passed.
    #[instrument(skip(self))]
    pub async fn process_due_grabs(&self) -> Result<usize> {
        let due = self.pending.list_due(Utc::now()).await?;
        let mut grabbed = 0;

        for pending in due {
            let release: ScoredRelease = match serde_json::from_value(pending.release.clone()) {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "dropping undecodable pending grab");
                    self.pending.remove(pending.id).await?;
                    continue;
                }
            };

            // Re-check the blocklist: the group may have been blocked while
            // the grab waited.
            if self
                .blocklist
                .is_blocked(
                    &release.release_title,
                    release.parsed.release_group.as_deref(),
                )
                .await?
            {
                info!(title = %release.release_title, "pending grab got blocklisted, dropping");
                self.pending.remove(pending.id).await?;
                continue;
            }

            let Some(item) = self.wanted.get(pending.media_id).await? else {
                self.pending.remove(pending.id).await?;
                continue;
            };

            match self.grab(&item, &release).await {
                Ok(_) => {
                    self.pending.remove(pending.id).await?;
                    grabbed += 1;
                }
                Err(OutpostError::StorageFull { .. }) => {
                    // Leave it queued; the pause will clear.
                }
                Err(e) => {
                    warn!(title = %release.release_title, error = %e, "pending grab failed");
                    self.pending.remove(pending.id).await?;
                }
            }
        }
        Ok(grabbed)
    }

    /// Feed one RSS item through matching and scoring; grab when it serves
    /// a wanted item.
    pub async fn consider_rss_release(&self, release: &IndexerRelease) -> Result<bool> {
        let parsed = parse_release(&release.title);
        if parsed.title.is_empty() {
            return Ok(false);
        }

        let kind = if parsed.is_episode() {
            MediaKind::Show
        } else {
            MediaKind::Movie
        };
        let Some(item) = self
            .wanted
            .find_matching(kind, &parsed.title, parsed.year)
            .await?
        else {
            return Ok(false);
        };
        if !item.needs_search() {
            return Ok(false);
        }

        let profile = self
            .profiles
            .get_profile(item.quality_profile_id)
            .await?
            .ok_or(OutpostError::NotConfigured {
                what: "quality_profile".to_string(),
                message: format!("profile {} not found", item.quality_profile_id),
            })?;

        let candidates = self
            .score_candidates(std::slice::from_ref(release), &profile)
            .await;
        let Some(best) = candidates.into_iter().next() else {
            return Ok(false);
        };

        if let Some(existing) = item.current_score {
            if !self.engine.is_upgrade(&profile, existing, best.total_score) {
                return Ok(false);
            }
        }

        let outcome = self.grab_or_delay(&item, best).await?;
        Ok(matches!(
            outcome,
            SelectionOutcome::Grabbed { .. } | SelectionOutcome::Delayed { .. }
        ))
    }
}
