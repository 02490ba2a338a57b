//! In-memory fakes shared by the acquisition integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use outpost_core::models::{
    BlocklistEntry, CustomFormat, DownloadEvent, DownloadState, FormatSettings, GroupFailure,
    ImportHistory, MediaKind, NamingSettings, PendingGrab, QualityProfile, ReleaseProtocol,
    Request, RequestStatus, TrackedDownload, WantedItem,
};
use outpost_core::repositories::*;
use outpost_core::Result;
use outpost_downloaders::{
    ClientDefinition, ClientKind, DownloadClient, DownloadItem, DownloadItemStatus,
};
use outpost_indexers::{
    IndexerCaps, IndexerClient, IndexerDefinition, IndexerKind, IndexerRelease, SearchParams,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Repositories

#[derive(Default)]
pub struct MemoryWanted {
    pub items: Mutex<HashMap<Uuid, WantedItem>>,
}

#[async_trait]
impl WantedRepository for MemoryWanted {
    async fn get(&self, id: Uuid) -> Result<Option<WantedItem>> {
        Ok(self.items.lock().await.get(&id).cloned())
    }

    async fn find_by_external(
        &self,
        kind: MediaKind,
        external_id: i64,
    ) -> Result<Option<WantedItem>> {
        Ok(self
            .items
            .lock()
            .await
            .values()
            .find(|i| i.kind == kind && i.external_id == external_id)
            .cloned())
    }

    async fn list_needing_search(&self) -> Result<Vec<WantedItem>> {
        Ok(self
            .items
            .lock()
            .await
            .values()
            .filter(|i| i.needs_search())
            .cloned()
            .collect())
    }

    async fn find_matching(
        &self,
        kind: MediaKind,
        title: &str,
        year: Option<i32>,
    ) -> Result<Option<WantedItem>> {
        Ok(self
            .items
            .lock()
            .await
            .values()
            .find(|i| {
                i.kind == kind
                    && i.title.eq_ignore_ascii_case(title)
                    && match (i.year, year) {
                        (Some(a), Some(b)) => a == b,
                        _ => true,
                    }
            })
            .cloned())
    }

    async fn upsert(&self, item: &WantedItem) -> Result<()> {
        self.items.lock().await.insert(item.id, item.clone());
        Ok(())
    }

    async fn set_last_searched(&self, id: Uuid, when: DateTime<Utc>) -> Result<()> {
        if let Some(item) = self.items.lock().await.get_mut(&id) {
            item.last_searched_at = Some(when);
        }
        Ok(())
    }

    async fn set_quality_status(&self, id: Uuid, score: i32, cutoff_met: bool) -> Result<()> {
        if let Some(item) = self.items.lock().await.get_mut(&id) {
            item.current_score = Some(score);
            item.cutoff_met = cutoff_met;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryProfiles {
    pub profiles: Mutex<HashMap<Uuid, QualityProfile>>,
    pub formats: Mutex<Vec<CustomFormat>>,
}

#[async_trait]
impl ProfileRepository for MemoryProfiles {
    async fn get_profile(&self, id: Uuid) -> Result<Option<QualityProfile>> {
        Ok(self.profiles.lock().await.get(&id).cloned())
    }

    async fn upsert_profile(&self, profile: &QualityProfile) -> Result<()> {
        self.profiles
            .lock()
            .await
            .insert(profile.id, profile.clone());
        Ok(())
    }

    async fn list_formats(&self) -> Result<Vec<CustomFormat>> {
        Ok(self.formats.lock().await.clone())
    }

    async fn upsert_format(&self, format: &CustomFormat) -> Result<()> {
        self.formats.lock().await.push(format.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryDownloads {
    pub downloads: Mutex<HashMap<Uuid, TrackedDownload>>,
    pub events: Mutex<Vec<DownloadEvent>>,
}

impl MemoryDownloads {
    pub async fn events_for(&self, download_id: Uuid) -> Vec<DownloadEvent> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|e| e.download_id == download_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DownloadRepository for MemoryDownloads {
    async fn get(&self, id: Uuid) -> Result<Option<TrackedDownload>> {
        Ok(self.downloads.lock().await.get(&id).cloned())
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<TrackedDownload>> {
        Ok(self
            .downloads
            .lock()
            .await
            .values()
            .find(|d| d.key() == key)
            .cloned())
    }

    async fn list_active(&self) -> Result<Vec<TrackedDownload>> {
        Ok(self
            .downloads
            .lock()
            .await
            .values()
            .filter(|d| !d.state.is_terminal())
            .cloned()
            .collect())
    }

    async fn list_by_state(&self, state: DownloadState) -> Result<Vec<TrackedDownload>> {
        Ok(self
            .downloads
            .lock()
            .await
            .values()
            .filter(|d| d.state == state)
            .cloned()
            .collect())
    }

    async fn upsert(&self, download: &TrackedDownload) -> Result<()> {
        self.downloads
            .lock()
            .await
            .insert(download.id, download.clone());
        Ok(())
    }

    async fn record_event(&self, event: &DownloadEvent) -> Result<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }

    async fn list_events(&self, download_id: Uuid) -> Result<Vec<DownloadEvent>> {
        Ok(self.events_for(download_id).await)
    }
}

#[derive(Default)]
pub struct MemoryBlocklist {
    pub entries: Mutex<Vec<BlocklistEntry>>,
    pub counters: Mutex<HashMap<String, i32>>,
}

#[async_trait]
impl BlocklistRepository for MemoryBlocklist {
    async fn add(&self, entry: &BlocklistEntry) -> Result<()> {
        self.entries.lock().await.push(entry.clone());
        Ok(())
    }

    async fn contains_title(&self, release_title: &str) -> Result<bool> {
        Ok(self
            .entries
            .lock()
            .await
            .iter()
            .any(|e| !e.release_title.is_empty() && e.release_title == release_title))
    }

    async fn contains_group(&self, release_group: &str) -> Result<bool> {
        Ok(self.entries.lock().await.iter().any(|e| {
            e.release_title.is_empty()
                && e.release_group
                    .as_deref()
                    .map(|g| g.eq_ignore_ascii_case(release_group))
                    .unwrap_or(false)
        }))
    }

    async fn list(&self) -> Result<Vec<BlocklistEntry>> {
        Ok(self.entries.lock().await.clone())
    }

    async fn bump_group_failures(&self, release_group: &str) -> Result<GroupFailure> {
        let mut counters = self.counters.lock().await;
        let count = counters.entry(release_group.to_string()).or_insert(0);
        *count += 1;
        Ok(GroupFailure {
            release_group: release_group.to_string(),
            failures: *count,
            last_failed_at: Utc::now(),
        })
    }

    async fn group_failures(&self, release_group: &str) -> Result<Option<GroupFailure>> {
        Ok(self
            .counters
            .lock()
            .await
            .get(release_group)
            .map(|&failures| GroupFailure {
                release_group: release_group.to_string(),
                failures,
                last_failed_at: Utc::now(),
            }))
    }
}

#[derive(Default)]
pub struct MemoryPending {
    pub grabs: Mutex<Vec<PendingGrab>>,
}

#[async_trait]
impl PendingGrabRepository for MemoryPending {
    async fn add(&self, grab: &PendingGrab) -> Result<()> {
        self.grabs.lock().await.push(grab.clone());
        Ok(())
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<PendingGrab>> {
        Ok(self
            .grabs
            .lock()
            .await
            .iter()
            .filter(|g| g.is_due(now))
            .cloned()
            .collect())
    }

    async fn find_for_media(&self, media_id: Uuid) -> Result<Option<PendingGrab>> {
        Ok(self
            .grabs
            .lock()
            .await
            .iter()
            .find(|g| g.media_id == media_id)
            .cloned())
    }

    async fn remove(&self, id: Uuid) -> Result<()> {
        self.grabs.lock().await.retain(|g| g.id != id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySettings {
    pub values: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl SettingsRepository for MemorySettings {
    async fn format_settings(&self) -> Result<FormatSettings> {
        Ok(FormatSettings::default())
    }

    async fn set_format_settings(&self, _settings: &FormatSettings) -> Result<()> {
        Ok(())
    }

    async fn naming_settings(&self) -> Result<NamingSettings> {
        Ok(NamingSettings::default())
    }

    async fn set_naming_settings(&self, _settings: &NamingSettings) -> Result<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryRequests {
    pub requests: Mutex<HashMap<Uuid, Request>>,
    pub links: Mutex<Vec<(Uuid, Uuid)>>,
}

#[async_trait]
impl RequestRepository for MemoryRequests {
    async fn get(&self, id: Uuid) -> Result<Option<Request>> {
        Ok(self.requests.lock().await.get(&id).cloned())
    }

    async fn list_by_status(&self, status: RequestStatus) -> Result<Vec<Request>> {
        Ok(self
            .requests
            .lock()
            .await
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect())
    }

    async fn upsert(&self, request: &Request) -> Result<()> {
        self.requests
            .lock()
            .await
            .insert(request.id, request.clone());
        Ok(())
    }

    async fn link_download(&self, request_id: Uuid, download_id: Uuid) -> Result<()> {
        self.links.lock().await.push((request_id, download_id));
        Ok(())
    }

    async fn find_by_download(&self, download_id: Uuid) -> Result<Option<Request>> {
        let links = self.links.lock().await;
        let request_id = links
            .iter()
            .find(|(_, d)| *d == download_id)
            .map(|(r, _)| *r);
        drop(links);
        match request_id {
            Some(id) => self.get(id).await,
            None => Ok(None),
        }
    }
}

#[derive(Default)]
pub struct MemoryHistory {
    pub entries: Mutex<Vec<ImportHistory>>,
}

#[async_trait]
impl HistoryRepository for MemoryHistory {
    async fn add(&self, entry: &ImportHistory) -> Result<()> {
        self.entries.lock().await.push(entry.clone());
        Ok(())
    }

    async fn list_for_download(&self, download_id: Uuid) -> Result<Vec<ImportHistory>> {
        Ok(self
            .entries
            .lock()
            .await
            .iter()
            .filter(|e| e.download_id == download_id)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Fake download client

pub struct FakeDownloadClient {
    pub definition: ClientDefinition,
    pub items: Mutex<Vec<DownloadItem>>,
    pub removed: Mutex<Vec<String>>,
    pub submissions: AtomicUsize,
    pub fail_listing: std::sync::atomic::AtomicBool,
}

impl FakeDownloadClient {
    pub fn torrent(id: i32) -> Arc<Self> {
        Arc::new(Self {
            definition: ClientDefinition::new(
                id,
                format!("fake-{}", id),
                ClientKind::QBittorrent,
                "http://fake",
            ),
            items: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
            submissions: AtomicUsize::new(0),
            fail_listing: std::sync::atomic::AtomicBool::new(false),
        })
    }

    pub async fn set_items(&self, items: Vec<DownloadItem>) {
        *self.items.lock().await = items;
    }
}

pub fn client_item(
    client_id: i32,
    external_id: &str,
    name: &str,
    status: DownloadItemStatus,
    progress: f64,
) -> DownloadItem {
    DownloadItem {
        client_id,
        external_id: external_id.to_string(),
        name: name.to_string(),
        size_bytes: 1_000_000,
        downloaded_bytes: (1_000_000.0 * progress) as i64,
        progress,
        speed_bps: 0,
        eta_secs: None,
        ratio: Some(0.0),
        seeding_time_secs: Some(0),
        status,
        save_path: Some("/downloads".to_string()),
        category: None,
        error_message: None,
    }
}

#[async_trait]
impl DownloadClient for FakeDownloadClient {
    fn definition(&self) -> &ClientDefinition {
        &self.definition
    }

    async fn test(&self) -> Result<()> {
        Ok(())
    }

    async fn list(&self) -> Result<Vec<DownloadItem>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(outpost_core::OutpostError::network("fake", "down"));
        }
        Ok(self.items.lock().await.clone())
    }

    async fn add_torrent(&self, link: &str, _category: Option<&str>) -> Result<Option<String>> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        Ok(outpost_downloaders::magnet_info_hash(link))
    }

    async fn add_nzb(&self, _link: &str, _category: Option<&str>) -> Result<Option<String>> {
        Err(outpost_core::OutpostError::NoSuitableClient {
            protocol: "usenet".to_string(),
        })
    }

    async fn remove(&self, external_id: &str, _delete_files: bool) -> Result<()> {
        self.removed.lock().await.push(external_id.to_string());
        Ok(())
    }

    async fn pause(&self, _external_id: &str) -> Result<()> {
        Ok(())
    }

    async fn resume(&self, _external_id: &str) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fake indexer

pub struct FakeIndexer {
    pub definition: IndexerDefinition,
    pub releases: Vec<IndexerRelease>,
}

impl FakeIndexer {
    pub fn with_releases(releases: Vec<IndexerRelease>) -> Arc<Self> {
        let mut definition = IndexerDefinition::new(1, "fake", IndexerKind::Torznab, "http://x");
        definition.categories = vec![2000, 5000];
        Arc::new(Self {
            definition,
            releases,
        })
    }
}

pub fn torrent_release(title: &str, seeders: i32, published_hours_ago: i64) -> IndexerRelease {
    // Deterministic per-title pseudo info hash.
    let hash = format!(
        "{:0>40x}",
        title
            .bytes()
            .fold(0u128, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u128))
    );
    IndexerRelease {
        indexer_id: 1,
        title: title.to_string(),
        guid: format!("guid:{}", title),
        download_url: format!("magnet:?xt=urn:btih:{}", hash),
        magnet_url: Some(format!("magnet:?xt=urn:btih:{}", hash)),
        info_hash: Some(hash),
        size_bytes: Some(4_000_000_000),
        seeders: Some(seeders),
        leechers: Some(1),
        categories: vec![2000],
        imdb_id: None,
        tvdb_id: None,
        protocol: ReleaseProtocol::Torrent,
        published_at: Some(Utc::now() - chrono::Duration::hours(published_hours_ago)),
    }
}

#[async_trait]
impl IndexerClient for FakeIndexer {
    fn definition(&self) -> &IndexerDefinition {
        &self.definition
    }

    async fn search(&self, _params: &SearchParams) -> Result<Vec<IndexerRelease>> {
        Ok(self.releases.clone())
    }

    async fn capabilities(&self) -> Result<IndexerCaps> {
        Ok(IndexerCaps::default())
    }

    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn fetch_latest(&self) -> Result<Vec<IndexerRelease>> {
        Ok(self.releases.clone())
    }
}
