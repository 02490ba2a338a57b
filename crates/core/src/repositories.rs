//! Repository traits the infrastructure crate implements
//!
//! Services are generic over these so tests can substitute in-memory fakes.

use crate::models::{
    BlocklistEntry, CustomFormat, DownloadEvent, DownloadState, FormatSettings, GroupFailure,
    ImportHistory, MediaKind, NamingSettings, PendingGrab, QualityProfile, Request, RequestStatus,
    TrackedDownload, WantedItem,
};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[async_trait]
pub trait WantedRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<WantedItem>>;
    async fn find_by_external(&self, kind: MediaKind, external_id: i64)
        -> Result<Option<WantedItem>>;
    /// Monitored items whose quality target is not met.
    async fn list_needing_search(&self) -> Result<Vec<WantedItem>>;
    /// Title/year match used by the RSS sweep. Matching is
    /// case-insensitive on the title; a year mismatch rules the item out.
    async fn find_matching(
        &self,
        kind: MediaKind,
        title: &str,
        year: Option<i32>,
    ) -> Result<Option<WantedItem>>;
    async fn upsert(&self, item: &WantedItem) -> Result<()>;
    async fn set_last_searched(&self, id: Uuid, when: DateTime<Utc>) -> Result<()>;
    /// Record the quality status after an import.
    async fn set_quality_status(&self, id: Uuid, score: i32, cutoff_met: bool) -> Result<()>;
}

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn get_profile(&self, id: Uuid) -> Result<Option<QualityProfile>>;
    async fn upsert_profile(&self, profile: &QualityProfile) -> Result<()>;
    async fn list_formats(&self) -> Result<Vec<CustomFormat>>;
    async fn upsert_format(&self, format: &CustomFormat) -> Result<()>;
}

#[async_trait]
pub trait DownloadRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<TrackedDownload>>;
    async fn find_by_key(&self, key: &str) -> Result<Option<TrackedDownload>>;
    /// Every download in a non-terminal state.
    async fn list_active(&self) -> Result<Vec<TrackedDownload>>;
    async fn list_by_state(&self, state: DownloadState) -> Result<Vec<TrackedDownload>>;
    async fn upsert(&self, download: &TrackedDownload) -> Result<()>;
    async fn record_event(&self, event: &DownloadEvent) -> Result<()>;
    async fn list_events(&self, download_id: Uuid) -> Result<Vec<DownloadEvent>>;
}

#[async_trait]
pub trait RequestRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Request>>;
    async fn list_by_status(&self, status: RequestStatus) -> Result<Vec<Request>>;
    async fn upsert(&self, request: &Request) -> Result<()>;
    async fn link_download(&self, request_id: Uuid, download_id: Uuid) -> Result<()>;
    async fn find_by_download(&self, download_id: Uuid) -> Result<Option<Request>>;
}

#[async_trait]
pub trait BlocklistRepository: Send + Sync {
    async fn add(&self, entry: &BlocklistEntry) -> Result<()>;
    async fn contains_title(&self, release_title: &str) -> Result<bool>;
    async fn contains_group(&self, release_group: &str) -> Result<bool>;
    async fn list(&self) -> Result<Vec<BlocklistEntry>>;
    /// Increment and return the group's failure counter.
    async fn bump_group_failures(&self, release_group: &str) -> Result<GroupFailure>;
    async fn group_failures(&self, release_group: &str) -> Result<Option<GroupFailure>>;
}

#[async_trait]
pub trait HistoryRepository: Send + Sync {
    async fn add(&self, entry: &ImportHistory) -> Result<()>;
    async fn list_for_download(&self, download_id: Uuid) -> Result<Vec<ImportHistory>>;
}

#[async_trait]
pub trait PendingGrabRepository: Send + Sync {
    async fn add(&self, grab: &PendingGrab) -> Result<()>;
    /// Grabs whose not-before time has passed.
    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<PendingGrab>>;
    async fn find_for_media(&self, media_id: Uuid) -> Result<Option<PendingGrab>>;
    async fn remove(&self, id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn format_settings(&self) -> Result<FormatSettings>;
    async fn set_format_settings(&self, settings: &FormatSettings) -> Result<()>;
    async fn naming_settings(&self) -> Result<NamingSettings>;
    async fn set_naming_settings(&self, settings: &NamingSettings) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}
