//! Repository round-trips against an in-memory database

use chrono::Utc;
use outpost_core::models::{
    BlocklistEntry, DownloadState, FormatSettings, ImportHistory, MediaKind, PendingGrab,
    QualityProfile, Request, RequestStatus, TrackedDownload, WantedItem,
};
use outpost_core::repositories::*;
use outpost_infrastructure::{
    create_test_pool, SqliteBlocklistRepository, SqliteDownloadRepository,
    SqliteHistoryRepository, SqlitePendingGrabRepository, SqliteProfileRepository,
    SqliteRequestRepository, SqliteSettingsRepository, SqliteWantedRepository,
};
use uuid::Uuid;

#[tokio::test]
async fn wanted_items_round_trip_and_search_eligibility() {
    let pool = create_test_pool().await.unwrap();
    let repo = SqliteWantedRepository::new(pool);

    let mut item = WantedItem::new(MediaKind::Movie, 603, "The Matrix", Uuid::new_v4());
    item.year = Some(1999);
    item.seasons = vec![];
    repo.upsert(&item).await.unwrap();

    let stored = repo.get(item.id).await.unwrap().unwrap();
    assert_eq!(stored.title, "The Matrix");
    assert_eq!(stored.year, Some(1999));

    // Eligible while the cutoff is unmet.
    assert_eq!(repo.list_needing_search().await.unwrap().len(), 1);

    repo.set_quality_status(item.id, 1200, true).await.unwrap();
    assert!(repo.list_needing_search().await.unwrap().is_empty());
    let stored = repo.get(item.id).await.unwrap().unwrap();
    assert_eq!(stored.current_score, Some(1200));
    assert!(stored.cutoff_met);

    // Title matching is case-insensitive; a conflicting year misses.
    assert!(repo
        .find_matching(MediaKind::Movie, "the matrix", Some(1999))
        .await
        .unwrap()
        .is_some());
    assert!(repo
        .find_matching(MediaKind::Movie, "the matrix", Some(2003))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn downloads_round_trip_with_events() {
    let pool = create_test_pool().await.unwrap();
    let repo = SqliteDownloadRepository::new(pool);

    let title = "Show.Name.S02E05.1080p.WEB-DL.DDP5.1.H.264-NTb";
    let mut download = TrackedDownload::new(2, "hash42", MediaKind::Show, title);
    download.parsed = Some(parsed_episode());
    repo.upsert(&download).await.unwrap();

    let event = download
        .transition(DownloadState::Downloading, "client started")
        .unwrap();
    repo.record_event(&event).await.unwrap();
    repo.upsert(&download).await.unwrap();

    let stored = repo.find_by_key("2:hash42").await.unwrap().unwrap();
    assert_eq!(stored.state, DownloadState::Downloading);
    assert_eq!(
        stored.parsed.as_ref().and_then(|p| p.season),
        Some(2)
    );

    let events = repo.list_events(download.id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].from_state, DownloadState::Queued);
    assert_eq!(events[0].to_state, DownloadState::Downloading);

    assert_eq!(repo.list_active().await.unwrap().len(), 1);
    assert_eq!(
        repo.list_by_state(DownloadState::Downloading)
            .await
            .unwrap()
            .len(),
        1
    );
}

// The decision crate is not a dependency here; a hand-built parsed value
// is enough to prove JSON round-tripping.
fn parsed_episode() -> outpost_core::models::ParsedRelease {
    outpost_core::models::ParsedRelease {
        title: "Show Name".to_string(),
        season: Some(2),
        episode: Some(5),
        ..Default::default()
    }
}

#[tokio::test]
async fn profile_round_trip_preserves_scores() {
    let pool = create_test_pool().await.unwrap();
    let repo = SqliteProfileRepository::new(pool);

    let mut profile = QualityProfile::new("uhd");
    profile.min_score = 100;
    profile.cutoff_score = 1500;
    profile.upgrade_until = 2000;
    profile.format_scores.insert(Uuid::new_v4(), 250);
    repo.upsert_profile(&profile).await.unwrap();

    let stored = repo.get_profile(profile.id).await.unwrap().unwrap();
    assert_eq!(stored.cutoff_score, 1500);
    assert_eq!(stored.allowed, profile.allowed);
    assert_eq!(stored.format_scores, profile.format_scores);
}

#[tokio::test]
async fn invalid_profiles_are_refused() {
    let pool = create_test_pool().await.unwrap();
    let repo = SqliteProfileRepository::new(pool);

    let mut profile = QualityProfile::new("broken");
    profile.min_score = 500;
    profile.cutoff_score = 100;
    assert!(repo.upsert_profile(&profile).await.is_err());
}

#[tokio::test]
async fn blocklist_counts_group_failures() {
    let pool = create_test_pool().await.unwrap();
    let repo = SqliteBlocklistRepository::new(pool);

    repo.add(&BlocklistEntry::for_release(
        "Movie.2024.720p-BADRIP",
        Some("BADRIP".to_string()),
        "stalled",
    ))
    .await
    .unwrap();

    assert!(repo.contains_title("Movie.2024.720p-BADRIP").await.unwrap());
    assert!(!repo.contains_group("BADRIP").await.unwrap());

    assert_eq!(repo.bump_group_failures("BADRIP").await.unwrap().failures, 1);
    assert_eq!(repo.bump_group_failures("BADRIP").await.unwrap().failures, 2);

    repo.add(&BlocklistEntry::for_group("BADRIP", "auto-blocked"))
        .await
        .unwrap();
    assert!(repo.contains_group("BADRIP").await.unwrap());
    assert!(repo.contains_group("badrip").await.unwrap());
}

#[tokio::test]
async fn requests_link_to_downloads() {
    let pool = create_test_pool().await.unwrap();
    let repo = SqliteRequestRepository::new(pool);

    let mut request = Request::new("alice", MediaKind::Movie, 603, "The Matrix");
    repo.upsert(&request).await.unwrap();

    request.transition(RequestStatus::Approved, None).unwrap();
    repo.upsert(&request).await.unwrap();

    let download_id = Uuid::new_v4();
    repo.link_download(request.id, download_id).await.unwrap();

    let found = repo.find_by_download(download_id).await.unwrap().unwrap();
    assert_eq!(found.id, request.id);
    assert_eq!(found.status, RequestStatus::Approved);

    assert_eq!(
        repo.list_by_status(RequestStatus::Approved)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn pending_grabs_become_due() {
    let pool = create_test_pool().await.unwrap();
    let repo = SqlitePendingGrabRepository::new(pool);

    let media_id = Uuid::new_v4();
    let future = PendingGrab::new(
        media_id,
        MediaKind::Movie,
        serde_json::json!({"releaseTitle": "x"}),
        Utc::now() + chrono::Duration::hours(2),
    );
    repo.add(&future).await.unwrap();

    assert!(repo.list_due(Utc::now()).await.unwrap().is_empty());
    assert!(repo
        .list_due(Utc::now() + chrono::Duration::hours(3))
        .await
        .unwrap()
        .len()
        == 1);

    assert!(repo.find_for_media(media_id).await.unwrap().is_some());
    repo.remove(future.id).await.unwrap();
    assert!(repo.find_for_media(media_id).await.unwrap().is_none());
}

#[tokio::test]
async fn history_and_settings_round_trip() {
    let pool = create_test_pool().await.unwrap();
    let history = SqliteHistoryRepository::new(pool.clone());
    let settings = SqliteSettingsRepository::new(pool);

    let download_id = Uuid::new_v4();
    history
        .add(&ImportHistory::success(
            download_id,
            "/downloads/a.mkv",
            "/media/movies/A (2024)/A (2024).mkv",
            MediaKind::Movie,
        ))
        .await
        .unwrap();
    let entries = history.list_for_download(download_id).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].success);

    // Absent structured settings fall back to defaults.
    let format = settings.format_settings().await.unwrap();
    assert!(format.accepts_container("mkv"));

    let mut custom = FormatSettings::default();
    custom.auto_blocklist = false;
    settings.set_format_settings(&custom).await.unwrap();
    assert!(!settings.format_settings().await.unwrap().auto_blocklist);

    settings.set("api_key", "secret").await.unwrap();
    assert_eq!(
        settings.get("api_key").await.unwrap().as_deref(),
        Some("secret")
    );
}
