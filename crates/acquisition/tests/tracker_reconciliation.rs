//! Reconciliation-pass behaviour of the download tracker

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::*;
use outpost_acquisition::{DownloadTracker, TrackerConfig};
use outpost_core::models::{DownloadState, MediaKind, TrackedDownload};
use outpost_core::repositories::{BlocklistRepository, DownloadRepository};
use outpost_core::{BlocklistService, EventBus, SystemEvent};
use outpost_downloaders::{ClientRouter, DownloadClient, DownloadItemStatus};
use std::sync::Arc;

struct Fixture {
    tracker: DownloadTracker,
    downloads: Arc<MemoryDownloads>,
    blocklist: Arc<MemoryBlocklist>,
    client: Arc<FakeDownloadClient>,
    events: Arc<EventBus>,
}

fn fixture() -> Fixture {
    let downloads = Arc::new(MemoryDownloads::default());
    let blocklist = Arc::new(MemoryBlocklist::default());
    let client = FakeDownloadClient::torrent(1);
    let router = Arc::new(ClientRouter::new(vec![
        client.clone() as Arc<dyn DownloadClient>
    ]));
    let events = Arc::new(EventBus::new());

    let blocklist_service: Arc<BlocklistService<dyn BlocklistRepository>> =
        Arc::new(BlocklistService::new(
            blocklist.clone() as Arc<dyn BlocklistRepository>
        ));

    let tracker = DownloadTracker::new(
        downloads.clone() as Arc<dyn DownloadRepository>,
        blocklist_service,
        router,
        events.clone(),
        TrackerConfig::default(),
    );

    Fixture {
        tracker,
        downloads,
        blocklist,
        client,
        events,
    }
}

async fn seed_download(
    fixture: &Fixture,
    external_id: &str,
    state: DownloadState,
) -> TrackedDownload {
    let mut download = TrackedDownload::new(1, external_id, MediaKind::Movie, "Movie.2024.1080p.BluRay.x264-GRP");
    download.parsed = Some(outpost_decision::parse_release(&download.title));
    if state != DownloadState::Queued {
        // Walk the seed to the requested state through legal hops.
        let path: &[DownloadState] = match state {
            DownloadState::Downloading => &[DownloadState::Downloading],
            DownloadState::Completed => {
                &[DownloadState::Downloading, DownloadState::Completed]
            }
            DownloadState::ImportPending => &[
                DownloadState::Downloading,
                DownloadState::Completed,
                DownloadState::ImportPending,
            ],
            _ => panic!("unsupported seed state"),
        };
        for &step in path {
            download.transition(step, "seed").unwrap();
        }
    }
    fixture.downloads.upsert(&download).await.unwrap();
    download
}

#[tokio::test]
async fn metrics_are_refreshed_from_the_client() {
    let fx = fixture();
    let seeded = seed_download(&fx, "aaa", DownloadState::Downloading).await;
    fx.client
        .set_items(vec![client_item(
            1,
            "aaa",
            &seeded.title,
            DownloadItemStatus::Downloading,
            0.42,
        )])
        .await;

    let summary = fx.tracker.reconcile().await.unwrap();
    assert_eq!(summary.updated, 1);

    let stored = fx.downloads.get(seeded.id).await.unwrap().unwrap();
    assert_eq!(stored.state, DownloadState::Downloading);
    assert!((stored.progress - 0.42).abs() < 1e-9);
}

#[tokio::test]
async fn completion_moves_to_import_pending_and_announces_it() {
    let fx = fixture();
    let seeded = seed_download(&fx, "bbb", DownloadState::Downloading).await;
    let mut rx = fx.events.subscribe();

    fx.client
        .set_items(vec![client_item(
            1,
            "bbb",
            &seeded.title,
            DownloadItemStatus::Completed,
            1.0,
        )])
        .await;

    let summary = fx.tracker.reconcile().await.unwrap();
    assert_eq!(summary.ready_for_import, 1);

    let stored = fx.downloads.get(seeded.id).await.unwrap().unwrap();
    assert_eq!(stored.state, DownloadState::ImportPending);

    let mut saw_ready = false;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, SystemEvent::DownloadReadyForImport { download_id } if download_id == seeded.id)
        {
            saw_ready = true;
        }
    }
    assert!(saw_ready);
}

#[tokio::test]
async fn client_status_never_regresses_past_import_pending() {
    let fx = fixture();
    let seeded = seed_download(&fx, "ccc", DownloadState::ImportPending).await;

    // The client still reports the finished torrent as downloading-ish.
    fx.client
        .set_items(vec![client_item(
            1,
            "ccc",
            &seeded.title,
            DownloadItemStatus::Downloading,
            1.0,
        )])
        .await;

    fx.tracker.reconcile().await.unwrap();
    let stored = fx.downloads.get(seeded.id).await.unwrap().unwrap();
    assert_eq!(stored.state, DownloadState::ImportPending);
}

#[tokio::test]
async fn six_hours_without_progress_stalls_the_download() {
    let fx = fixture();
    let seeded = seed_download(&fx, "ddd", DownloadState::Downloading).await;

    // Backdate the state change beyond the stall threshold.
    {
        let mut map = fx.downloads.downloads.lock().await;
        let d = map.get_mut(&seeded.id).unwrap();
        d.state_changed_at = Utc::now() - ChronoDuration::hours(7);
        d.progress = 0.1;
    }

    fx.client
        .set_items(vec![client_item(
            1,
            "ddd",
            &seeded.title,
            DownloadItemStatus::Downloading,
            0.1,
        )])
        .await;

    let summary = fx.tracker.reconcile().await.unwrap();
    assert_eq!(summary.stalled, 1);

    let stored = fx.downloads.get(seeded.id).await.unwrap().unwrap();
    assert_eq!(stored.state, DownloadState::Stalled);
    assert!(!stored.warnings.is_empty());

    // Exactly one stall transition recorded.
    let events = fx.downloads.events_for(seeded.id).await;
    let stall_events = events
        .iter()
        .filter(|e| e.to_state == DownloadState::Stalled)
        .count();
    assert_eq!(stall_events, 1);

    // A second pass with the same progress keeps it stalled.
    fx.tracker.reconcile().await.unwrap();
    let stored = fx.downloads.get(seeded.id).await.unwrap().unwrap();
    assert_eq!(stored.state, DownloadState::Stalled);
}

#[tokio::test]
async fn disappeared_download_fails_and_blocklists_the_release() {
    let fx = fixture();
    let seeded = seed_download(&fx, "eee", DownloadState::Downloading).await;
    fx.client.set_items(vec![]).await;

    let summary = fx.tracker.reconcile().await.unwrap();
    assert_eq!(summary.disappeared, 1);

    let stored = fx.downloads.get(seeded.id).await.unwrap().unwrap();
    assert_eq!(stored.state, DownloadState::Failed);

    // The release title landed on the blocklist and the group counter
    // moved.
    assert!(fx
        .blocklist
        .contains_title(&seeded.title)
        .await
        .unwrap());
    assert_eq!(
        fx.blocklist
            .group_failures("GRP")
            .await
            .unwrap()
            .map(|g| g.failures),
        Some(1)
    );
}

#[tokio::test]
async fn unresponsive_client_does_not_fail_its_downloads() {
    let fx = fixture();
    let seeded = seed_download(&fx, "fff", DownloadState::Downloading).await;
    fx.client
        .fail_listing
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let summary = fx.tracker.reconcile().await.unwrap();
    assert_eq!(summary.disappeared, 0);

    let stored = fx.downloads.get(seeded.id).await.unwrap().unwrap();
    assert_eq!(stored.state, DownloadState::Downloading);
}

#[tokio::test]
async fn unknown_client_items_are_adopted() {
    let fx = fixture();
    fx.client
        .set_items(vec![client_item(
            1,
            "zzz",
            "Show.Name.S02E05.1080p.WEB-DL.DDP5.1.H.264-NTb",
            DownloadItemStatus::Downloading,
            0.5,
        )])
        .await;

    let summary = fx.tracker.reconcile().await.unwrap();
    assert_eq!(summary.adopted, 1);

    let adopted = fx.downloads.find_by_key("1:zzz").await.unwrap().unwrap();
    assert_eq!(adopted.state, DownloadState::Downloading);
    assert_eq!(adopted.media_kind, MediaKind::Show);
    let parsed = adopted.parsed.unwrap();
    assert_eq!(parsed.season, Some(2));
    assert_eq!(parsed.release_group.as_deref(), Some("NTb"));

    // The next pass updates rather than re-adopting.
    let summary = fx.tracker.reconcile().await.unwrap();
    assert_eq!(summary.adopted, 0);
}

#[tokio::test]
async fn seeding_retention_marks_removable_and_sweep_deletes() {
    let fx = fixture();
    let seeded = seed_download(&fx, "ggg", DownloadState::ImportPending).await;

    // Ratio and minimum seed time satisfied.
    let mut item = client_item(
        1,
        "ggg",
        &seeded.title,
        DownloadItemStatus::Completed,
        1.0,
    );
    item.ratio = Some(1.5);
    item.seeding_time_secs = Some(7200);
    fx.client.set_items(vec![item]).await;

    let summary = fx.tracker.reconcile().await.unwrap();
    assert_eq!(summary.removable, 1);

    let stored = fx.downloads.get(seeded.id).await.unwrap().unwrap();
    assert!(stored.can_remove);

    // The sweep only removes imported downloads.
    assert_eq!(fx.tracker.removal_sweep().await.unwrap(), 0);

    fx.tracker.begin_import(seeded.id).await.unwrap();
    fx.tracker
        .finish_import(seeded.id, "/media/movies/Movie (2024)/Movie (2024).mkv")
        .await
        .unwrap();

    assert_eq!(fx.tracker.removal_sweep().await.unwrap(), 1);
    assert_eq!(fx.client.removed.lock().await.as_slice(), ["ggg"]);
}

#[tokio::test]
async fn every_transition_is_audited() {
    let fx = fixture();
    let seeded = seed_download(&fx, "hhh", DownloadState::Queued).await;

    fx.client
        .set_items(vec![client_item(
            1,
            "hhh",
            &seeded.title,
            DownloadItemStatus::Completed,
            1.0,
        )])
        .await;
    fx.tracker.reconcile().await.unwrap();

    let events = fx.downloads.events_for(seeded.id).await;
    let transitions: Vec<(DownloadState, DownloadState)> = events
        .iter()
        .map(|e| (e.from_state, e.to_state))
        .collect();
    assert_eq!(
        transitions,
        vec![
            (DownloadState::Queued, DownloadState::Downloading),
            (DownloadState::Downloading, DownloadState::Completed),
            (DownloadState::Completed, DownloadState::ImportPending),
        ]
    );
}
