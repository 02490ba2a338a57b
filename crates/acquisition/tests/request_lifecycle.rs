//! Request lifecycle: approval, linking and terminal states

mod common;

use common::*;
use outpost_acquisition::{AutoApprovalRules, RequestLifecycle};
use outpost_core::models::{MediaKind, RequestStatus};
use outpost_core::repositories::*;
use outpost_core::{EventBus, SystemEvent};
use std::sync::Arc;
use uuid::Uuid;

struct Fixture {
    lifecycle: RequestLifecycle,
    requests: Arc<MemoryRequests>,
    wanted: Arc<MemoryWanted>,
}

fn fixture(rules: AutoApprovalRules) -> Fixture {
    let requests = Arc::new(MemoryRequests::default());
    let wanted = Arc::new(MemoryWanted::default());
    let lifecycle = RequestLifecycle::new(
        requests.clone() as Arc<dyn RequestRepository>,
        wanted.clone() as Arc<dyn WantedRepository>,
        Arc::new(EventBus::new()),
        rules,
        Uuid::new_v4(),
    );
    Fixture {
        lifecycle,
        requests,
        wanted,
    }
}

#[tokio::test]
async fn manual_requests_wait_for_approval() {
    let fx = fixture(AutoApprovalRules::default());

    let request = fx
        .lifecycle
        .create("alice", MediaKind::Movie, 603, "The Matrix", Some(1999))
        .await
        .unwrap();
    assert_eq!(request.status, RequestStatus::Pending);
    // No wanted item until approval.
    assert!(fx
        .wanted
        .find_by_external(MediaKind::Movie, 603)
        .await
        .unwrap()
        .is_none());

    fx.lifecycle.approve(request.id).await.unwrap();
    let stored = fx.requests.get(request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Approved);

    let item = fx
        .wanted
        .find_by_external(MediaKind::Movie, 603)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.title, "The Matrix");
    assert_eq!(item.added_by.as_deref(), Some("alice"));
}

#[tokio::test]
async fn auto_approval_rules_apply_at_creation() {
    let mut rules = AutoApprovalRules::default();
    rules.auto_approve_movies = true;
    let fx = fixture(rules);

    let movie = fx
        .lifecycle
        .create("bob", MediaKind::Movie, 550, "Fight Club", Some(1999))
        .await
        .unwrap();
    assert_eq!(movie.status, RequestStatus::Approved);

    let show = fx
        .lifecycle
        .create("bob", MediaKind::Show, 1396, "Breaking Bad", None)
        .await
        .unwrap();
    assert_eq!(show.status, RequestStatus::Pending);
}

#[tokio::test]
async fn always_approve_users_skip_review_for_everything() {
    let mut rules = AutoApprovalRules::default();
    rules.always_approve_users.insert("admin".to_string());
    let fx = fixture(rules);

    let request = fx
        .lifecycle
        .create("admin", MediaKind::Show, 1396, "Breaking Bad", None)
        .await
        .unwrap();
    assert_eq!(request.status, RequestStatus::Approved);
}

#[tokio::test]
async fn grab_import_and_failure_drive_the_request() {
    let fx = fixture(AutoApprovalRules::default());
    let request = fx
        .lifecycle
        .create("carol", MediaKind::Movie, 603, "The Matrix", Some(1999))
        .await
        .unwrap();
    fx.lifecycle.approve(request.id).await.unwrap();

    let item = fx
        .wanted
        .find_by_external(MediaKind::Movie, 603)
        .await
        .unwrap()
        .unwrap();
    let download_id = Uuid::new_v4();

    // Grab links the request and moves it to Processing.
    fx.lifecycle
        .handle_event(&SystemEvent::GrabSubmitted {
            download_id,
            media_id: Some(item.id),
            title: "The.Matrix.1999.1080p.BluRay.x264-GRP".to_string(),
        })
        .await
        .unwrap();
    let stored = fx.requests.get(request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Processing);

    // Import completion makes it Available (terminal).
    fx.lifecycle
        .handle_event(&SystemEvent::ImportCompleted {
            download_id,
            media_id: Some(item.id),
            dest_path: "/media/movies/The Matrix (1999)/The Matrix (1999).mkv".to_string(),
        })
        .await
        .unwrap();
    let stored = fx.requests.get(request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Available);
    assert!(stored.status.is_terminal());
}

#[tokio::test]
async fn failed_downloads_fail_the_request_and_retry_reapproves() {
    let fx = fixture(AutoApprovalRules::default());
    let request = fx
        .lifecycle
        .create("dave", MediaKind::Movie, 603, "The Matrix", Some(1999))
        .await
        .unwrap();
    fx.lifecycle.approve(request.id).await.unwrap();

    let item = fx
        .wanted
        .find_by_external(MediaKind::Movie, 603)
        .await
        .unwrap()
        .unwrap();
    let download_id = Uuid::new_v4();

    fx.lifecycle
        .handle_event(&SystemEvent::GrabSubmitted {
            download_id,
            media_id: Some(item.id),
            title: "The.Matrix.1999.720p-BAD".to_string(),
        })
        .await
        .unwrap();
    fx.lifecycle
        .handle_event(&SystemEvent::DownloadFailed {
            download_id,
            media_id: Some(item.id),
            title: "The.Matrix.1999.720p-BAD".to_string(),
            reason: "disappeared from client".to_string(),
        })
        .await
        .unwrap();

    let stored = fx.requests.get(request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Failed);
    assert!(stored.status_reason.as_deref().unwrap().contains("disappeared"));

    // Retry restarts the cycle.
    fx.lifecycle.retry(request.id).await.unwrap();
    let stored = fx.requests.get(request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Approved);
}

#[tokio::test]
async fn declining_is_terminal() {
    let fx = fixture(AutoApprovalRules::default());
    let request = fx
        .lifecycle
        .create("erin", MediaKind::Movie, 550, "Fight Club", None)
        .await
        .unwrap();

    fx.lifecycle
        .decline(request.id, "duplicate request")
        .await
        .unwrap();
    let stored = fx.requests.get(request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Declined);

    assert!(fx.lifecycle.approve(request.id).await.is_err());
}
