//! Request lifecycle
//!
//! Requests move `Pending -> Approved -> Processing -> Available/Failed`
//! under a guarded transition table. Approval creates the wanted item;
//! download events move the request along; a failed request can be
//! re-approved to restart the search.

use outpost_core::models::{MediaKind, Request, RequestStatus, WantedItem};
use outpost_core::repositories::{RequestRepository, WantedRepository};
use outpost_core::{EventBus, OutpostError, Result, SystemEvent};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Who gets approved without review.
#[derive(Debug, Clone, Default)]
pub struct AutoApprovalRules {
    pub always_approve_users: HashSet<String>,
    pub auto_approve_movies: bool,
    pub auto_approve_shows: bool,
}

impl AutoApprovalRules {
    fn applies(&self, user_id: &str, kind: MediaKind) -> bool {
        if self.always_approve_users.contains(user_id) {
            return true;
        }
        match kind {
            MediaKind::Movie => self.auto_approve_movies,
            MediaKind::Show => self.auto_approve_shows,
        }
    }
}

pub struct RequestLifecycle {
    requests: Arc<dyn RequestRepository>,
    wanted: Arc<dyn WantedRepository>,
    events: Arc<EventBus>,
    rules: AutoApprovalRules,
    /// Profile assigned to wanted items created from requests.
    default_profile_id: Uuid,
}

impl RequestLifecycle {
    pub fn new(
        requests: Arc<dyn RequestRepository>,
        wanted: Arc<dyn WantedRepository>,
        events: Arc<EventBus>,
        rules: AutoApprovalRules,
        default_profile_id: Uuid,
    ) -> Self {
        Self {
            requests,
            wanted,
            events,
            rules,
            default_profile_id,
        }
    }

    /// Create a request, auto-approving when the rules allow.
    #[instrument(skip(self, title), fields(title = %title.as_ref()))]
    pub async fn create(
        &self,
        user_id: &str,
        kind: MediaKind,
        external_id: i64,
        title: impl AsRef<str>,
        year: Option<i32>,
    ) -> Result<Request> {
        let mut request = Request::new(user_id, kind, external_id, title.as_ref());
        request.year = year;
        self.requests.upsert(&request).await?;

        if self.rules.applies(user_id, kind) {
            info!(user = user_id, "request auto-approved");
            self.approve(request.id).await?;
            request = self
                .requests
                .get(request.id)
                .await?
                .unwrap_or(request);
        }
        Ok(request)
    }

    /// Approve a pending (or failed) request and ensure its wanted item
    /// exists.
    pub async fn approve(&self, request_id: Uuid) -> Result<()> {
        let mut request = self.get(request_id).await?;
        request.transition(RequestStatus::Approved, None)?;
        self.requests.upsert(&request).await?;

        if self
            .wanted
            .find_by_external(request.kind, request.external_id)
            .await?
            .is_none()
        {
            let mut item = WantedItem::new(
                request.kind,
                request.external_id,
                request.title.clone(),
                self.default_profile_id,
            );
            item.year = request.year;
            item.added_by = Some(request.user_id.clone());
            self.wanted.upsert(&item).await?;
            debug!(title = %item.title, "wanted item created for request");
        }

        self.publish(&request);
        Ok(())
    }

    pub async fn decline(&self, request_id: Uuid, reason: impl Into<String>) -> Result<()> {
        let mut request = self.get(request_id).await?;
        request.transition(RequestStatus::Declined, Some(reason.into()))?;
        self.requests.upsert(&request).await?;
        self.publish(&request);
        Ok(())
    }

    /// Retry: `Failed -> Approved` restarts the search.
    pub async fn retry(&self, request_id: Uuid) -> Result<()> {
        self.approve(request_id).await
    }

    async fn get(&self, request_id: Uuid) -> Result<Request> {
        self.requests
            .get(request_id)
            .await?
            .ok_or(OutpostError::NotFound {
                resource: format!("request {}", request_id),
            })
    }

    fn publish(&self, request: &Request) {
        self.events.publish(SystemEvent::RequestUpdated {
            request_id: request.id,
            status: request.status,
        });
    }

    /// React to one system event. Grabs link requests to downloads and move
    /// them to Processing; imports make them Available; failures fail them.
    pub async fn handle_event(&self, event: &SystemEvent) -> Result<()> {
        match event {
            SystemEvent::GrabSubmitted {
                download_id,
                media_id: Some(media_id),
                ..
            } => {
                let Some(item) = self.wanted.get(*media_id).await? else {
                    return Ok(());
                };
                for mut request in self.requests.list_by_status(RequestStatus::Approved).await? {
                    if request.kind == item.kind && request.external_id == item.external_id {
                        self.requests
                            .link_download(request.id, *download_id)
                            .await?;
                        request.transition(RequestStatus::Processing, None)?;
                        self.requests.upsert(&request).await?;
                        self.publish(&request);
                    }
                }
            }
            SystemEvent::ImportCompleted { download_id, .. } => {
                if let Some(mut request) = self.requests.find_by_download(*download_id).await? {
                    if request.status == RequestStatus::Processing {
                        request.transition(RequestStatus::Available, None)?;
                        self.requests.upsert(&request).await?;
                        info!(title = %request.title, "request is now available");
                        self.publish(&request);
                    }
                }
            }
            SystemEvent::DownloadFailed {
                download_id,
                reason,
                ..
            } => {
                if let Some(mut request) = self.requests.find_by_download(*download_id).await? {
                    if request.status == RequestStatus::Processing {
                        request.transition(RequestStatus::Failed, Some(reason.clone()))?;
                        self.requests.upsert(&request).await?;
                        self.publish(&request);
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Subscriber loop wiring the lifecycle to the event bus.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut receiver = self.events.subscribe();
        loop {
            tokio::select! {
                event = receiver.recv() => {
                    match event {
                        Ok(event) => {
                            if let Err(e) = self.handle_event(&event).await {
                                warn!(error = %e, "request lifecycle event handling failed");
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "request lifecycle lagged behind the event bus");
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
        debug!("request lifecycle subscriber stopped");
    }
}
