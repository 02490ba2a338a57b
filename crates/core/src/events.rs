//! Event bus for inter-component communication
//!
//! A thin wrapper over a tokio broadcast channel. The tracker publishes,
//! the importer and the seeding sweeper subscribe; components never call
//! each other directly for these hand-offs.

use crate::models::{DownloadState, RequestStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

const EVENT_BUFFER_SIZE: usize = 1024;

/// Events published by the acquisition core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SystemEvent {
    /// A release was submitted to a download client.
    GrabSubmitted {
        download_id: Uuid,
        media_id: Option<Uuid>,
        title: String,
    },
    /// A tracked download changed state.
    DownloadStateChanged {
        download_id: Uuid,
        from: DownloadState,
        to: DownloadState,
    },
    /// A download completed and awaits import.
    DownloadReadyForImport { download_id: Uuid },
    /// Seeding retention satisfied; the client entry can be removed.
    DownloadReadyForRemoval {
        download_id: Uuid,
        client_id: i32,
        external_id: String,
    },
    /// A download failed; the selector may look for an alternative.
    DownloadFailed {
        download_id: Uuid,
        media_id: Option<Uuid>,
        title: String,
        reason: String,
    },
    /// The importer placed files into the library.
    ImportCompleted {
        download_id: Uuid,
        media_id: Option<Uuid>,
        dest_path: String,
    },
    /// A request moved to a new status.
    RequestUpdated {
        request_id: Uuid,
        status: RequestStatus,
    },
    /// The storage guard flipped the pause flag.
    StoragePauseChanged { paused: bool },
}

impl SystemEvent {
    /// Short description for logging.
    pub fn description(&self) -> String {
        match self {
            SystemEvent::GrabSubmitted { title, .. } => format!("grab submitted: {}", title),
            SystemEvent::DownloadStateChanged { from, to, .. } => {
                format!("download {} -> {}", from, to)
            }
            SystemEvent::DownloadReadyForImport { download_id } => {
                format!("ready for import: {}", download_id)
            }
            SystemEvent::DownloadReadyForRemoval { download_id, .. } => {
                format!("ready for removal: {}", download_id)
            }
            SystemEvent::DownloadFailed { title, reason, .. } => {
                format!("download failed: {} ({})", title, reason)
            }
            SystemEvent::ImportCompleted { dest_path, .. } => {
                format!("import completed: {}", dest_path)
            }
            SystemEvent::RequestUpdated { status, .. } => format!("request -> {}", status),
            SystemEvent::StoragePauseChanged { paused } => {
                format!("storage pause: {}", paused)
            }
        }
    }
}

/// Broadcast bus shared by the scheduler loops and services.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<SystemEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self { sender }
    }

    /// Publish an event. Lagging or absent subscribers are not an error.
    pub fn publish(&self, event: SystemEvent) {
        debug!(event = %event.description(), "publishing event");
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SystemEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
