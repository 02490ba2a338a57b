//! Audit and deferral records: import history, blocklist, pending grabs

use crate::models::media::MediaKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of one file move performed by the importer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportHistory {
    pub id: Uuid,
    pub download_id: Uuid,
    pub source_path: String,
    pub dest_path: String,
    pub media_id: Option<Uuid>,
    pub media_kind: MediaKind,
    pub success: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ImportHistory {
    pub fn success(
        download_id: Uuid,
        source_path: impl Into<String>,
        dest_path: impl Into<String>,
        media_kind: MediaKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            download_id,
            source_path: source_path.into(),
            dest_path: dest_path.into(),
            media_id: None,
            media_kind,
            success: true,
            error: None,
            created_at: Utc::now(),
        }
    }

    pub fn failure(
        download_id: Uuid,
        source_path: impl Into<String>,
        media_kind: MediaKind,
        error: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            download_id,
            source_path: source_path.into(),
            dest_path: String::new(),
            media_id: None,
            media_kind,
            success: false,
            error: Some(error.into()),
            created_at: Utc::now(),
        }
    }
}

/// A release title (or whole group) the system refuses to grab again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlocklistEntry {
    pub id: Uuid,
    pub media_id: Option<Uuid>,
    pub media_kind: Option<MediaKind>,
    /// Empty when the entry blocks an entire release group.
    pub release_title: String,
    pub release_group: Option<String>,
    pub reason: String,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl BlocklistEntry {
    pub fn for_release(
        release_title: impl Into<String>,
        release_group: Option<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            media_id: None,
            media_kind: None,
            release_title: release_title.into(),
            release_group,
            reason: reason.into(),
            error_message: None,
            created_at: Utc::now(),
        }
    }

    /// Entry blocking every release from a group.
    pub fn for_group(group: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            media_id: None,
            media_kind: None,
            release_title: String::new(),
            release_group: Some(group.into()),
            reason: reason.into(),
            error_message: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_media(mut self, media_id: Uuid, kind: MediaKind) -> Self {
        self.media_id = Some(media_id);
        self.media_kind = Some(kind);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error_message = Some(error.into());
        self
    }
}

/// Per-group failure counter feeding the auto-block policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupFailure {
    pub release_group: String,
    pub failures: i32,
    pub last_failed_at: DateTime<Utc>,
}

/// A scored release held back until a better one has had time to appear.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingGrab {
    pub id: Uuid,
    pub media_id: Uuid,
    pub media_kind: MediaKind,
    /// `ScoredRelease` snapshot, stored as JSON.
    pub release: serde_json::Value,
    pub not_before: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl PendingGrab {
    pub fn new(
        media_id: Uuid,
        media_kind: MediaKind,
        release: serde_json::Value,
        not_before: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            media_id,
            media_kind,
            release,
            not_before,
            created_at: Utc::now(),
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.not_before
    }
}
