//! Tracked-download domain model and its state machine

use crate::models::media::MediaKind;
use crate::models::release::ParsedRelease;
use crate::{OutpostError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of one acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    Queued,
    Downloading,
    Paused,
    Stalled,
    Completed,
    ImportPending,
    Importing,
    Imported,
    ImportBlocked,
    Failed,
    Ignored,
}

impl std::fmt::Display for DownloadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DownloadState::Queued => "queued",
            DownloadState::Downloading => "downloading",
            DownloadState::Paused => "paused",
            DownloadState::Stalled => "stalled",
            DownloadState::Completed => "completed",
            DownloadState::ImportPending => "import_pending",
            DownloadState::Importing => "importing",
            DownloadState::Imported => "imported",
            DownloadState::ImportBlocked => "import_blocked",
            DownloadState::Failed => "failed",
            DownloadState::Ignored => "ignored",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for DownloadState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "queued" => Ok(DownloadState::Queued),
            "downloading" => Ok(DownloadState::Downloading),
            "paused" => Ok(DownloadState::Paused),
            "stalled" => Ok(DownloadState::Stalled),
            "completed" => Ok(DownloadState::Completed),
            "import_pending" => Ok(DownloadState::ImportPending),
            "importing" => Ok(DownloadState::Importing),
            "imported" => Ok(DownloadState::Imported),
            "import_blocked" => Ok(DownloadState::ImportBlocked),
            "failed" => Ok(DownloadState::Failed),
            "ignored" => Ok(DownloadState::Ignored),
            other => Err(format!("unknown download state: {}", other)),
        }
    }
}

impl DownloadState {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadState::Imported | DownloadState::Ignored)
    }

    /// States at or past the import hand-off. Client status updates must
    /// never move a download backward once it reaches this point.
    pub fn is_import_phase(&self) -> bool {
        matches!(
            self,
            DownloadState::ImportPending
                | DownloadState::Importing
                | DownloadState::Imported
                | DownloadState::ImportBlocked
        )
    }

    /// The allowed-transition table. Manual dismissal (`Ignored`) is
    /// reachable from any non-terminal state.
    pub fn can_transition(from: DownloadState, to: DownloadState) -> bool {
        use DownloadState::*;

        if from == to {
            return false;
        }
        if to == Ignored {
            return !from.is_terminal();
        }

        matches!(
            (from, to),
            (Queued, Downloading)
                | (Queued, Paused)
                | (Queued, Failed)
                | (Downloading, Paused)
                | (Paused, Downloading)
                | (Downloading, Stalled)
                | (Downloading, Completed)
                | (Downloading, Failed)
                | (Stalled, Downloading)
                | (Stalled, Failed)
                | (Completed, ImportPending)
                | (ImportPending, Importing)
                | (ImportPending, ImportBlocked)
                | (Importing, Imported)
                | (Importing, ImportBlocked)
                | (Importing, Failed)
                | (Failed, Queued)
        )
    }
}

/// Append-only audit record of a state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadEvent {
    pub id: Uuid,
    pub download_id: Uuid,
    pub from_state: DownloadState,
    pub to_state: DownloadState,
    pub reason: String,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Composite key identifying a download at its client.
///
/// Stable string form so large client ids survive round-trips.
pub fn download_key(client_id: i32, external_id: &str) -> String {
    format!("{}:{}", client_id, external_id)
}

/// One acquisition attempt being reconciled against a download client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedDownload {
    pub id: Uuid,
    pub client_id: i32,
    pub external_id: String,

    pub request_id: Option<Uuid>,
    pub media_id: Option<Uuid>,
    pub media_kind: MediaKind,
    pub title: String,

    /// Snapshot of the parsed release name taken at grab (or adoption) time.
    pub parsed: Option<ParsedRelease>,

    pub state: DownloadState,
    pub previous_state: Option<DownloadState>,
    pub state_changed_at: DateTime<Utc>,

    pub size_bytes: Option<i64>,
    pub downloaded_bytes: Option<i64>,
    pub progress: f64,
    pub speed_bps: Option<u64>,
    pub eta_secs: Option<i64>,
    pub seeders: Option<i32>,

    pub save_path: Option<String>,
    pub import_path: Option<String>,

    pub quality: Option<String>,
    pub format_score: i32,

    pub grabbed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub imported_at: Option<DateTime<Utc>>,

    pub ratio: Option<f64>,
    pub seeding_time_secs: Option<i64>,
    pub can_remove: bool,

    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub import_block_reason: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrackedDownload {
    pub fn new(
        client_id: i32,
        external_id: impl Into<String>,
        media_kind: MediaKind,
        title: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            client_id,
            external_id: external_id.into(),
            request_id: None,
            media_id: None,
            media_kind,
            title: title.into(),
            parsed: None,
            state: DownloadState::Queued,
            previous_state: None,
            state_changed_at: now,
            size_bytes: None,
            downloaded_bytes: None,
            progress: 0.0,
            speed_bps: None,
            eta_secs: None,
            seeders: None,
            save_path: None,
            import_path: None,
            quality: None,
            format_score: 0,
            grabbed_at: None,
            completed_at: None,
            imported_at: None,
            ratio: None,
            seeding_time_secs: None,
            can_remove: false,
            warnings: Vec::new(),
            errors: Vec::new(),
            import_block_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Composite `(client, external)` key for reconciliation.
    pub fn key(&self) -> String {
        download_key(self.client_id, &self.external_id)
    }

    /// Apply a transition, producing the audit event.
    ///
    /// Returns `InvalidTransition` (as a value, never a panic) when the pair
    /// is not in the allowed table.
    pub fn transition(
        &mut self,
        to: DownloadState,
        reason: impl Into<String>,
    ) -> Result<DownloadEvent> {
        if !DownloadState::can_transition(self.state, to) {
            return Err(OutpostError::InvalidTransition {
                entity: "download".to_string(),
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }

        let now = Utc::now();
        let from = self.state;
        self.previous_state = Some(from);
        self.state = to;
        self.state_changed_at = now;
        self.updated_at = now;

        match to {
            DownloadState::Completed => {
                if self.completed_at.is_none() {
                    self.completed_at = Some(now);
                }
                self.progress = 1.0;
            }
            DownloadState::Imported => {
                if self.imported_at.is_none() {
                    self.imported_at = Some(now);
                }
            }
            DownloadState::Queued => {
                // Retry path: clear the previous attempt's residue.
                self.progress = 0.0;
                self.downloaded_bytes = None;
                self.speed_bps = None;
                self.eta_secs = None;
                self.import_block_reason = None;
            }
            _ => {}
        }

        Ok(DownloadEvent {
            id: Uuid::new_v4(),
            download_id: self.id,
            from_state: from,
            to_state: to,
            reason: reason.into(),
            details: None,
            created_at: now,
        })
    }

    /// Update transfer metrics from a client listing without touching state.
    pub fn update_metrics(
        &mut self,
        size_bytes: Option<i64>,
        downloaded_bytes: Option<i64>,
        progress: f64,
        speed_bps: Option<u64>,
        eta_secs: Option<i64>,
        seeders: Option<i32>,
    ) {
        // A progress increase resets the stall clock.
        if progress > self.progress && self.state == DownloadState::Downloading {
            self.state_changed_at = Utc::now();
        }
        self.size_bytes = size_bytes;
        self.downloaded_bytes = downloaded_bytes;
        self.progress = progress.clamp(0.0, 1.0);
        self.speed_bps = speed_bps;
        self.eta_secs = eta_secs;
        self.seeders = seeders;
        self.updated_at = Utc::now();
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
            self.updated_at = Utc::now();
        }
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> TrackedDownload {
        TrackedDownload::new(1, "abc123", MediaKind::Movie, "Movie.2024.1080p.BluRay-GRP")
    }

    #[test]
    fn allowed_transitions_follow_the_table() {
        use DownloadState::*;

        let allowed = [
            (Queued, Downloading),
            (Queued, Paused),
            (Queued, Failed),
            (Downloading, Paused),
            (Paused, Downloading),
            (Downloading, Stalled),
            (Downloading, Completed),
            (Downloading, Failed),
            (Stalled, Downloading),
            (Stalled, Failed),
            (Completed, ImportPending),
            (ImportPending, Importing),
            (ImportPending, ImportBlocked),
            (Importing, Imported),
            (Importing, ImportBlocked),
            (Importing, Failed),
            (Failed, Queued),
        ];
        for (from, to) in allowed {
            assert!(
                DownloadState::can_transition(from, to),
                "{from} -> {to} should be allowed"
            );
        }
    }

    #[test]
    fn forbidden_transitions_are_rejected() {
        use DownloadState::*;

        let forbidden = [
            (Queued, Completed),
            (Queued, Imported),
            (Paused, Completed),
            (Completed, Downloading),
            (Completed, Imported),
            (ImportPending, Imported),
            (Imported, Failed),
            (Imported, Queued),
            (Ignored, Queued),
            (Failed, Downloading),
            (Stalled, Completed),
        ];
        for (from, to) in forbidden {
            assert!(
                !DownloadState::can_transition(from, to),
                "{from} -> {to} should be forbidden"
            );
        }
    }

    #[test]
    fn ignored_is_reachable_from_any_non_terminal_state() {
        use DownloadState::*;

        for from in [
            Queued,
            Downloading,
            Paused,
            Stalled,
            Completed,
            ImportPending,
            Importing,
            ImportBlocked,
            Failed,
        ] {
            assert!(DownloadState::can_transition(from, Ignored));
        }
        assert!(!DownloadState::can_transition(Imported, Ignored));
    }

    #[test]
    fn transition_records_event_and_timestamps() {
        let mut dl = fresh();
        let event = dl
            .transition(DownloadState::Downloading, "client started")
            .unwrap();

        assert_eq!(event.from_state, DownloadState::Queued);
        assert_eq!(event.to_state, DownloadState::Downloading);
        assert_eq!(dl.previous_state, Some(DownloadState::Queued));

        dl.transition(DownloadState::Completed, "client reports done")
            .unwrap();
        assert!(dl.completed_at.is_some());
        assert_eq!(dl.progress, 1.0);
    }

    #[test]
    fn invalid_transition_is_an_error_value() {
        let mut dl = fresh();
        let err = dl
            .transition(DownloadState::Imported, "nope")
            .unwrap_err();
        assert!(matches!(err, OutpostError::InvalidTransition { .. }));
        // State unchanged after a refused transition.
        assert_eq!(dl.state, DownloadState::Queued);
    }

    #[test]
    fn retry_clears_previous_attempt_residue() {
        let mut dl = fresh();
        dl.transition(DownloadState::Downloading, "started").unwrap();
        dl.update_metrics(Some(1000), Some(500), 0.5, Some(100), Some(5), Some(3));
        dl.transition(DownloadState::Failed, "client error").unwrap();
        dl.transition(DownloadState::Queued, "retry").unwrap();

        assert_eq!(dl.progress, 0.0);
        assert!(dl.downloaded_bytes.is_none());
    }

    #[test]
    fn composite_key_is_stable() {
        assert_eq!(download_key(3, "abcdef"), "3:abcdef");
        let dl = fresh();
        assert_eq!(dl.key(), "1:abc123");
    }
}
