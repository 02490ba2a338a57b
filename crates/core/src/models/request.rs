//! User request lifecycle

use crate::models::media::MediaKind;
use crate::{OutpostError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a user request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Processing,
    Available,
    Declined,
    Failed,
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Processing => "processing",
            RequestStatus::Available => "available",
            RequestStatus::Declined => "declined",
            RequestStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "processing" => Ok(RequestStatus::Processing),
            "available" => Ok(RequestStatus::Available),
            "declined" => Ok(RequestStatus::Declined),
            "failed" => Ok(RequestStatus::Failed),
            other => Err(format!("unknown request status: {}", other)),
        }
    }
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Available | RequestStatus::Declined)
    }

    /// Guarded transition table.
    pub fn can_transition(from: RequestStatus, to: RequestStatus) -> bool {
        use RequestStatus::*;
        matches!(
            (from, to),
            (Pending, Approved)
                | (Pending, Declined)
                | (Approved, Processing)
                | (Processing, Available)
                | (Processing, Failed)
                | (Failed, Approved)
        )
    }
}

/// A user-originated intent to add a title, gated by approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: Uuid,
    pub user_id: String,
    pub kind: MediaKind,
    pub external_id: i64,
    pub title: String,
    pub year: Option<i32>,
    pub status: RequestStatus,
    pub status_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Request {
    pub fn new(
        user_id: impl Into<String>,
        kind: MediaKind,
        external_id: i64,
        title: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            kind,
            external_id,
            title: title.into(),
            year: None,
            status: RequestStatus::Pending,
            status_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a guarded status transition.
    pub fn transition(&mut self, to: RequestStatus, reason: Option<String>) -> Result<()> {
        if !RequestStatus::can_transition(self.status, to) {
            return Err(OutpostError::InvalidTransition {
                entity: "request".to_string(),
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.status_reason = reason;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Link row pairing a request with a download working on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestDownloadLink {
    pub request_id: Uuid,
    pub download_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_reaches_available() {
        let mut req = Request::new("alice", MediaKind::Movie, 603, "The Matrix");
        req.transition(RequestStatus::Approved, None).unwrap();
        req.transition(RequestStatus::Processing, None).unwrap();
        req.transition(RequestStatus::Available, None).unwrap();
        assert!(req.status.is_terminal());
    }

    #[test]
    fn failed_requests_can_be_retried() {
        let mut req = Request::new("bob", MediaKind::Show, 1396, "Breaking Bad");
        req.transition(RequestStatus::Approved, None).unwrap();
        req.transition(RequestStatus::Processing, None).unwrap();
        req.transition(RequestStatus::Failed, Some("no releases found".into()))
            .unwrap();
        req.transition(RequestStatus::Approved, None).unwrap();
        assert_eq!(req.status, RequestStatus::Approved);
    }

    #[test]
    fn invalid_transitions_are_refused() {
        let mut req = Request::new("carol", MediaKind::Movie, 550, "Fight Club");
        let err = req
            .transition(RequestStatus::Available, None)
            .unwrap_err();
        assert!(matches!(err, OutpostError::InvalidTransition { .. }));
        assert_eq!(req.status, RequestStatus::Pending);

        req.transition(RequestStatus::Declined, Some("duplicate".into()))
            .unwrap();
        assert!(req
            .transition(RequestStatus::Approved, None)
            .is_err());
    }
}
