//! Wanted-item domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of media an item refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Show,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Movie => write!(f, "movie"),
            MediaKind::Show => write!(f, "show"),
        }
    }
}

impl std::str::FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(MediaKind::Movie),
            "show" => Ok(MediaKind::Show),
            other => Err(format!("unknown media kind: {}", other)),
        }
    }
}

/// One entity the system should acquire and keep at its quality target.
///
/// `(kind, external_id)` is unique; the external id is the catalog id
/// (TMDB for movies and shows).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WantedItem {
    pub id: Uuid,
    pub kind: MediaKind,
    pub external_id: i64,
    pub title: String,
    pub year: Option<i32>,
    pub quality_profile_id: Uuid,
    pub monitored: bool,

    /// For shows: the monitored season subset. Empty means all seasons.
    pub seasons: Vec<i32>,

    pub added_by: Option<String>,
    pub last_searched_at: Option<DateTime<Utc>>,

    /// Total score of the best import so far, if any.
    pub current_score: Option<i32>,
    /// True once an import satisfied the profile cutoff.
    pub cutoff_met: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WantedItem {
    pub fn new(
        kind: MediaKind,
        external_id: i64,
        title: impl Into<String>,
        quality_profile_id: Uuid,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            external_id,
            title: title.into(),
            year: None,
            quality_profile_id,
            monitored: true,
            seasons: Vec::new(),
            added_by: None,
            last_searched_at: None,
            current_score: None,
            cutoff_met: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Eligible for a scheduled search: monitored with an unmet quality target.
    pub fn needs_search(&self) -> bool {
        self.monitored && !self.cutoff_met
    }

    /// Whether a season is in the monitored subset.
    pub fn monitors_season(&self, season: i32) -> bool {
        self.seasons.is_empty() || self.seasons.contains(&season)
    }
}
