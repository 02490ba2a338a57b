//! Quality profiles and custom formats

use crate::models::release::{AudioCodec, Codec, HdrFormat, Resolution, Source};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Coarse quality bucket derived from (resolution, source).
///
/// Higher base score means more desirable. The set is fixed; profiles pick
/// an allowed subset of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualityTier {
    Unknown,
    Cam,
    Dvd,
    Hdtv720p,
    Hdtv1080p,
    Hdtv2160p,
    WebRip720p,
    WebRip1080p,
    WebRip2160p,
    WebDl720p,
    WebDl1080p,
    WebDl2160p,
    Bluray720p,
    Bluray1080p,
    Bluray2160p,
    Remux1080p,
    Remux2160p,
}

impl QualityTier {
    /// Fixed base score for the tier.
    pub fn base_score(&self) -> i32 {
        match self {
            QualityTier::Unknown => 0,
            QualityTier::Cam => 50,
            QualityTier::Dvd => 200,
            QualityTier::Hdtv720p => 300,
            QualityTier::Hdtv1080p => 400,
            QualityTier::Hdtv2160p => 725,
            QualityTier::WebRip720p => 450,
            QualityTier::WebRip1080p => 550,
            QualityTier::WebRip2160p => 750,
            QualityTier::WebDl720p => 500,
            QualityTier::WebDl1080p => 600,
            QualityTier::WebDl2160p => 800,
            QualityTier::Bluray720p => 650,
            QualityTier::Bluray1080p => 700,
            QualityTier::Bluray2160p => 900,
            QualityTier::Remux1080p => 850,
            QualityTier::Remux2160p => 1000,
        }
    }

    /// Canonical display name, e.g. `Bluray-1080p`.
    pub fn name(&self) -> &'static str {
        match self {
            QualityTier::Unknown => "Unknown",
            QualityTier::Cam => "CAM",
            QualityTier::Dvd => "DVD",
            QualityTier::Hdtv720p => "HDTV-720p",
            QualityTier::Hdtv1080p => "HDTV-1080p",
            QualityTier::Hdtv2160p => "HDTV-2160p",
            QualityTier::WebRip720p => "WEBRip-720p",
            QualityTier::WebRip1080p => "WEBRip-1080p",
            QualityTier::WebRip2160p => "WEBRip-2160p",
            QualityTier::WebDl720p => "WEBDL-720p",
            QualityTier::WebDl1080p => "WEBDL-1080p",
            QualityTier::WebDl2160p => "WEBDL-2160p",
            QualityTier::Bluray720p => "Bluray-720p",
            QualityTier::Bluray1080p => "Bluray-1080p",
            QualityTier::Bluray2160p => "Bluray-2160p",
            QualityTier::Remux1080p => "Remux-1080p",
            QualityTier::Remux2160p => "Remux-2160p",
        }
    }
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// User preferences for what to grab and when to stop upgrading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityProfile {
    pub id: Uuid,
    pub name: String,

    /// Allowed tiers, in preference order.
    pub allowed: Vec<QualityTier>,

    /// Releases scoring below this are rejected.
    pub min_score: i32,
    /// Once an import reaches this score the quality target is met.
    pub cutoff_score: i32,
    /// Upgrades stop once the existing import scores at or above this.
    pub upgrade_until: i32,
    pub upgrades_allowed: bool,
    /// A replacement must beat the existing import by at least this much.
    pub min_score_increment: i32,

    /// Per-profile custom-format score overrides (format id -> delta).
    pub format_scores: HashMap<Uuid, i32>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QualityProfile {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            allowed: vec![
                QualityTier::Remux2160p,
                QualityTier::Bluray2160p,
                QualityTier::Remux1080p,
                QualityTier::WebDl2160p,
                QualityTier::Bluray1080p,
                QualityTier::WebDl1080p,
                QualityTier::WebRip1080p,
                QualityTier::Hdtv1080p,
            ],
            min_score: 0,
            cutoff_score: 1000,
            upgrade_until: 2000,
            upgrades_allowed: true,
            min_score_increment: 1,
            format_scores: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Profile invariant: `min <= cutoff <= upgrade_until`.
    pub fn validate(&self) -> crate::Result<()> {
        if self.min_score > self.cutoff_score || self.cutoff_score > self.upgrade_until {
            return Err(crate::OutpostError::ValidationError {
                field: "quality_profile".to_string(),
                message: format!(
                    "score ordering violated: min={} cutoff={} upgrade_until={}",
                    self.min_score, self.cutoff_score, self.upgrade_until
                ),
            });
        }
        Ok(())
    }

    pub fn allows(&self, tier: QualityTier) -> bool {
        self.allowed.contains(&tier)
    }

    /// Score delta a matched custom format contributes under this profile.
    pub fn format_score(&self, format: &CustomFormat) -> i32 {
        self.format_scores
            .get(&format.id)
            .copied()
            .unwrap_or(format.score)
    }
}

/// A parsed-release attribute flag a format condition can test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParsedFlag {
    Proper,
    Repack,
    Real,
    Atmos,
    SeasonPack,
    Daily,
}

/// One term of a custom-format conjunction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FormatCondition {
    /// Case-insensitive regex over the raw release title.
    TitleRegex { pattern: String, negate: bool },
    SourceIs { source: Source, negate: bool },
    ResolutionIs { resolution: Resolution, negate: bool },
    CodecIs { codec: Codec, negate: bool },
    AudioIs { audio: AudioCodec, negate: bool },
    HdrHas { format: HdrFormat, negate: bool },
    GroupIs { group: String, negate: bool },
    FlagSet { flag: ParsedFlag, negate: bool },
}

/// Named predicate over parsed-release attributes carrying a score delta.
///
/// All conditions must hold for the format to match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomFormat {
    pub id: Uuid,
    pub name: String,
    pub score: i32,
    pub enabled: bool,
    pub conditions: Vec<FormatCondition>,
}

impl CustomFormat {
    pub fn new(name: impl Into<String>, score: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            score,
            enabled: true,
            conditions: Vec::new(),
        }
    }

    pub fn with_condition(mut self, condition: FormatCondition) -> Self {
        self.conditions.push(condition);
        self
    }
}
